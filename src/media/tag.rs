//! Media tags
//!
//! A tag describes one packet: codec, timestamp and the few codec flags the
//! core needs to route it. Payloads travel beside the tag as `Bytes`, so all
//! subscribers share one allocation.

use bytes::Bytes;

/// Audio codec, numbered like the FLV sound format nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioCodec {
    #[default]
    Raw,
    Adpcm,
    Mp3,
    PcmLe,
    Nellymoser16k,
    Nellymoser8k,
    Nellymoser,
    G711ALaw,
    G711MuLaw,
    Aac,
    Speex,
    Mp38k,
    DeviceSpecific,
}

impl AudioCodec {
    pub fn from_flv(format: u8) -> Option<Self> {
        match format & 0x0F {
            0 => Some(AudioCodec::Raw),
            1 => Some(AudioCodec::Adpcm),
            2 => Some(AudioCodec::Mp3),
            3 => Some(AudioCodec::PcmLe),
            4 => Some(AudioCodec::Nellymoser16k),
            5 => Some(AudioCodec::Nellymoser8k),
            6 => Some(AudioCodec::Nellymoser),
            7 => Some(AudioCodec::G711ALaw),
            8 => Some(AudioCodec::G711MuLaw),
            10 => Some(AudioCodec::Aac),
            11 => Some(AudioCodec::Speex),
            14 => Some(AudioCodec::Mp38k),
            15 => Some(AudioCodec::DeviceSpecific),
            _ => None,
        }
    }

    pub fn to_flv(self) -> u8 {
        match self {
            AudioCodec::Raw => 0,
            AudioCodec::Adpcm => 1,
            AudioCodec::Mp3 => 2,
            AudioCodec::PcmLe => 3,
            AudioCodec::Nellymoser16k => 4,
            AudioCodec::Nellymoser8k => 5,
            AudioCodec::Nellymoser => 6,
            AudioCodec::G711ALaw => 7,
            AudioCodec::G711MuLaw => 8,
            AudioCodec::Aac => 10,
            AudioCodec::Speex => 11,
            AudioCodec::Mp38k => 14,
            AudioCodec::DeviceSpecific => 15,
        }
    }
}

/// Video codec, numbered like the FLV codec id nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    #[default]
    Raw,
    SorensonH263,
    ScreenVideo,
    Vp6,
    Vp6Alpha,
    ScreenVideoV2,
    H264,
    Hevc,
    Av1,
}

impl VideoCodec {
    pub fn from_flv(id: u8) -> Option<Self> {
        match id & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::H264),
            12 => Some(VideoCodec::Hevc),
            13 => Some(VideoCodec::Av1),
            _ => None,
        }
    }

    pub fn to_flv(self) -> u8 {
        match self {
            VideoCodec::Raw => 0,
            VideoCodec::SorensonH263 => 2,
            VideoCodec::ScreenVideo => 3,
            VideoCodec::Vp6 => 4,
            VideoCodec::Vp6Alpha => 5,
            VideoCodec::ScreenVideoV2 => 6,
            VideoCodec::H264 => 7,
            VideoCodec::Hevc => 12,
            VideoCodec::Av1 => 13,
        }
    }

    /// Codecs whose payload carries a separate packet-type byte and
    /// composition time in FLV.
    pub fn is_avc_like(self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::Hevc | VideoCodec::Av1)
    }
}

/// Video frame kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    #[default]
    Unspecified,
    /// Independently decodable frame
    Key,
    Inter,
    DisposableInter,
    /// Info/command frame
    Info,
    /// Codec configuration (SPS/PPS record)
    Config,
}

impl FrameType {
    pub fn is_key(self) -> bool {
        self == FrameType::Key
    }
}

/// Audio packet description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioTag {
    pub codec: AudioCodec,
    /// Timestamp in milliseconds
    pub time: u32,
    pub channels: u8,
    /// Sample rate in hertz
    pub rate: u32,
    /// Payload is codec initialization data (AudioSpecificConfig for AAC)
    pub is_config: bool,
}

impl AudioTag {
    pub fn new(codec: AudioCodec, time: u32) -> Self {
        Self {
            codec,
            time,
            channels: 2,
            rate: 44100,
            is_config: false,
        }
    }

    pub fn config(mut self) -> Self {
        self.is_config = true;
        self
    }
}

/// Video packet description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoTag {
    pub codec: VideoCodec,
    pub frame: FrameType,
    /// Decode timestamp in milliseconds
    pub time: u32,
    /// Presentation offset from `time` in milliseconds
    pub composition_offset: i32,
}

impl VideoTag {
    pub fn new(codec: VideoCodec, frame: FrameType, time: u32) -> Self {
        Self {
            codec,
            frame,
            time,
            composition_offset: 0,
        }
    }

    pub fn is_config(&self) -> bool {
        self.frame == FrameType::Config
    }
}

/// Encoding of a data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Unknown,
    Amf,
    Json,
    Xml,
    Query,
    Text,
    /// CEA-608 byte pairs extracted from video SEI
    Caption,
}

/// A self-contained media item: tag, payload and track
#[derive(Debug, Clone, PartialEq)]
pub enum Media {
    Audio {
        tag: AudioTag,
        packet: Bytes,
        track: u8,
    },
    Video {
        tag: VideoTag,
        packet: Bytes,
        track: u8,
    },
    Data {
        ty: DataType,
        packet: Bytes,
        track: u8,
    },
}

impl Media {
    /// Timestamp of audio and video items; data carries none.
    pub fn time(&self) -> Option<u32> {
        match self {
            Media::Audio { tag, .. } => Some(tag.time),
            Media::Video { tag, .. } => Some(tag.time),
            Media::Data { .. } => None,
        }
    }

    pub fn packet(&self) -> &Bytes {
        match self {
            Media::Audio { packet, .. } | Media::Video { packet, .. } | Media::Data { packet, .. } => {
                packet
            }
        }
    }

    pub fn track(&self) -> u8 {
        match self {
            Media::Audio { track, .. } | Media::Video { track, .. } | Media::Data { track, .. } => {
                *track
            }
        }
    }
}
