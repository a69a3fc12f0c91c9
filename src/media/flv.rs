//! FLV tag bodies and the FLV file writer
//!
//! RTMP audio/video messages are FLV tag bodies without the tag header. The
//! parsers here turn a body into a tag and its payload (codec headers
//! stripped) and the writer does the reverse for recordings.
//!
//! Video body:
//! ```text
//! +----------+----------+------------------------------+
//! | FrameType| CodecID  | [AVC: PacketType(1) CTS(3)]  | Data...
//! | (4 bits) | (4 bits) |                              |
//! +----------+----------+------------------------------+
//! ```
//!
//! Audio body:
//! ```text
//! +-----------+----------+----------+----------+----------------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | [AAC: Type(1)] | Data...
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  |                |
//! +-----------+----------+----------+----------+----------------+
//! ```
//!
//! File layout: 9-byte header, PreviousTagSize0, then tags each followed by
//! their PreviousTagSize.

use bytes::{BufMut, Bytes, BytesMut};

use super::amf;
use super::properties::Properties;
use super::tag::{AudioCodec, AudioTag, DataType, FrameType, VideoCodec, VideoTag};
use crate::error::MediaError;

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;

/// 'FLV', version 1, audio+video flags, header length 9
const FILE_HEADER: [u8; 9] = [0x46, 0x4C, 0x56, 0x01, 0x05, 0x00, 0x00, 0x00, 0x09];

const SOUND_RATES: [u32; 4] = [5512, 11025, 22050, 44100];

/// Parse an FLV audio body
pub fn parse_audio(body: &Bytes, time: u32) -> Result<(AudioTag, Bytes), MediaError> {
    let Some(&flags) = body.first() else {
        return Err(MediaError::InvalidFlvTag);
    };
    let codec = AudioCodec::from_flv(flags >> 4).ok_or(MediaError::InvalidFlvTag)?;
    let mut tag = AudioTag::new(codec, time);
    tag.rate = SOUND_RATES[((flags >> 2) & 0x03) as usize];
    tag.channels = if flags & 0x01 != 0 { 2 } else { 1 };

    if codec != AudioCodec::Aac {
        return Ok((tag, body.slice(1..)));
    }
    match body.get(1) {
        Some(0) => tag.is_config = true,
        Some(1) => {}
        _ => return Err(MediaError::InvalidAacPacket),
    }
    Ok((tag, body.slice(2..)))
}

/// Parse an FLV video body
pub fn parse_video(body: &Bytes, time: u32) -> Result<(VideoTag, Bytes), MediaError> {
    let Some(&flags) = body.first() else {
        return Err(MediaError::InvalidFlvTag);
    };
    let codec = VideoCodec::from_flv(flags).ok_or(MediaError::InvalidFlvTag)?;
    let frame = match flags >> 4 {
        // 4 = generated keyframe
        1 | 4 => FrameType::Key,
        2 => FrameType::Inter,
        3 => FrameType::DisposableInter,
        5 => FrameType::Info,
        _ => return Err(MediaError::InvalidFlvTag),
    };
    let mut tag = VideoTag::new(codec, frame, time);

    if !codec.is_avc_like() {
        return Ok((tag, body.slice(1..)));
    }
    if body.len() < 5 {
        return Err(MediaError::InvalidAvcPacket);
    }
    match body[1] {
        0 => tag.frame = FrameType::Config,
        1 => {}
        // end of sequence
        2 => tag.frame = FrameType::Info,
        _ => return Err(MediaError::InvalidAvcPacket),
    }
    // signed 24-bit composition time
    let cts = ((body[2] as i32) << 16) | ((body[3] as i32) << 8) | body[4] as i32;
    tag.composition_offset = (cts << 8) >> 8;
    Ok((tag, body.slice(5..)))
}

/// Rebuild the codec header bytes of an audio body
pub fn audio_header(tag: &AudioTag) -> ([u8; 2], usize) {
    let rate = SOUND_RATES
        .iter()
        .rposition(|&r| tag.rate >= r)
        .unwrap_or(0) as u8;
    let stereo = (tag.channels > 1) as u8;
    let flags = (tag.codec.to_flv() << 4) | (rate << 2) | 0x02 | stereo;
    if tag.codec == AudioCodec::Aac {
        // AAC is always flagged 44 kHz stereo
        ([(10 << 4) | 0x0F, (!tag.is_config) as u8], 2)
    } else {
        ([flags, 0], 1)
    }
}

/// Rebuild the codec header bytes of a video body
pub fn video_header(tag: &VideoTag) -> ([u8; 5], usize) {
    let frame = match tag.frame {
        FrameType::Key | FrameType::Config => 1,
        FrameType::Inter | FrameType::Unspecified => 2,
        FrameType::DisposableInter => 3,
        FrameType::Info => 5,
    };
    let first = (frame << 4) | tag.codec.to_flv();
    if !tag.codec.is_avc_like() {
        return ([first, 0, 0, 0, 0], 1);
    }
    let packet_type = match tag.frame {
        FrameType::Config => 0,
        FrameType::Info => 2,
        _ => 1,
    };
    let cts = tag.composition_offset.to_be_bytes();
    ([first, packet_type, cts[1], cts[2], cts[3]], 5)
}

/// FLV container writer
#[derive(Debug, Default)]
pub struct FlvWriter {
    time: u32,
}

impl FlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_media(&mut self, out: &mut BytesMut) {
        self.time = 0;
        out.put_slice(&FILE_HEADER);
        out.put_u32(0);
    }

    pub fn write_audio(&mut self, tag: &AudioTag, packet: &[u8], out: &mut BytesMut) {
        self.time = tag.time;
        let (header, len) = audio_header(tag);
        write_tag(out, TAG_AUDIO, tag.time, &header[..len], packet);
    }

    pub fn write_video(&mut self, tag: &VideoTag, packet: &[u8], out: &mut BytesMut) {
        self.time = tag.time;
        let (header, len) = video_header(tag);
        write_tag(out, TAG_VIDEO, tag.time, &header[..len], packet);
    }

    /// Only AMF data has an FLV representation; other data types are skipped.
    pub fn write_data(&mut self, ty: DataType, packet: &[u8], out: &mut BytesMut) {
        if ty == DataType::Amf {
            write_tag(out, TAG_SCRIPT, self.time, &[], packet);
        }
    }

    pub fn write_properties(&mut self, properties: &Properties, out: &mut BytesMut) {
        let script = amf::on_metadata(properties);
        write_tag(out, TAG_SCRIPT, self.time, &[], &script);
    }
}

fn write_tag(out: &mut BytesMut, tag_type: u8, time: u32, header: &[u8], payload: &[u8]) {
    let size = header.len() + payload.len();
    out.reserve(11 + size + 4);
    out.put_u8(tag_type);
    out.put_uint(size as u64, 3);
    out.put_uint((time & 0x00FF_FFFF) as u64, 3);
    out.put_u8((time >> 24) as u8);
    out.put_uint(0, 3); // stream id
    out.put_slice(header);
    out.put_slice(payload);
    out.put_u32((11 + size) as u32);
}
