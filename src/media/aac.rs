//! AAC helpers
//!
//! Publishers send AAC raw (no ADTS framing) with the AudioSpecificConfig as
//! the track config packet. MPEG-TS needs every frame wrapped in ADTS, so the
//! config is parsed once and turned into a header per frame.

use bytes::Bytes;

use crate::error::MediaError;

/// AAC profile (audio object type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacProfile {
    Main = 1,
    /// Low Complexity, the common case
    Lc = 2,
    Ssr = 3,
    Ltp = 4,
    /// HE-AAC
    Sbr = 5,
    Scalable = 6,
}

impl AacProfile {
    pub fn from_object_type(ot: u8) -> Option<Self> {
        match ot {
            1 => Some(AacProfile::Main),
            2 => Some(AacProfile::Lc),
            3 => Some(AacProfile::Ssr),
            4 => Some(AacProfile::Ltp),
            5 => Some(AacProfile::Sbr),
            6 => Some(AacProfile::Scalable),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AacProfile::Main => "AAC Main",
            AacProfile::Lc => "AAC LC",
            AacProfile::Ssr => "AAC SSR",
            AacProfile::Ltp => "AAC LTP",
            AacProfile::Sbr => "HE-AAC",
            AacProfile::Scalable => "AAC Scalable",
        }
    }
}

/// AudioSpecificConfig, as carried by an AAC config packet
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// 1 = mono, 2 = stereo, ...
    pub channel_configuration: u8,
    /// 960-sample frames instead of 1024
    pub frame_length_flag: bool,
}

impl AudioSpecificConfig {
    const SAMPLING_FREQUENCIES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    pub fn parse(data: &Bytes) -> Result<Self, MediaError> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket);
        }

        // audioObjectType: 5 bits | samplingFrequencyIndex: 4 bits
        // | (explicit frequency: 24 bits) | channelConfiguration: 4 bits
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);

        let (sampling_frequency, tail) = if sampling_frequency_index == 0x0F {
            if data.len() < 5 {
                return Err(MediaError::InvalidAacPacket);
            }
            let f0 = (data[1] & 0x7F) as u32;
            let f1 = data[2] as u32;
            let f2 = data[3] as u32;
            let f3 = (data[4] >> 7) as u32;
            ((f0 << 17) | (f1 << 9) | (f2 << 1) | f3, data[4] << 1)
        } else {
            let freq = Self::SAMPLING_FREQUENCIES
                .get(sampling_frequency_index as usize)
                .copied()
                .ok_or(MediaError::InvalidAacPacket)?;
            (freq, b1 << 1)
        };

        let channel_configuration = (tail >> 4) & 0x0F;
        let frame_length_flag = (tail & 0x08) != 0;

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            frame_length_flag,
        })
    }

    pub fn profile(&self) -> Option<AacProfile> {
        AacProfile::from_object_type(self.audio_object_type)
    }

    /// Channel count for the configuration (0 = defined in stream)
    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            1..=6 => self.channel_configuration,
            7 => 8,
            _ => 0,
        }
    }
}

/// Build the 7-byte ADTS header (no CRC) for a raw frame of `frame_length` bytes.
pub fn adts_header(config: &AudioSpecificConfig, frame_length: usize) -> [u8; 7] {
    // ADTS carries profile - 1
    let profile = config.audio_object_type.saturating_sub(1);
    let freq_idx = config.sampling_frequency_index;
    let channels = config.channel_configuration;
    let frame_len = frame_length + 7;

    [
        0xFF,
        0xF1, // MPEG-4, layer 0, no CRC
        ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01),
        ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8,
        ((frame_len >> 3) & 0xFF) as u8,
        (((frame_len & 0x07) << 5) | 0x1F) as u8,
        0xFC,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lc_44100_stereo() {
        let config = AudioSpecificConfig::parse(&Bytes::from_static(&[0x12, 0x10])).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channel_configuration, 2);
        assert_eq!(config.channels(), 2);
        assert_eq!(config.profile(), Some(AacProfile::Lc));
    }

    #[test]
    fn test_parse_various_rates() {
        // b0 = (2 << 3) | (3 >> 1), b1 = ((3 & 1) << 7) | (ch << 3)
        let cases = [
            (&[0x12, 0x10][..], 44100, 2),
            (&[0x11, 0x90][..], 48000, 2),
            (&[0x11, 0x88][..], 48000, 1),
        ];
        for (data, freq, channels) in cases {
            let config = AudioSpecificConfig::parse(&Bytes::copy_from_slice(data)).unwrap();
            assert_eq!(config.sampling_frequency, freq, "{data:02X?}");
            assert_eq!(config.channel_configuration, channels, "{data:02X?}");
        }
    }

    #[test]
    fn test_parse_rejects_short_and_reserved() {
        assert_eq!(
            AudioSpecificConfig::parse(&Bytes::from_static(&[0x12])).unwrap_err(),
            MediaError::InvalidAacPacket
        );
        // frequency index 13 is reserved
        assert!(AudioSpecificConfig::parse(&Bytes::from_static(&[0x16, 0x90])).is_err());
        // explicit frequency needs three more bytes
        assert!(AudioSpecificConfig::parse(&Bytes::from_static(&[0x17, 0x80])).is_err());
    }

    #[test]
    fn test_channel_mapping() {
        let mut config = AudioSpecificConfig::parse(&Bytes::from_static(&[0x12, 0x10])).unwrap();
        for (value, expected) in [(0, 0), (1, 1), (6, 6), (7, 8), (8, 0)] {
            config.channel_configuration = value;
            assert_eq!(config.channels(), expected);
        }
    }

    #[test]
    fn test_adts_header() {
        let config = AudioSpecificConfig::parse(&Bytes::from_static(&[0x12, 0x10])).unwrap();
        let header = adts_header(&config, 100);

        assert_eq!(header[0], 0xFF);
        assert_eq!(header[1], 0xF1);
        // profile LC (1), freq index 4, channel high bit 0
        assert_eq!(header[2], 0x50);
        // 13-bit frame length spans bytes 3..6
        let len = (((header[3] & 0x03) as usize) << 11)
            | ((header[4] as usize) << 3)
            | ((header[5] >> 5) as usize);
        assert_eq!(len, 107);
        assert_eq!(header[3] >> 6, 2);
    }
}
