//! H.264/AVC helpers
//!
//! Payloads travel in AVCC format (length-prefixed NAL units), the layout
//! RTMP and MP4 use. This module parses the decoder configuration record,
//! walks NAL units, converts to Annex-B for MPEG-TS, and pulls CEA-608
//! caption pairs out of SEI messages.
//!
//! AVCDecoderConfigurationRecord:
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::MediaError;

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Slice = 1,
    SlicePartA = 2,
    SlicePartB = 3,
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    Sps = 7,
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    EndSeq = 10,
    EndStream = 11,
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// AVC decoder configuration (from the config packet)
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// NALU length prefix size in bytes (usually 4)
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parse an AVCDecoderConfigurationRecord
    pub fn parse(mut data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 7 {
            return Err(MediaError::InvalidAvcPacket);
        }

        let version = data.get_u8();
        if version != 1 {
            return Err(MediaError::InvalidAvcPacket);
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = Self::parse_sets(&mut data, num_sps)?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcPacket);
        }
        let num_pps = data.get_u8() as usize;
        let pps = Self::parse_sets(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    fn parse_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>, MediaError> {
        let mut sets = Vec::with_capacity(count);
        for _ in 0..count {
            if data.len() < 2 {
                return Err(MediaError::InvalidAvcPacket);
            }
            let len = data.get_u16() as usize;
            if data.len() < len {
                return Err(MediaError::InvalidAvcPacket);
            }
            sets.push(data.copy_to_bytes(len));
        }
        Ok(sets)
    }

    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4",
            _ => "Unknown",
        }
    }
}

/// Iterator over NAL units in AVCC format
pub struct NaluIterator<'a> {
    data: &'a [u8],
    offset: usize,
    nalu_length_size: usize,
}

impl<'a> NaluIterator<'a> {
    pub fn new(data: &'a [u8], nalu_length_size: u8) -> Self {
        Self {
            data,
            offset: 0,
            nalu_length_size: nalu_length_size as usize,
        }
    }
}

impl<'a> Iterator for NaluIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + self.nalu_length_size > self.data.len() {
            return None;
        }

        let mut len: usize = 0;
        for i in 0..self.nalu_length_size {
            len = (len << 8) | (self.data[self.offset + i] as usize);
        }
        self.offset += self.nalu_length_size;

        if self.offset + len > self.data.len() {
            return None;
        }

        let nalu = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Some(nalu)
    }
}

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Convert AVCC NAL units to Annex-B, prefixing parameter sets from
/// `config` when the frame is a keyframe that lacks its own.
pub fn to_annex_b(nalus: &[u8], config: Option<&AvcConfig>, keyframe: bool, out: &mut BytesMut) {
    let length_size = config.map(|c| c.nalu_length_size).unwrap_or(4);
    let has_sps = NaluIterator::new(nalus, length_size)
        .any(|nalu| !nalu.is_empty() && NaluType::from_byte(nalu[0]) == Some(NaluType::Sps));

    // access unit delimiter, primary_pic_type = any
    out.put_slice(&START_CODE);
    out.put_slice(&[0x09, 0xF0]);

    if keyframe && !has_sps {
        if let Some(config) = config {
            for set in config.sps.iter().chain(config.pps.iter()) {
                out.put_slice(&START_CODE);
                out.put_slice(set);
            }
        }
    }

    for nalu in NaluIterator::new(nalus, length_size) {
        if nalu.is_empty() || NaluType::from_byte(nalu[0]) == Some(NaluType::Aud) {
            continue;
        }
        out.put_slice(&START_CODE);
        out.put_slice(nalu);
    }
}

/// CEA-608 byte pairs for one caption field, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionField {
    /// 1 or 2
    pub field: u8,
    pub data: Bytes,
}

/// Walk SEI messages for ATSC A/53 caption data (`GA94`, type 3).
///
/// Padding pairs are skipped. Returns one entry per field that carried data.
pub fn extract_captions(nalus: &[u8], nalu_length_size: u8) -> Vec<CaptionField> {
    let mut fields: [BytesMut; 2] = [BytesMut::new(), BytesMut::new()];

    for nalu in NaluIterator::new(nalus, nalu_length_size) {
        if nalu.len() < 2 || NaluType::from_byte(nalu[0]) != Some(NaluType::Sei) {
            continue;
        }
        let rbsp = unescape_rbsp(&nalu[1..]);
        for_each_sei(&rbsp, |payload_type, payload| {
            if payload_type == 4 {
                read_a53_captions(payload, &mut fields);
            }
        });
    }

    fields
        .into_iter()
        .enumerate()
        .filter(|(_, data)| !data.is_empty())
        .map(|(i, data)| CaptionField {
            field: i as u8 + 1,
            data: data.freeze(),
        })
        .collect()
}

/// Strip emulation prevention bytes (00 00 03 -> 00 00)
fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

fn for_each_sei(mut data: &[u8], mut f: impl FnMut(u32, &[u8])) {
    // stop at rbsp_trailing_bits
    while data.len() > 1 || (data.len() == 1 && data[0] != 0x80) {
        let Some(payload_type) = read_sei_value(&mut data) else {
            return;
        };
        let Some(size) = read_sei_value(&mut data) else {
            return;
        };
        let size = size as usize;
        if size > data.len() {
            return;
        }
        f(payload_type, &data[..size]);
        data = &data[size..];
    }
}

fn read_sei_value(data: &mut &[u8]) -> Option<u32> {
    let mut value = 0u32;
    loop {
        let (&b, rest) = data.split_first()?;
        *data = rest;
        value = value.checked_add(b as u32)?;
        if b != 0xFF {
            return Some(value);
        }
    }
}

fn read_a53_captions(payload: &[u8], fields: &mut [BytesMut; 2]) {
    // country 0xB5, provider 0x0031, "GA94", user_data_type_code 3
    const HEADER: [u8; 8] = [0xB5, 0x00, 0x31, b'G', b'A', b'9', b'4', 0x03];
    if payload.len() < HEADER.len() + 2 || payload[..HEADER.len()] != HEADER {
        return;
    }
    let flags = payload[HEADER.len()];
    if flags & 0x40 == 0 {
        return;
    }
    let count = (flags & 0x1F) as usize;
    // skip em_data
    let pairs = &payload[HEADER.len() + 2..];
    for triple in pairs.chunks_exact(3).take(count) {
        let valid = triple[0] & 0x04 != 0;
        let cc_type = triple[0] & 0x03;
        if !valid || cc_type > 1 {
            continue;
        }
        if triple[1] & 0x7F == 0 && triple[2] & 0x7F == 0 {
            continue;
        }
        fields[cc_type as usize].put_slice(&triple[1..3]);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const AVC_CONFIG: &[u8] = &[
        0x01, // version
        0x64, // profile (High)
        0x00, // compatibility
        0x1F, // level 3.1
        0xFF, // nalu length size = 4
        0xE1, // 1 SPS
        0x00, 0x04, // SPS length
        0x67, 0x64, 0x00, 0x1F, // SPS data
        0x01, // 1 PPS
        0x00, 0x03, // PPS length
        0x68, 0xEF, 0x38, // PPS data
    ];

    /// AVCC frame holding one SEI with a single field-1 caption pair and
    /// one IDR slice.
    pub(crate) fn caption_keyframe() -> Vec<u8> {
        let sei: Vec<u8> = vec![
            0x06, // SEI
            0x04, // payload type 4
            0x10, // payload size
            0xB5, 0x00, 0x31, b'G', b'A', b'9', b'4', 0x03, // A/53 header
            0x42, // process_cc_data_flag, cc_count = 2
            0xFF, // em_data
            0xFC, 0x94, 0x20, // valid, field 1
            0xFD, 0x80, 0x80, // valid, field 2, padding
            0x80, // trailing bits
        ];
        let idr: &[u8] = &[0x65, 0x88, 0x84, 0x00];
        let mut frame = Vec::new();
        frame.extend_from_slice(&(sei.len() as u32).to_be_bytes());
        frame.extend_from_slice(&sei);
        frame.extend_from_slice(&(idr.len() as u32).to_be_bytes());
        frame.extend_from_slice(idr);
        frame
    }

    #[test]
    fn test_nalu_type() {
        assert_eq!(NaluType::from_byte(0x65), Some(NaluType::Idr));
        assert_eq!(NaluType::from_byte(0x67), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(0x68), Some(NaluType::Pps));
        assert_eq!(NaluType::from_byte(0x41), Some(NaluType::Slice));
        assert!(NaluType::Sps.is_parameter_set());
        assert!(!NaluType::Idr.is_parameter_set());
    }

    #[test]
    fn test_avc_config_parse() {
        let config = AvcConfig::parse(Bytes::from_static(AVC_CONFIG)).unwrap();
        assert_eq!(config.profile, 100);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
        assert_eq!(config.profile_name(), "High");
    }

    #[test]
    fn test_avc_config_invalid() {
        assert!(AvcConfig::parse(Bytes::from_static(&[0x01, 0x64, 0x00])).is_err());

        let mut bad_version = AVC_CONFIG.to_vec();
        bad_version[0] = 0x02;
        assert!(AvcConfig::parse(Bytes::from(bad_version)).is_err());

        // SPS length beyond the buffer
        let truncated = &AVC_CONFIG[..10];
        assert!(AvcConfig::parse(Bytes::copy_from_slice(truncated)).is_err());
    }

    #[test]
    fn test_nalu_iterator() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x03, 0x67, 0x64, 0x00, // SPS
            0x00, 0x00, 0x00, 0x02, 0x68, 0xEF, // PPS
        ];
        let nalus: Vec<_> = NaluIterator::new(data, 4).collect();
        assert_eq!(nalus.len(), 2);
        assert_eq!(NaluType::from_byte(nalus[0][0]), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(nalus[1][0]), Some(NaluType::Pps));
    }

    #[test]
    fn test_sei_value() {
        let mut data: &[u8] = &[0xFF, 0xFF, 0x10, 0x42];
        assert_eq!(read_sei_value(&mut data), Some(0xFF * 2 + 0x10));
        assert_eq!(data, &[0x42]);

        // a value past u32 is rejected instead of wrapping
        let mut run = vec![0xFF; (u32::MAX / 0xFF) as usize + 1];
        run.push(0x00);
        let mut data = run.as_slice();
        assert_eq!(read_sei_value(&mut data), None);
    }

    #[test]
    fn test_nalu_iterator_truncated() {
        let data: &[u8] = &[0x00, 0x00, 0x00, 0x0A, 0x67, 0x64, 0x00];
        assert!(NaluIterator::new(data, 4).next().is_none());
    }

    #[test]
    fn test_to_annex_b_inserts_parameter_sets() {
        let config = AvcConfig::parse(Bytes::from_static(AVC_CONFIG)).unwrap();
        let idr: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x65, 0x88];
        let mut out = BytesMut::new();
        to_annex_b(idr, Some(&config), true, &mut out);

        let expected: &[u8] = &[
            0, 0, 0, 1, 0x09, 0xF0, // AUD
            0, 0, 0, 1, 0x67, 0x64, 0x00, 0x1F, // SPS
            0, 0, 0, 1, 0x68, 0xEF, 0x38, // PPS
            0, 0, 0, 1, 0x65, 0x88, // IDR
        ];
        assert_eq!(&out[..], expected);
    }

    #[test]
    fn test_to_annex_b_inter_frame() {
        let inter: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x41, 0x9A];
        let mut out = BytesMut::new();
        to_annex_b(inter, None, false, &mut out);
        assert_eq!(&out[..], &[0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0, 1, 0x41, 0x9A]);
    }

    #[test]
    fn test_extract_captions() {
        let captions = extract_captions(&caption_keyframe(), 4);
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].field, 1);
        assert_eq!(&captions[0].data[..], &[0x94, 0x20]);
    }

    #[test]
    fn test_extract_captions_none() {
        let inter: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x41, 0x9A];
        assert!(extract_captions(inter, 4).is_empty());
    }

    #[test]
    fn test_unescape_rbsp() {
        assert_eq!(unescape_rbsp(&[0x00, 0x00, 0x03, 0x01]), vec![0x00, 0x00, 0x01]);
        assert_eq!(unescape_rbsp(&[0x12, 0x03]), vec![0x12, 0x03]);
    }
}
