//! MPEG-TS writer
//!
//! Produces an HLS-compatible transport stream: one program with an H.264
//! video PID and an AAC audio PID. PAT/PMT are written at the start of the
//! stream and before every key frame so any segment can be joined cold.
//!
//! Packet header:
//! ```text
//! sync(0x47) | TEI PUSI TP PID(13) | TSC(2) AFC(2) CC(4) | [adaptation] | payload
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::aac::{self, AudioSpecificConfig};
use super::h264::{self, AvcConfig};
use super::tag::{AudioCodec, AudioTag, VideoCodec, VideoTag};

pub const PACKET_SIZE: usize = 188;

const PAT_PID: u16 = 0x0000;
const PMT_PID: u16 = 0x1000;
const VIDEO_PID: u16 = 0x0100;
const AUDIO_PID: u16 = 0x0101;

const STREAM_TYPE_H264: u8 = 0x1B;
const STREAM_TYPE_AAC: u8 = 0x0F;

const STREAM_ID_VIDEO: u8 = 0xE0;
const STREAM_ID_AUDIO: u8 = 0xC0;

/// Milliseconds to 90 kHz ticks, wrapped to 33 bits
fn to_90khz(ms: i64) -> u64 {
    (ms.wrapping_mul(90) as u64) & 0x1_FFFF_FFFF
}

#[derive(Debug, Default)]
pub struct TsWriter {
    pat_cc: u8,
    pmt_cc: u8,
    video_cc: u8,
    audio_cc: u8,
    avc: Option<AvcConfig>,
    aac: Option<AudioSpecificConfig>,
}

impl TsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_media(&mut self, out: &mut BytesMut) {
        *self = Self::default();
        self.write_tables(out);
    }

    pub fn write_video(&mut self, tag: &VideoTag, packet: &Bytes, out: &mut BytesMut) {
        if tag.codec != VideoCodec::H264 {
            tracing::debug!(codec = ?tag.codec, "video codec not carried in MPEG-TS, skipped");
            return;
        }
        if tag.is_config() {
            match AvcConfig::parse(packet.clone()) {
                Ok(config) => self.avc = Some(config),
                Err(e) => tracing::debug!(error = %e, "unreadable AVC config"),
            }
            return;
        }
        if packet.is_empty() {
            return;
        }

        let keyframe = tag.frame.is_key();
        if keyframe {
            self.write_tables(out);
        }

        let mut es = BytesMut::with_capacity(packet.len() + 64);
        h264::to_annex_b(packet, self.avc.as_ref(), keyframe, &mut es);

        let dts = to_90khz(tag.time as i64);
        let pts = to_90khz(tag.time as i64 + tag.composition_offset as i64);
        let dts = (pts != dts).then_some(dts);
        let pes = pes_packet(STREAM_ID_VIDEO, pts, dts, &es, false);
        let cc = packetize(out, VIDEO_PID, self.video_cc, &pes, Some(dts.unwrap_or(pts)), keyframe);
        self.video_cc = cc;
    }

    pub fn write_audio(&mut self, tag: &AudioTag, packet: &Bytes, out: &mut BytesMut) {
        if tag.codec != AudioCodec::Aac {
            tracing::debug!(codec = ?tag.codec, "audio codec not carried in MPEG-TS, skipped");
            return;
        }
        if tag.is_config {
            match AudioSpecificConfig::parse(packet) {
                Ok(config) => self.aac = Some(config),
                Err(e) => tracing::debug!(error = %e, "unreadable AAC config"),
            }
            return;
        }
        let Some(config) = self.aac.as_ref() else {
            tracing::debug!("AAC frame before its config, skipped");
            return;
        };

        let mut es = BytesMut::with_capacity(packet.len() + 7);
        es.put_slice(&aac::adts_header(config, packet.len()));
        es.put_slice(packet);

        let pts = to_90khz(tag.time as i64);
        let pes = pes_packet(STREAM_ID_AUDIO, pts, None, &es, true);
        self.audio_cc = packetize(out, AUDIO_PID, self.audio_cc, &pes, None, false);
    }

    fn write_tables(&mut self, out: &mut BytesMut) {
        let pat = [
            0x00, // table_id
            0xB0,
            13, // section_length
            0x00,
            0x01, // transport_stream_id
            0xC1, // version 0, current
            0x00,
            0x00,
            0x00,
            0x01, // program_number
            0xE0 | (PMT_PID >> 8) as u8,
            PMT_PID as u8,
        ];
        self.pat_cc = write_section(out, PAT_PID, self.pat_cc, &pat);

        let pmt = [
            0x02, // table_id
            0xB0,
            23, // section_length
            0x00,
            0x01, // program_number
            0xC1,
            0x00,
            0x00,
            0xE0 | (VIDEO_PID >> 8) as u8, // PCR PID
            VIDEO_PID as u8,
            0xF0,
            0x00, // program_info_length
            STREAM_TYPE_H264,
            0xE0 | (VIDEO_PID >> 8) as u8,
            VIDEO_PID as u8,
            0xF0,
            0x00,
            STREAM_TYPE_AAC,
            0xE0 | (AUDIO_PID >> 8) as u8,
            AUDIO_PID as u8,
            0xF0,
            0x00,
        ];
        self.pmt_cc = write_section(out, PMT_PID, self.pmt_cc, &pmt);
    }
}

/// One PSI section in a single packet. Returns the next continuity counter.
fn write_section(out: &mut BytesMut, pid: u16, cc: u8, section: &[u8]) -> u8 {
    let start = out.len();
    out.put_u8(0x47);
    out.put_u8(0x40 | (pid >> 8) as u8 & 0x1F);
    out.put_u8(pid as u8);
    out.put_u8(0x10 | (cc & 0x0F));
    out.put_u8(0x00); // pointer_field
    out.put_slice(section);
    out.put_u32(crc32(section));
    out.put_bytes(0xFF, PACKET_SIZE - (out.len() - start));
    (cc + 1) & 0x0F
}

fn pes_packet(stream_id: u8, pts: u64, dts: Option<u64>, es: &[u8], bounded: bool) -> BytesMut {
    let header_len = if dts.is_some() { 10 } else { 5 };
    let mut pes = BytesMut::with_capacity(9 + header_len + es.len());
    pes.put_slice(&[0x00, 0x00, 0x01, stream_id]);
    let packet_len = 3 + header_len + es.len();
    // unbounded (0) is allowed for video only
    pes.put_u16(if bounded && packet_len <= 0xFFFF {
        packet_len as u16
    } else {
        0
    });
    pes.put_u8(0x80);
    match dts {
        Some(dts) => {
            pes.put_u8(0xC0);
            pes.put_u8(header_len as u8);
            put_timestamp(&mut pes, 0x3, pts);
            put_timestamp(&mut pes, 0x1, dts);
        }
        None => {
            pes.put_u8(0x80);
            pes.put_u8(header_len as u8);
            put_timestamp(&mut pes, 0x2, pts);
        }
    }
    pes.put_slice(es);
    pes
}

fn put_timestamp(out: &mut BytesMut, marker: u8, ts: u64) {
    out.put_u8((marker << 4) | (((ts >> 29) & 0x0E) as u8) | 0x01);
    out.put_u8((ts >> 22) as u8);
    out.put_u8((((ts >> 14) & 0xFE) as u8) | 0x01);
    out.put_u8((ts >> 7) as u8);
    out.put_u8((((ts << 1) & 0xFE) as u8) | 0x01);
}

/// Split a PES packet into transport packets, stuffing the last one through
/// its adaptation field. Returns the next continuity counter.
fn packetize(
    out: &mut BytesMut,
    pid: u16,
    mut cc: u8,
    pes: &[u8],
    pcr: Option<u64>,
    random_access: bool,
) -> u8 {
    let mut offset = 0;
    let mut first = true;

    while offset < pes.len() {
        let mut flags = 0u8;
        if first && random_access {
            flags |= 0x40;
        }
        let pcr_here = if first { pcr } else { None };
        if pcr_here.is_some() {
            flags |= 0x10;
        }
        let af_min = match (flags, pcr_here) {
            (0, _) => 0,
            (_, Some(_)) => 8,
            (_, None) => 2,
        };

        let chunk = (pes.len() - offset).min(PACKET_SIZE - 4 - af_min);
        let af_total = PACKET_SIZE - 4 - chunk;

        out.put_u8(0x47);
        let pusi = if first { 0x40 } else { 0x00 };
        out.put_u8(pusi | ((pid >> 8) as u8 & 0x1F));
        out.put_u8(pid as u8);
        let control = if af_total > 0 { 0x30 } else { 0x10 };
        out.put_u8(control | (cc & 0x0F));

        if af_total > 0 {
            out.put_u8((af_total - 1) as u8);
            if af_total > 1 {
                out.put_u8(flags);
                let mut used = 2;
                if let Some(base) = pcr_here {
                    out.put_u8((base >> 25) as u8);
                    out.put_u8((base >> 17) as u8);
                    out.put_u8((base >> 9) as u8);
                    out.put_u8((base >> 1) as u8);
                    out.put_u8((((base & 1) << 7) as u8) | 0x7E);
                    out.put_u8(0x00);
                    used += 6;
                }
                out.put_bytes(0xFF, af_total - used);
            }
        }

        out.put_slice(&pes[offset..offset + chunk]);
        offset += chunk;
        cc = (cc + 1) & 0x0F;
        first = false;
    }
    cc
}

/// CRC-32/MPEG-2
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::h264::tests::AVC_CONFIG;
    use crate::media::tag::FrameType;

    fn pids(out: &[u8]) -> Vec<u16> {
        out.chunks(PACKET_SIZE)
            .map(|p| (((p[1] & 0x1F) as u16) << 8) | p[2] as u16)
            .collect()
    }

    #[test]
    fn test_crc32_mpeg2() {
        assert_eq!(crc32(b"123456789"), 0x0376_E6E7);
    }

    #[test]
    fn test_begin_writes_tables() {
        let mut writer = TsWriter::new();
        let mut out = BytesMut::new();
        writer.begin_media(&mut out);
        assert_eq!(out.len(), 2 * PACKET_SIZE);
        assert_eq!(pids(&out), vec![PAT_PID, PMT_PID]);
        assert!(out.chunks(PACKET_SIZE).all(|p| p[0] == 0x47));
    }

    #[test]
    fn test_keyframe_repeats_tables() {
        let mut writer = TsWriter::new();
        let mut out = BytesMut::new();
        let config = VideoTag::new(VideoCodec::H264, FrameType::Config, 0);
        writer.write_video(&config, &Bytes::from_static(AVC_CONFIG), &mut out);
        assert!(out.is_empty());

        let idr = Bytes::from_static(&[0, 0, 0, 2, 0x65, 0x88]);
        writer.write_video(&VideoTag::new(VideoCodec::H264, FrameType::Key, 0), &idr, &mut out);
        assert_eq!(out.len() % PACKET_SIZE, 0);
        assert_eq!(&pids(&out)[..3], &[PAT_PID, PMT_PID, VIDEO_PID]);

        let video = &out[2 * PACKET_SIZE..3 * PACKET_SIZE];
        // payload start, adaptation with random access and PCR
        assert_eq!(video[1] & 0x40, 0x40);
        assert_eq!(video[3] & 0x30, 0x30);
        assert_eq!(video[5] & 0x50, 0x50);
    }

    #[test]
    fn test_audio_needs_config() {
        let mut writer = TsWriter::new();
        let mut out = BytesMut::new();
        let frame = Bytes::from_static(&[0x21, 0x00, 0x49]);
        writer.write_audio(&AudioTag::new(AudioCodec::Aac, 0), &frame, &mut out);
        assert!(out.is_empty());

        let config = AudioTag::new(AudioCodec::Aac, 0).config();
        writer.write_audio(&config, &Bytes::from_static(&[0x12, 0x10]), &mut out);
        writer.write_audio(&AudioTag::new(AudioCodec::Aac, 23), &frame, &mut out);
        assert_eq!(out.len(), PACKET_SIZE);
        assert_eq!(pids(&out), vec![AUDIO_PID]);

        // stuffed adaptation field, then PES start code and ADTS sync
        let af_len = out[4] as usize;
        let pes = &out[5 + af_len..];
        assert_eq!(&pes[..4], &[0x00, 0x00, 0x01, STREAM_ID_AUDIO]);
        assert_eq!(pes[14], 0xFF);
        assert_eq!(pes[15] & 0xF0, 0xF0);
        assert_eq!(pes.len(), 14 + 7 + frame.len());
    }

    #[test]
    fn test_large_frame_spans_packets_with_counters() {
        let mut out = BytesMut::new();
        let pes = vec![0xAB; 1000];
        let cc = packetize(&mut out, VIDEO_PID, 14, &pes, None, false);
        let packets = out.len() / PACKET_SIZE;
        assert_eq!(out.len() % PACKET_SIZE, 0);
        assert_eq!(packets, 6);
        let counters: Vec<u8> = out.chunks(PACKET_SIZE).map(|p| p[3] & 0x0F).collect();
        assert_eq!(counters, vec![14, 15, 0, 1, 2, 3]);
        assert_eq!(cc, 4);
    }

    #[test]
    fn test_pts_encoding() {
        let mut out = BytesMut::new();
        put_timestamp(&mut out, 0x2, 90_000);
        let b = &out[..];
        let decoded = (((b[0] as u64 >> 1) & 0x07) << 30)
            | ((b[1] as u64) << 22)
            | (((b[2] as u64) >> 1) << 15)
            | ((b[3] as u64) << 7)
            | ((b[4] as u64) >> 1);
        assert_eq!(decoded, 90_000);
        assert_eq!(b[0] >> 4, 0x2);
    }
}
