//! Container format dispatch
//!
//! The format is resolved once from a file extension or MIME type, then a
//! [`MediaWriter`] serializes media into an output buffer. Containers carry
//! one audio and one video stream, so only the primary track (0 or 1) of each
//! kind is written.

use bytes::{Bytes, BytesMut};

use super::flv::FlvWriter;
use super::properties::Properties;
use super::tag::{AudioTag, DataType, Media, VideoTag};
use super::ts::TsWriter;

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFormat {
    Flv,
    #[default]
    Ts,
}

impl MediaFormat {
    /// Resolve from an extension, with or without the leading dot
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        if ext.eq_ignore_ascii_case("flv") {
            Some(MediaFormat::Flv)
        } else if ext.eq_ignore_ascii_case("ts") || ext.eq_ignore_ascii_case("m2ts") {
            Some(MediaFormat::Ts)
        } else {
            None
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "video/x-flv" => Some(MediaFormat::Flv),
            "video/mp2t" | "video/mp2ts" => Some(MediaFormat::Ts),
            _ => None,
        }
    }

    /// Extension including the dot
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Flv => ".flv",
            MediaFormat::Ts => ".ts",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaFormat::Flv => "video/x-flv",
            MediaFormat::Ts => "video/mp2t",
        }
    }
}

fn is_primary(track: u8) -> bool {
    track <= 1
}

/// A writer for one container format
#[derive(Debug)]
pub enum MediaWriter {
    Flv(FlvWriter),
    Ts(TsWriter),
}

impl MediaWriter {
    pub fn new(format: MediaFormat) -> Self {
        match format {
            MediaFormat::Flv => MediaWriter::Flv(FlvWriter::new()),
            MediaFormat::Ts => MediaWriter::Ts(TsWriter::new()),
        }
    }

    pub fn format(&self) -> MediaFormat {
        match self {
            MediaWriter::Flv(_) => MediaFormat::Flv,
            MediaWriter::Ts(_) => MediaFormat::Ts,
        }
    }

    pub fn begin_media(&mut self, out: &mut BytesMut) {
        match self {
            MediaWriter::Flv(w) => w.begin_media(out),
            MediaWriter::Ts(w) => w.begin_media(out),
        }
    }

    pub fn write_audio(&mut self, track: u8, tag: &AudioTag, packet: &Bytes, out: &mut BytesMut) {
        if !is_primary(track) {
            return;
        }
        match self {
            MediaWriter::Flv(w) => w.write_audio(tag, packet, out),
            MediaWriter::Ts(w) => w.write_audio(tag, packet, out),
        }
    }

    pub fn write_video(&mut self, track: u8, tag: &VideoTag, packet: &Bytes, out: &mut BytesMut) {
        if !is_primary(track) {
            return;
        }
        match self {
            MediaWriter::Flv(w) => w.write_video(tag, packet, out),
            MediaWriter::Ts(w) => w.write_video(tag, packet, out),
        }
    }

    pub fn write_data(&mut self, track: u8, ty: DataType, packet: &Bytes, out: &mut BytesMut) {
        if !is_primary(track) {
            return;
        }
        match self {
            MediaWriter::Flv(w) => w.write_data(ty, packet, out),
            MediaWriter::Ts(_) => {}
        }
    }

    pub fn write_properties(&mut self, properties: &Properties, out: &mut BytesMut) {
        match self {
            MediaWriter::Flv(w) => w.write_properties(properties, out),
            MediaWriter::Ts(_) => {}
        }
    }

    pub fn write_media(&mut self, media: &Media, out: &mut BytesMut) {
        match media {
            Media::Audio { tag, packet, track } => self.write_audio(*track, tag, packet, out),
            Media::Video { tag, packet, track } => self.write_video(*track, tag, packet, out),
            Media::Data { ty, packet, track } => self.write_data(*track, *ty, packet, out),
        }
    }

    /// Neither container needs a trailer
    pub fn end_media(&mut self, _out: &mut BytesMut) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tag::AudioCodec;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(MediaFormat::from_extension("flv"), Some(MediaFormat::Flv));
        assert_eq!(MediaFormat::from_extension(".TS"), Some(MediaFormat::Ts));
        assert_eq!(MediaFormat::from_extension("mp4"), None);
        assert_eq!(MediaFormat::Ts.extension(), ".ts");
    }

    #[test]
    fn test_format_from_mime() {
        assert_eq!(MediaFormat::from_mime("video/x-flv"), Some(MediaFormat::Flv));
        assert_eq!(
            MediaFormat::from_mime("Video/MP2T; charset=binary"),
            Some(MediaFormat::Ts)
        );
        assert_eq!(MediaFormat::from_mime("text/plain"), None);
    }

    #[test]
    fn test_secondary_tracks_skipped() {
        let mut writer = MediaWriter::new(MediaFormat::Flv);
        let mut out = BytesMut::new();
        let tag = AudioTag::new(AudioCodec::Mp3, 0);
        writer.write_audio(2, &tag, &Bytes::from_static(&[1]), &mut out);
        assert!(out.is_empty());
        writer.write_audio(1, &tag, &Bytes::from_static(&[1]), &mut out);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_ts_ignores_properties() {
        let mut writer = MediaWriter::new(MediaFormat::Ts);
        assert_eq!(writer.format(), MediaFormat::Ts);
        let mut props = Properties::new();
        props.set("title", "x");
        let mut out = BytesMut::new();
        writer.write_properties(&props, &mut out);
        assert!(out.is_empty());
    }
}
