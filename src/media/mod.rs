//! Media model and codecs
//!
//! This module provides:
//! - Media tags, payload carriers and wrapping time arithmetic
//! - Versioned stream properties
//! - H.264 and AAC helpers (config parsing, Annex-B, ADTS, captions)
//! - FLV body parsing and the FLV/MPEG-TS container writers

pub mod aac;
pub mod amf;
pub mod flv;
pub mod h264;
pub mod properties;
pub mod tag;
pub mod time;
pub mod ts;
pub mod writer;

pub use properties::Properties;
pub use tag::{AudioCodec, AudioTag, DataType, FrameType, Media, VideoCodec, VideoTag};
pub use writer::{MediaFormat, MediaWriter};
