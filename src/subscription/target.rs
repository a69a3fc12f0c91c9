//! Consumer-side capability
//!
//! A protocol session implements [`Target`] to receive a stream. Callbacks
//! run synchronously inside the producer's write, so implementations queue or
//! buffer and must never block. A target that cannot keep up reports it
//! through [`Target::ejected`]; the registry's maintenance pass detaches it.

use std::fmt;

use bytes::Bytes;

use crate::media::{AudioTag, DataType, Properties, VideoTag};

/// Why a target gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ejected {
    /// Output queue overflowed
    Congested,
    /// Consumer stopped reading
    Timeout,
    /// Transport failure
    Error,
}

impl fmt::Display for Ejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Ejected::Congested => "congested",
            Ejected::Timeout => "timeout",
            Ejected::Error => "error",
        };
        f.write_str(reason)
    }
}

pub trait Target: Send {
    /// A stream starts (or restarts after a reset)
    fn begin_media(&mut self, _name: &str) {}

    fn write_properties(&mut self, _properties: &Properties) {}

    fn write_audio(&mut self, track: u8, tag: &AudioTag, packet: &Bytes);

    fn write_video(&mut self, track: u8, tag: &VideoTag, packet: &Bytes);

    fn write_data(&mut self, track: u8, ty: DataType, packet: &Bytes);

    /// The stream ended or is being reset
    fn end_media(&mut self) {}

    /// End of a producer batch; a good moment to push buffered output
    fn flush(&mut self) {}

    fn ejected(&self) -> Option<Ejected> {
        None
    }
}
