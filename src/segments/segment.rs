//! One time-boxed slice of a stream

use bytes::{Bytes, BytesMut};

use crate::media::time::{distance, latest, span16};
use crate::media::{Media, MediaFormat, MediaWriter};

/// Media items in arrival order, bounded by a 16-bit duration
#[derive(Debug, Clone, Default)]
pub struct Segment {
    items: Vec<Media>,
    first_time: Option<u32>,
    last_time: Option<u32>,
    discontinuous: bool,
}

impl Segment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A segment following a gap in the stream
    pub fn discontinuity() -> Self {
        Self {
            discontinuous: true,
            ..Self::default()
        }
    }

    /// Account for a sample at `time`.
    ///
    /// Returns false, leaving the segment untouched, when the sample would
    /// push the span past `u16::MAX` milliseconds.
    pub fn add(&mut self, time: u32) -> bool {
        let Some(first) = self.first_time else {
            self.first_time = Some(time);
            self.last_time = Some(time);
            return true;
        };
        if distance(first, time) > u16::MAX as i32 {
            return false;
        }
        self.last_time = Some(self.last_time.map_or(time, |last| latest(last, time)));
        true
    }

    /// Add `time` then store `media`. Returns false on span overflow.
    pub fn push(&mut self, time: u32, media: Media) -> bool {
        if !self.add(time) {
            return false;
        }
        self.items.push(media);
        true
    }

    /// Stretch the end of the segment to `time`, clamped to the 16-bit span
    pub(crate) fn extend_to(&mut self, time: u32) {
        if let Some(first) = self.first_time {
            let end = first.wrapping_add(distance(first, time).clamp(0, u16::MAX as i32) as u32);
            self.last_time = Some(latest(self.last_time.unwrap_or(first), end));
        }
    }

    pub fn duration(&self) -> u16 {
        match (self.first_time, self.last_time) {
            (Some(first), Some(last)) => span16(first, last),
            _ => 0,
        }
    }

    pub fn first_time(&self) -> Option<u32> {
        self.first_time
    }

    pub fn last_time(&self) -> Option<u32> {
        self.last_time
    }

    pub fn is_started(&self) -> bool {
        self.first_time.is_some()
    }

    pub fn is_discontinuous(&self) -> bool {
        self.discontinuous
    }

    pub fn items(&self) -> &[Media] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Render the stored items as a standalone file
    pub fn encode(&self, format: MediaFormat) -> Bytes {
        let mut writer = MediaWriter::new(format);
        let mut out = BytesMut::new();
        writer.begin_media(&mut out);
        for media in &self.items {
            writer.write_media(media, &mut out);
        }
        writer.end_media(&mut out);
        out.freeze()
    }
}
