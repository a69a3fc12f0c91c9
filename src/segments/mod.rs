//! Sliding-window segmentation for playlist delivery
//!
//! [`Segments`] keeps the last `max_segments` completed segments plus the one
//! being filled. Boundaries are decided by [`SegmentWriter`]; completed
//! segments enter the ring here, evicting the oldest first.
//!
//! ```text
//!   sequence                      sequence + count
//!      │                                 │
//!      ▼                                 ▼
//!   [ seg n ][ seg n+1 ] ... [ seg n+k ] [ filling ]
//!      ▲ evicted first                      ▲ SegmentWriter
//! ```

pub mod files;
pub mod playlist;
pub mod segment;
pub mod writer;

use std::collections::VecDeque;

use bytes::Bytes;

use crate::media::{AudioTag, DataType, VideoTag};

pub use files::SegmentStore;
pub use segment::Segment;
pub use writer::{SegmentWriter, DURATION_TIMEOUT};

/// Called with the sequence number and content of each completed segment
pub type SegmentCallback = Box<dyn FnMut(u32, &Segment) + Send>;

pub struct Segments {
    name: String,
    writer: SegmentWriter,
    segments: VecDeque<Segment>,
    max_segments: usize,
    /// Sequence number the next completed segment gets
    next_sequence: u32,
    max_duration: u16,
    ended: bool,
    on_segment: Option<SegmentCallback>,
    store: Option<SegmentStore>,
}

impl Segments {
    pub fn new(name: impl Into<String>, max_segments: usize, segment_duration: u16) -> Self {
        Self {
            name: name.into(),
            writer: SegmentWriter::new(segment_duration),
            segments: VecDeque::with_capacity(max_segments.max(1)),
            max_segments: max_segments.max(1),
            next_sequence: 0,
            max_duration: 0,
            ended: false,
            on_segment: None,
            store: None,
        }
    }

    /// Persist completed segments through `store`
    pub fn with_store(mut self, store: SegmentStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn on_segment(&mut self, callback: impl FnMut(u32, &Segment) + Send + 'static) {
        self.on_segment = Some(Box::new(callback));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sequence number of the oldest live segment
    pub fn sequence(&self) -> u32 {
        self.next_sequence.wrapping_sub(self.segments.len() as u32)
    }

    /// Number of completed segments in the window
    pub fn count(&self) -> usize {
        self.segments.len()
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Takes effect at the next rotation
    pub fn set_max_segments(&mut self, max_segments: usize) {
        self.max_segments = max_segments.max(1);
    }

    /// Duration budget of a segment in milliseconds
    pub fn segment_duration(&self) -> u16 {
        self.writer.max_duration()
    }

    pub fn set_segment_duration(&mut self, duration: u16) {
        self.writer.set_max_duration(duration);
    }

    /// Largest completed segment duration seen
    pub fn max_duration(&self) -> u16 {
        self.max_duration
    }

    /// Whether the stream ended with [`Segments::end_media`]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Completed segment by sequence number
    pub fn get(&self, sequence: u32) -> Option<&Segment> {
        let index = sequence.wrapping_sub(self.sequence()) as usize;
        self.segments.get(index)
    }

    /// Completed segments with their sequence numbers, oldest first
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Segment)> {
        let first = self.sequence();
        self.segments
            .iter()
            .enumerate()
            .map(move |(i, s)| (first.wrapping_add(i as u32), s))
    }

    /// The segment being filled
    pub fn current(&self) -> &Segment {
        self.writer.current()
    }

    pub fn write_audio(&mut self, track: u8, tag: &AudioTag, packet: &Bytes) {
        self.ended = false;
        if let Some(done) = self.writer.write_audio(track, tag, packet) {
            self.complete(done);
        }
    }

    pub fn write_video(&mut self, track: u8, tag: &VideoTag, packet: &Bytes) {
        self.ended = false;
        if let Some(done) = self.writer.write_video(track, tag, packet) {
            self.complete(done);
        }
    }

    pub fn write_data(&mut self, track: u8, ty: DataType, packet: &Bytes, time: u32) {
        self.ended = false;
        if let Some(done) = self.writer.write_data(track, ty, packet, time) {
            self.complete(done);
        }
    }

    /// End the current segment; the next one is flagged discontinuous.
    pub fn reset(&mut self) {
        if let Some(done) = self.writer.reset() {
            self.complete(done);
        }
    }

    pub fn end_media(&mut self) {
        if let Some(done) = self.writer.end_media() {
            self.complete(done);
        }
        self.ended = true;
    }

    /// HLS playlist of the live window
    pub fn playlist(&self, base: &str, ext: &str) -> String {
        playlist::render(self, base, ext)
    }

    fn complete(&mut self, segment: Segment) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.max_duration = self.max_duration.max(segment.duration());

        self.segments.push_back(segment);
        while self.segments.len() > self.max_segments {
            self.segments.pop_front();
        }

        let Some(segment) = self.segments.back() else {
            return;
        };
        tracing::debug!(
            stream = %self.name,
            sequence = sequence,
            duration = segment.duration(),
            discontinuous = segment.is_discontinuous(),
            "segment completed"
        );
        if let Some(callback) = self.on_segment.as_mut() {
            callback(sequence, segment);
        }
        if let Some(store) = &self.store {
            store.save(
                sequence,
                segment,
                self.next_sequence.wrapping_sub(self.segments.len() as u32),
                self.segments.len() as u32,
            );
        }
    }
}

impl std::fmt::Debug for Segments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segments")
            .field("name", &self.name)
            .field("sequence", &self.sequence())
            .field("count", &self.count())
            .field("max_segments", &self.max_segments)
            .field("max_duration", &self.max_duration)
            .finish()
    }
}
