//! Segment boundary state machine
//!
//! Streams with video are cut only at key frames once the duration budget
//! has elapsed, so every segment opens on a decodable picture. Audio-only and
//! data-only streams are cut on elapsed time alone. A sample that would push
//! the span past 16 bits always forces a cut.
//!
//! After a cut the held codec configs are replayed at the new start time so
//! each segment decodes standalone.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::segment::Segment;
use crate::media::time::distance;
use crate::media::{AudioTag, DataType, Media, VideoTag};

/// Default segment duration budget in milliseconds
pub const DURATION_TIMEOUT: u16 = 10_000;

#[derive(Debug)]
pub struct SegmentWriter {
    max_duration: u16,
    current: Segment,
    has_video: bool,
    /// Time of the key frame burst in progress, cleared by the next non-key frame
    keying: Option<u32>,
    audio_configs: BTreeMap<u8, (AudioTag, Bytes)>,
    video_configs: BTreeMap<u8, (VideoTag, Bytes)>,
}

impl SegmentWriter {
    pub fn new(max_duration: u16) -> Self {
        Self {
            max_duration: max_duration.max(1),
            current: Segment::new(),
            has_video: false,
            keying: None,
            audio_configs: BTreeMap::new(),
            video_configs: BTreeMap::new(),
        }
    }

    pub fn max_duration(&self) -> u16 {
        self.max_duration
    }

    pub fn set_max_duration(&mut self, max_duration: u16) {
        self.max_duration = max_duration.max(1);
    }

    /// The segment being filled
    pub fn current(&self) -> &Segment {
        &self.current
    }

    /// Returns the segment completed by this write, if any.
    pub fn write_audio(&mut self, track: u8, tag: &AudioTag, packet: &Bytes) -> Option<Segment> {
        let mut done = None;
        if !self.has_video && !tag.is_config && self.budget_elapsed(tag.time) {
            done = self.rotate(tag.time);
        }
        let media = Media::Audio {
            tag: *tag,
            packet: packet.clone(),
            track,
        };
        done = done.or(self.push(tag.time, media));

        if tag.is_config {
            if packet.is_empty() {
                self.audio_configs.remove(&track);
            } else {
                self.audio_configs.insert(track, (*tag, packet.clone()));
            }
        }
        done
    }

    pub fn write_video(&mut self, track: u8, tag: &VideoTag, packet: &Bytes) -> Option<Segment> {
        self.has_video = true;
        let mut done = None;
        if tag.frame.is_key() {
            if self.keying != Some(tag.time) && self.budget_elapsed(tag.time) {
                done = self.rotate(tag.time);
            }
            self.keying = Some(tag.time);
        } else if !tag.is_config() {
            self.keying = None;
        }
        let media = Media::Video {
            tag: *tag,
            packet: packet.clone(),
            track,
        };
        done = done.or(self.push(tag.time, media));

        if tag.is_config() && !packet.is_empty() {
            self.video_configs.insert(track, (*tag, packet.clone()));
        }
        done
    }

    /// Data carries no timestamp of its own; `time` is the stream clock.
    pub fn write_data(
        &mut self,
        track: u8,
        ty: DataType,
        packet: &Bytes,
        time: u32,
    ) -> Option<Segment> {
        let mut done = None;
        if !self.has_video && self.budget_elapsed(time) {
            done = self.rotate(time);
        }
        let media = Media::Data {
            ty,
            packet: packet.clone(),
            track,
        };
        done.or(self.push(time, media))
    }

    /// Close the current segment and mark the next one as following a gap.
    pub fn reset(&mut self) -> Option<Segment> {
        let done = std::mem::replace(&mut self.current, Segment::discontinuity());
        self.clear_state();
        (done.duration() > 0).then_some(done)
    }

    /// Flush the final segment.
    pub fn end_media(&mut self) -> Option<Segment> {
        let done = std::mem::take(&mut self.current);
        self.clear_state();
        (done.duration() > 0).then_some(done)
    }

    fn clear_state(&mut self) {
        self.has_video = false;
        self.keying = None;
        self.audio_configs.clear();
        self.video_configs.clear();
    }

    fn budget_elapsed(&self, time: u32) -> bool {
        self.current
            .first_time()
            .is_some_and(|first| distance(first, time) >= self.max_duration as i32)
    }

    fn push(&mut self, time: u32, media: Media) -> Option<Segment> {
        if self.current.push(time, media.clone()) {
            return None;
        }
        // span overflow
        let done = self.rotate(time);
        self.current.push(time, media);
        done
    }

    fn rotate(&mut self, time: u32) -> Option<Segment> {
        let mut done = std::mem::take(&mut self.current);
        done.extend_to(time);

        let completed = done.duration() > 0;
        if !completed && done.is_discontinuous() {
            self.current = Segment::discontinuity();
        }

        for (&track, (tag, packet)) in &self.audio_configs {
            let mut tag = *tag;
            tag.time = time;
            self.current.push(
                time,
                Media::Audio {
                    tag,
                    packet: packet.clone(),
                    track,
                },
            );
        }
        for (&track, (tag, packet)) in &self.video_configs {
            let mut tag = *tag;
            tag.time = time;
            self.current.push(
                time,
                Media::Video {
                    tag,
                    packet: packet.clone(),
                    track,
                },
            );
        }

        completed.then_some(done)
    }
}
