//! Producer-facing stream state
//!
//! A [`Publication`] is the server side of one named live stream. The
//! producer drives it with `write_*` and `flush`; every write is fanned out
//! synchronously to the members attached to it, in call order.
//!
//! ```text
//!   producer ──► write_video() ──► flush_properties
//!                                      │
//!                       ┌──────────────┼──────────────┐
//!                       ▼              ▼              ▼
//!                  Subscriber      Recorder       Segmenter
//!                  (lazy replay)   (file)         (segment ring)
//! ```
//!
//! Track configs are captured after fan-out, so they are what late joiners
//! replay, never a duplicate for members that saw the live packet.

pub mod rate;
pub mod track;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::media::h264::extract_captions;
use crate::media::properties::split_track;
use crate::media::aac::AudioSpecificConfig;
use crate::media::{AudioCodec, AudioTag, DataType, MediaFormat, Properties, VideoCodec, VideoTag};
use crate::recorder::Recorder;
use crate::segments::{SegmentStore, Segments, DURATION_TIMEOUT};
use crate::stats::PublicationStats;
use crate::subscription::SharedSubscription;

pub use rate::{ByteRate, LostRate};
pub use track::{AudioTrack, DataTrack, Tracks, VideoTrack};

/// Handle owned by the registry and shared with the producer session
pub type SharedPublication = Arc<Mutex<Publication>>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a publication instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicationId(u64);

impl PublicationId {
    fn next() -> Self {
        PublicationId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishingState {
    #[default]
    Stopped,
    /// Started or reset, not yet confirmed by a write or flush
    Starting,
    Live,
}

impl PublishingState {
    /// Legacy numeric form: 0, -1, 1
    pub fn as_i8(self) -> i8 {
        match self {
            PublishingState::Stopped => 0,
            PublishingState::Starting => -1,
            PublishingState::Live => 1,
        }
    }
}

/// What subscribers replay from
pub(crate) struct Source<'a> {
    pub name: &'a str,
    pub properties: &'a Properties,
    pub tracks: &'a Tracks,
}

/// Segmenting defaults applied when the `segments` property enables it
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    pub format: MediaFormat,
    pub default_duration: u16,
    /// Persist completed segments here
    pub dir: Option<PathBuf>,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            format: MediaFormat::default(),
            default_duration: DURATION_TIMEOUT,
            dir: None,
        }
    }
}

enum Member {
    Subscriber(SharedSubscription),
    Recorder(Recorder),
    Segmenter(Segments),
}

#[derive(Clone, Copy)]
enum Write<'a> {
    Audio(u8, &'a AudioTag, &'a Bytes),
    Video(u8, &'a VideoTag, &'a Bytes),
    /// Data with the time the segmenter stamps it at
    Data(u8, DataType, &'a Bytes, u32),
    Properties,
    Flush,
}

impl Member {
    /// Deliver one write; false when the member no longer belongs here
    fn deliver(&mut self, id: PublicationId, source: &Source<'_>, write: Write<'_>) -> bool {
        match self {
            Member::Subscriber(shared) => {
                let mut sub = shared.lock();
                if !sub.is_attached_to(id) {
                    return false;
                }
                match write {
                    Write::Audio(track, tag, packet) => sub.write_audio(source, track, tag, packet),
                    Write::Video(track, tag, packet) => sub.write_video(source, track, tag, packet),
                    Write::Data(track, ty, packet, _) => sub.write_data(source, track, ty, packet),
                    Write::Properties => sub.write_properties(source),
                    Write::Flush => sub.flush(),
                }
            }
            Member::Recorder(recorder) => match write {
                Write::Audio(track, tag, packet) => recorder.write_audio(track, tag, packet),
                Write::Video(track, tag, packet) => recorder.write_video(track, tag, packet),
                Write::Data(track, ty, packet, _) => recorder.write_data(track, ty, packet),
                Write::Properties => recorder.write_properties(source.properties),
                Write::Flush => recorder.flush(),
            },
            Member::Segmenter(segments) => match write {
                Write::Audio(track, tag, packet) => segments.write_audio(track, tag, packet),
                Write::Video(track, tag, packet) => segments.write_video(track, tag, packet),
                Write::Data(track, ty, packet, time) => segments.write_data(track, ty, packet, time),
                Write::Properties | Write::Flush => {}
            },
        }
        true
    }
}

pub struct Publication {
    id: PublicationId,
    name: String,
    state: PublishingState,
    properties: Properties,
    /// Property version last pushed to members
    prop_version: Option<u32>,
    tracks: Tracks,
    members: Vec<Member>,
    /// Subscriptions that switch here on the next matching key frame
    waiting: Vec<SharedSubscription>,
    byte_rate: ByteRate,
    max_byte_rate: u64,
    latency: u32,
    new_data: bool,
    started_at: Instant,
    last_write: Instant,
    segment_options: SegmentOptions,
}

impl Publication {
    /// Create a stopped publication named `name`
    pub fn new(name: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: PublicationId::next(),
            name: name.into(),
            state: PublishingState::Stopped,
            properties: Properties::new(),
            prop_version: None,
            tracks: Tracks::default(),
            members: Vec::new(),
            waiting: Vec::new(),
            byte_rate: ByteRate::new(),
            max_byte_rate: 0,
            latency: 0,
            new_data: false,
            started_at: now,
            last_write: now,
            segment_options: SegmentOptions::default(),
        }
    }

    /// Set where and how segments are produced once `segments` enables them
    pub fn with_segment_options(mut self, options: SegmentOptions) -> Self {
        self.segment_options = options;
        self
    }

    /// Wrap into the handle shared with the registry
    pub fn shared(self) -> SharedPublication {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> PublicationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PublishingState {
        self.state
    }

    /// Starting or live
    pub fn is_publishing(&self) -> bool {
        self.state != PublishingState::Stopped
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    /// Half the last reported round trip, in milliseconds
    pub fn latency(&self) -> u32 {
        self.latency
    }

    /// Bytes per second over the last completed window
    pub fn byte_rate(&self) -> u64 {
        self.byte_rate.rate()
    }

    pub fn max_byte_rate(&self) -> u64 {
        self.max_byte_rate
    }

    /// Segment window, when segmenting is enabled
    pub fn segments(&self) -> Option<&Segments> {
        self.members.iter().find_map(|m| match m {
            Member::Segmenter(s) => Some(s),
            _ => None,
        })
    }

    pub fn segments_mut(&mut self) -> Option<&mut Segments> {
        self.members.iter_mut().find_map(|m| match m {
            Member::Segmenter(s) => Some(s),
            _ => None,
        })
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.members.iter().find_map(|m| match m {
            Member::Recorder(r) => Some(r),
            _ => None,
        })
    }

    /// Latest audio or video timestamp
    pub fn last_time(&self) -> Option<u32> {
        self.tracks.last_time()
    }

    /// Stream time now: the last timestamp advanced by the wall time since it
    /// was written.
    pub fn current_time(&self) -> u32 {
        match self.tracks.last_time() {
            Some(time) => time.wrapping_add(self.last_write.elapsed().as_millis() as u32),
            None => self.started_at.elapsed().as_millis() as u32,
        }
    }

    /// Begin publishing, or reset if already publishing. Segmenting follows
    /// the `segments` and `duration` properties.
    pub fn start(&mut self, recorder: Option<Recorder>) {
        if self.is_publishing() {
            self.reset();
        } else {
            self.state = PublishingState::Starting;
            self.started_at = Instant::now();
            self.last_write = self.started_at;
            self.byte_rate = ByteRate::new();
            self.max_byte_rate = 0;
            tracing::info!(stream = %self.name, "Publication started");
        }

        if let Some(recorder) = recorder {
            self.finish_recorder();
            self.members.push(Member::Recorder(recorder));
        }
        self.configure_segments();
    }

    fn configure_segments(&mut self) {
        let count = self.properties.get_number::<usize>("segments").unwrap_or(0);
        if count == 0 {
            let before = self.members.len();
            self.members.retain_mut(|m| match m {
                Member::Segmenter(s) => {
                    s.end_media();
                    false
                }
                _ => true,
            });
            if self.members.len() != before {
                tracing::debug!(stream = %self.name, "Segmenting disabled");
            }
            return;
        }

        let duration = self
            .properties
            .get_number::<u32>("duration")
            .map(|d| d.clamp(1, u16::MAX as u32) as u16)
            .unwrap_or(self.segment_options.default_duration);

        if let Some(segments) = self.segments_mut() {
            segments.set_max_segments(count);
            segments.set_segment_duration(duration);
            return;
        }

        let mut segments = Segments::new(self.name.clone(), count, duration);
        if let Some(dir) = &self.segment_options.dir {
            segments = segments.with_store(SegmentStore::new(
                dir.clone(),
                self.name.clone(),
                self.segment_options.format,
            ));
        }
        tracing::debug!(stream = %self.name, segments = count, duration = duration, "Segmenting enabled");
        self.members.push(Member::Segmenter(segments));
    }

    fn finish_recorder(&mut self) {
        self.members.retain_mut(|m| match m {
            Member::Recorder(r) => {
                r.finish();
                false
            }
            _ => true,
        });
    }

    /// Soft reset of a live publication: tracks are cleared, subscribers see
    /// end of media, and the segmenter marks a discontinuity. Properties stay
    /// and are re-sent.
    pub fn reset(&mut self) {
        if self.state != PublishingState::Live {
            return;
        }
        tracing::info!(stream = %self.name, "Publication reset");
        self.state = PublishingState::Starting;
        self.tracks.clear();
        self.sync_languages();
        self.prop_version = None;
        self.byte_rate = ByteRate::new();
        self.new_data = false;

        let id = self.id;
        self.members.retain_mut(|m| match m {
            Member::Subscriber(shared) => {
                let mut sub = shared.lock();
                if !sub.is_attached_to(id) {
                    return false;
                }
                sub.reset_media();
                true
            }
            Member::Segmenter(segments) => {
                segments.reset();
                true
            }
            Member::Recorder(_) => true,
        });
    }

    /// End media for attached subscribers that joined before any write.
    fn end_subscribers(&mut self) {
        let id = self.id;
        self.members.retain_mut(|m| match m {
            Member::Subscriber(shared) => {
                let mut sub = shared.lock();
                if !sub.is_attached_to(id) {
                    return false;
                }
                sub.reset_media();
                true
            }
            _ => true,
        });
    }

    /// Stop publishing. Subscribers stay attached and see end of media.
    pub fn stop(&mut self) {
        self.stop_with(|_| {});
    }

    /// Stop and run `on_stop` while the final state is still observable,
    /// before the recorder is closed.
    pub fn stop_with(&mut self, on_stop: impl FnOnce(&Publication)) {
        if !self.is_publishing() {
            return;
        }
        self.reset();
        self.end_subscribers();
        on_stop(self);
        self.finish_recorder();
        if let Some(segments) = self.segments_mut() {
            segments.end_media();
        }
        let id = self.id;
        for shared in self.waiting.drain(..) {
            let mut sub = shared.lock();
            if sub.is_waiting_for(id) {
                sub.cancel_switch();
            }
        }
        self.state = PublishingState::Stopped;
        tracing::info!(stream = %self.name, "Publication stopped");
    }

    fn accept_write(&mut self, kind: &str) -> bool {
        if !self.is_publishing() {
            tracing::error!(stream = %self.name, kind = kind, "Write on a stopped publication");
            return false;
        }
        self.state = PublishingState::Live;
        true
    }

    /// Write an audio packet; `tag.is_config` packets become the track config.
    pub fn write_audio(&mut self, track: u8, tag: &AudioTag, packet: &Bytes) {
        if !self.accept_write("audio") {
            return;
        }
        self.last_write = Instant::now();
        let state = self.tracks.audio_mut(track);
        state.last_time = Some(tag.time);
        state.lost.received(packet.len());

        self.flush_properties();
        self.received(packet.len());
        self.fan_out(Write::Audio(track, tag, packet));

        if tag.is_config {
            self.tracks.audio_mut(track).config = if packet.is_empty() {
                None
            } else {
                Some((*tag, packet.clone()))
            };
            if tag.codec == AudioCodec::Aac && !packet.is_empty() {
                self.log_aac_config(track, packet);
            }
        }
    }

    fn log_aac_config(&self, track: u8, packet: &Bytes) {
        match AudioSpecificConfig::parse(packet) {
            Ok(config) => tracing::debug!(
                stream = %self.name,
                track = track,
                profile = config.profile().map_or("unknown", |p| p.name()),
                rate = config.sampling_frequency,
                channels = config.channels(),
                "Audio config"
            ),
            Err(e) => tracing::warn!(stream = %self.name, track = track, error = %e, "Unreadable AAC config"),
        }
    }

    /// Write a video frame. While the track waits for a key frame after loss,
    /// inter frames are dropped.
    pub fn write_video(&mut self, track: u8, tag: &VideoTag, packet: &Bytes) {
        if !self.accept_write("video") {
            return;
        }
        self.last_write = Instant::now();
        let is_config = tag.is_config();
        let state = self.tracks.video_mut(track);
        state.last_time = Some(tag.time);
        state.lost.received(packet.len());
        if state.wait_key_frame && !is_config {
            if !tag.frame.is_key() {
                tracing::trace!(stream = %self.name, track = track, "Dropping frame until key frame");
                return;
            }
            state.wait_key_frame = false;
        }

        if tag.frame.is_key() && !is_config {
            self.switch_waiting(track);
        }

        self.flush_properties();
        self.received(packet.len());
        self.fan_out(Write::Video(track, tag, packet));

        if is_config {
            if !packet.is_empty() {
                let state = self.tracks.video_mut(track);
                state.set_config(*tag, packet.clone());
                if let Some(avc) = &state.avc {
                    tracing::debug!(
                        stream = %self.name,
                        track = track,
                        profile = avc.profile_name(),
                        level = avc.level,
                        "Video config"
                    );
                }
            }
        } else if tag.codec == VideoCodec::H264 {
            self.write_captions(track, tag, packet);
        }
    }

    /// Forward CEA-608/708 caption fields found in SEI units as data on
    /// track 1 (field 1) and track 2 (field 2).
    fn write_captions(&mut self, track: u8, tag: &VideoTag, packet: &Bytes) {
        let length_size = self
            .tracks
            .video(track)
            .map_or(4, |t| t.nalu_length_size());
        for caption in extract_captions(packet, length_size) {
            let data = caption.data;
            self.tracks.data_mut(caption.field).lost.received(data.len());
            self.fan_out(Write::Data(caption.field, DataType::Caption, &data, tag.time));
        }
    }

    /// Write a data packet, stamped at `current_time` for the segmenter
    pub fn write_data(&mut self, track: u8, ty: DataType, packet: &Bytes) {
        if !self.accept_write("data") {
            return;
        }
        let time = self.current_time();
        self.tracks.data_mut(track).lost.received(packet.len());
        self.flush_properties();
        self.received(packet.len());
        self.fan_out(Write::Data(track, ty, packet, time));
    }

    /// Replace all properties and push them to members at once. Does not by
    /// itself confirm a starting publication as live.
    pub fn write_properties(&mut self, properties: &Properties) {
        if !self.is_publishing() {
            tracing::error!(stream = %self.name, kind = "properties", "Write on a stopped publication");
            return;
        }
        let previous: Vec<String> = self
            .properties
            .iter()
            .map(|(k, _)| k.to_string())
            .filter(|k| properties.get(k).is_none())
            .collect();
        self.properties.set_all(properties.iter());
        for key in previous {
            self.on_param_change(&key, None);
        }
        self.sync_languages();
        self.flush_properties();
    }

    /// Set one property; pushed to members at the next write or flush.
    pub fn set_property(&mut self, key: &str, value: &str) -> bool {
        if !self.properties.set(key, value) {
            return false;
        }
        self.on_param_change(key, Some(value));
        true
    }

    /// Remove one property; pushed lazily like `set_property`
    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        let value = self.properties.remove(key)?;
        self.on_param_change(key, None);
        Some(value)
    }

    pub fn clear_properties(&mut self) {
        for key in self.properties.clear() {
            self.on_param_change(&key, None);
        }
    }

    /// Keep per-track language caches in line with `<track>.audioLang` and
    /// `<track>.textLang`.
    fn on_param_change(&mut self, key: &str, value: Option<&str>) {
        let Some((track, name)) = split_track(key) else {
            return;
        };
        let value = value.map(str::to_string);
        match name {
            "audioLang" => self.tracks.audio_mut(track).lang = value,
            "textLang" => self.tracks.data_mut(track).text_lang = value,
            _ => {}
        }
    }

    fn sync_languages(&mut self) {
        let entries: Vec<(String, String)> = self
            .properties
            .iter()
            .filter(|(k, _)| split_track(k).is_some())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, value) in entries {
            self.on_param_change(&key, Some(&value));
        }
    }

    /// End of a producer batch. `ping` is a round-trip sample in
    /// milliseconds.
    pub fn flush(&mut self, ping: Option<u32>) {
        if !self.accept_write("flush") {
            return;
        }
        if let Some(ping) = ping {
            self.latency = ping / 2;
        }
        self.byte_rate.tick();
        self.max_byte_rate = self.max_byte_rate.max(self.byte_rate.rate());
        self.flush_properties();
        if !self.new_data {
            return;
        }
        self.new_data = false;
        self.fan_out(Write::Flush);
    }

    /// Account `lost` audio packets
    pub fn report_lost_audio(&mut self, track: u8, lost: u32) {
        self.tracks.audio_mut(track).lost.lost(lost);
    }

    /// Loss on a video track drops frames until the next key frame.
    pub fn report_lost_video(&mut self, track: u8, lost: u32) {
        let state = self.tracks.video_mut(track);
        state.lost.lost(lost);
        state.wait_key_frame = true;
        tracing::debug!(stream = %self.name, track = track, lost = lost, "Video loss, waiting for key frame");
    }

    /// Account `lost` data packets
    pub fn report_lost_data(&mut self, track: u8, lost: u32) {
        self.tracks.data_mut(track).lost.lost(lost);
    }

    fn received(&mut self, bytes: usize) {
        self.byte_rate.add(bytes);
        self.new_data = true;
    }

    fn flush_properties(&mut self) {
        let version = self.properties.version();
        if self.prop_version == Some(version) {
            return;
        }
        self.prop_version = Some(version);
        self.fan_out(Write::Properties);
    }

    fn fan_out(&mut self, write: Write<'_>) {
        let id = self.id;
        let source = Source {
            name: &self.name,
            properties: &self.properties,
            tracks: &self.tracks,
        };
        self.members.retain_mut(|m| m.deliver(id, &source, write));
    }

    /// Cut over waiting subscriptions selecting `track`. They join the
    /// member list before the key frame is fanned out.
    fn switch_waiting(&mut self, track: u8) {
        if self.waiting.is_empty() {
            return;
        }
        let id = self.id;
        let mut switched = Vec::new();
        self.waiting.retain(|shared| {
            let mut sub = shared.lock();
            if !sub.is_waiting_for(id) {
                return false;
            }
            if !sub.selection().video.accepts(track) {
                return true;
            }
            sub.cut_over();
            switched.push(Arc::clone(shared));
            false
        });
        for shared in switched {
            tracing::info!(stream = %self.name, track = track, "Subscription switched on key frame");
            self.add_subscriber(&shared);
        }
    }

    /// Subscriptions currently receiving this publication
    pub fn subscriber_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| matches!(m, Member::Subscriber(s) if s.lock().is_attached_to(self.id)))
            .count()
    }

    /// Subscriptions waiting for a key frame to switch here
    pub fn waiting_count(&self) -> usize {
        self.waiting
            .iter()
            .filter(|s| s.lock().is_waiting_for(self.id))
            .count()
    }

    pub(crate) fn add_subscriber(&mut self, sub: &SharedSubscription) {
        let present = self
            .members
            .iter()
            .any(|m| matches!(m, Member::Subscriber(s) if Arc::ptr_eq(s, sub)));
        if !present {
            self.members.push(Member::Subscriber(Arc::clone(sub)));
        }
    }

    /// Add `shared` as a member. Joining a publishing stream announces it at
    /// once and replays the held configs of the selected tracks.
    pub(crate) fn join(&mut self, shared: &SharedSubscription) {
        self.add_subscriber(shared);
        if !self.is_publishing() {
            return;
        }
        let source = Source {
            name: &self.name,
            properties: &self.properties,
            tracks: &self.tracks,
        };
        shared.lock().join(&source);
    }

    pub(crate) fn remove_subscriber(&mut self, sub: &SharedSubscription) {
        self.members
            .retain(|m| !matches!(m, Member::Subscriber(s) if Arc::ptr_eq(s, sub)));
    }

    pub(crate) fn add_waiting(&mut self, sub: &SharedSubscription) {
        if !self.waiting.iter().any(|s| Arc::ptr_eq(s, sub)) {
            self.waiting.push(Arc::clone(sub));
        }
    }

    pub(crate) fn remove_waiting(&mut self, sub: &SharedSubscription) {
        self.waiting.retain(|s| !Arc::ptr_eq(s, sub));
    }

    /// Remove ejected subscriptions, returned as (attached, waiting).
    pub(crate) fn take_ejected(&mut self) -> (Vec<SharedSubscription>, Vec<SharedSubscription>) {
        let id = self.id;
        let mut attached = Vec::new();
        self.members.retain(|m| match m {
            Member::Subscriber(shared) => {
                let ejected = {
                    let sub = shared.lock();
                    sub.is_attached_to(id) && sub.ejected().is_some()
                };
                if ejected {
                    attached.push(Arc::clone(shared));
                }
                !ejected
            }
            _ => true,
        });
        let mut waiting = Vec::new();
        self.waiting.retain(|shared| {
            let ejected = {
                let sub = shared.lock();
                sub.is_waiting_for(id) && sub.ejected().is_some()
            };
            if ejected {
                waiting.push(Arc::clone(shared));
            }
            !ejected
        });
        (attached, waiting)
    }

    /// Drop member and waiting entries that point elsewhere now.
    pub(crate) fn prune(&mut self) {
        let id = self.id;
        self.members.retain(|m| match m {
            Member::Subscriber(s) => s.lock().is_attached_to(id),
            _ => true,
        });
        self.waiting.retain(|s| s.lock().is_waiting_for(id));
    }

    /// Snapshot for diagnostics
    pub fn stats(&self) -> PublicationStats {
        PublicationStats {
            name: self.name.clone(),
            state: self.state,
            subscribers: self.subscriber_count(),
            waiting: self.waiting_count(),
            byte_rate: self.byte_rate.rate(),
            max_byte_rate: self.max_byte_rate,
            bytes_received: self.byte_rate.total(),
            lost_rate: self.tracks.lost_ratio(),
            latency: self.latency,
            audio_tracks: self.tracks.audio_count(),
            video_tracks: self.tracks.video_count(),
            data_tracks: self.tracks.data_count(),
            segments: self.segments().map(|s| s.count()),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl std::fmt::Debug for Publication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publication")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("members", &self.members.len())
            .field("waiting", &self.waiting.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::h264::tests::{caption_keyframe, AVC_CONFIG};
    use crate::media::{AudioCodec, FrameType};
    use crate::subscription::mock::{Event, RecordingTarget};
    use crate::subscription::Subscription;

    fn attach(publication: &mut Publication) -> (SharedSubscription, RecordingTarget) {
        let target = RecordingTarget::new();
        let sub = Subscription::shared(target.clone());
        sub.lock().attach(publication.id(), publication.name());
        publication.add_subscriber(&sub);
        (sub, target)
    }

    fn key(time: u32) -> VideoTag {
        VideoTag::new(VideoCodec::H264, FrameType::Key, time)
    }

    fn inter(time: u32) -> VideoTag {
        VideoTag::new(VideoCodec::H264, FrameType::Inter, time)
    }

    #[test]
    fn test_write_on_stopped_publication_is_dropped() {
        let mut publication = Publication::new("live");
        let (_sub, target) = attach(&mut publication);
        let tag = AudioTag::new(AudioCodec::Aac, 0);
        publication.write_audio(1, &tag, &Bytes::from_static(&[1]));
        assert!(target.events().is_empty());
        assert_eq!(publication.state(), PublishingState::Stopped);
    }

    #[test]
    fn test_state_transitions() {
        let mut publication = Publication::new("live");
        publication.start(None);
        assert_eq!(publication.state(), PublishingState::Starting);
        assert_eq!(publication.state().as_i8(), -1);
        publication.flush(None);
        assert_eq!(publication.state(), PublishingState::Live);
        publication.reset();
        assert_eq!(publication.state(), PublishingState::Starting);
        publication.stop();
        assert_eq!(publication.state(), PublishingState::Stopped);
        assert_eq!(publication.state().as_i8(), 0);
    }

    #[test]
    fn test_late_joiner_receives_held_config() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let config = AudioTag::new(AudioCodec::Aac, 0).config();
        publication.write_audio(1, &config, &Bytes::from_static(&[0x12, 0x10]));
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 20), &Bytes::from_static(&[1]));

        let (_sub, target) = attach(&mut publication);
        let payload = Bytes::from_static(&[2, 3]);
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 40), &payload);

        let media = target.media();
        assert_eq!(media.len(), 2);
        assert!(matches!(&media[0], Event::Audio { tag, packet, .. }
            if tag.is_config && tag.time == 40 && packet.as_ref() == [0x12, 0x10]));
        assert!(matches!(&media[1], Event::Audio { packet, .. } if *packet == payload));
    }

    #[test]
    fn test_existing_subscriber_not_sent_config_twice() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        let config = AudioTag::new(AudioCodec::Aac, 0).config();
        publication.write_audio(1, &config, &Bytes::from_static(&[0x12, 0x10]));
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 20), &Bytes::from_static(&[1]));
        assert_eq!(target.media().len(), 2);
    }

    #[test]
    fn test_loss_drops_until_key_frame() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        publication.write_video(1, &key(0), &Bytes::from_static(&[0, 0, 0, 1, 0x65]));
        publication.report_lost_video(1, 100);
        assert!(publication.tracks().video(1).is_some_and(|t| t.wait_key_frame));

        publication.write_video(1, &inter(40), &Bytes::from_static(&[1]));
        publication.write_video(1, &inter(80), &Bytes::from_static(&[2]));
        assert_eq!(target.media().len(), 1);

        publication.write_video(1, &key(120), &Bytes::from_static(&[3]));
        publication.write_video(1, &inter(160), &Bytes::from_static(&[4]));
        assert_eq!(target.media().len(), 3);
        assert!(publication.tracks().video(1).is_some_and(|t| !t.wait_key_frame));
    }

    #[test]
    fn test_reset_notifies_once_and_clears_tracks() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        let config = AudioTag::new(AudioCodec::Aac, 0).config();
        publication.write_audio(1, &config, &Bytes::from_static(&[0x12, 0x10]));
        assert!(publication.tracks().audio_config(1).is_some());

        publication.reset();
        publication.reset();
        assert_eq!(target.count(|e| *e == Event::End), 1);
        assert!(publication.tracks().audio_config(1).is_none());
        assert_eq!(publication.subscriber_count(), 1);
        assert!(publication.is_publishing());
    }

    #[test]
    fn test_start_on_live_publication_resets() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 0), &Bytes::from_static(&[1]));
        let id = publication.id();
        publication.start(None);
        assert_eq!(publication.id(), id);
        assert_eq!(target.count(|e| *e == Event::End), 1);
        assert_eq!(publication.state(), PublishingState::Starting);
    }

    #[test]
    fn test_properties_flushed_once_per_batch() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 0), &Bytes::from_static(&[1]));

        publication.set_property("title", "a");
        publication.set_property("artist", "b");
        publication.flush(None);
        publication.flush(None);
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 20), &Bytes::from_static(&[1]));
        assert_eq!(target.count(|e| matches!(e, Event::Properties(_))), 1);
    }

    #[test]
    fn test_properties_precede_dependent_media() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 0), &Bytes::from_static(&[1]));
        publication.set_property("title", "a");
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 20), &Bytes::from_static(&[2]));

        let events = target.events();
        let props = events.iter().position(|e| matches!(e, Event::Properties(_)));
        let last = events.iter().rposition(|e| matches!(e, Event::Audio { .. }));
        assert!(props < last);
    }

    #[test]
    fn test_track_language_hooks() {
        let mut publication = Publication::new("live");
        publication.set_property("1.audioLang", "en");
        publication.set_property("2.textLang", "fr");
        assert_eq!(publication.tracks().audio(1).and_then(|t| t.lang.as_deref()), Some("en"));
        assert_eq!(
            publication.tracks().data(2).and_then(|t| t.text_lang.as_deref()),
            Some("fr")
        );
        publication.remove_property("1.audioLang");
        assert_eq!(publication.tracks().audio(1).and_then(|t| t.lang.clone()), None);
        publication.clear_properties();
        assert_eq!(publication.tracks().data(2).and_then(|t| t.text_lang.clone()), None);
    }

    #[test]
    fn test_languages_survive_reset() {
        let mut publication = Publication::new("live");
        publication.start(None);
        publication.set_property("1.audioLang", "de");
        publication.flush(None);
        publication.reset();
        assert_eq!(publication.tracks().audio(1).and_then(|t| t.lang.as_deref()), Some("de"));
    }

    #[test]
    fn test_replacing_properties_does_not_confirm_live() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        let mut props = Properties::new();
        props.set("title", "a");
        props.set("1.audioLang", "en");
        publication.write_properties(&props);

        assert_eq!(publication.state(), PublishingState::Starting);
        assert_eq!(publication.tracks().audio(1).and_then(|t| t.lang.as_deref()), Some("en"));
        // the target has not begun media yet, it gets them with the first packet
        assert!(target.events().is_empty());

        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 0), &Bytes::from_static(&[1]));
        assert_eq!(publication.state(), PublishingState::Live);
        assert_eq!(target.count(|e| matches!(e, Event::Properties(_))), 1);

        let mut next = Properties::new();
        next.set("title", "b");
        publication.write_properties(&next);
        assert_eq!(publication.tracks().audio(1).and_then(|t| t.lang.clone()), None);
        assert_eq!(target.count(|e| matches!(e, Event::Properties(_))), 2);
    }

    #[test]
    fn test_join_before_first_write_ends_on_stop() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let target = RecordingTarget::new();
        let sub = Subscription::shared(target.clone());
        sub.lock().attach(publication.id(), publication.name());
        publication.join(&sub);
        assert_eq!(target.events(), vec![Event::Begin("live".into())]);

        publication.stop();
        publication.stop();
        assert_eq!(target.events(), vec![Event::Begin("live".into()), Event::End]);
        assert_eq!(publication.subscriber_count(), 1);
    }

    #[test]
    fn test_join_stopped_publication_stays_silent() {
        let mut publication = Publication::new("live");
        let target = RecordingTarget::new();
        let sub = Subscription::shared(target.clone());
        sub.lock().attach(publication.id(), publication.name());
        publication.join(&sub);
        assert!(target.events().is_empty());
        assert_eq!(publication.subscriber_count(), 1);
    }

    #[test]
    fn test_flush_forwarded_only_with_new_data() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 0), &Bytes::from_static(&[1]));
        publication.flush(Some(80));
        publication.flush(None);
        assert_eq!(target.count(|e| *e == Event::Flush), 1);
        assert_eq!(publication.latency(), 40);
    }

    #[test]
    fn test_captions_forwarded_as_data() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (_sub, target) = attach(&mut publication);
        let config = VideoTag::new(VideoCodec::H264, FrameType::Config, 0);
        publication.write_video(1, &config, &Bytes::from_static(AVC_CONFIG));
        let frame = Bytes::from(caption_keyframe());
        publication.write_video(1, &key(0), &frame);

        let media = target.media();
        assert!(matches!(&media[1], Event::Video { packet, .. } if *packet == frame));
        assert!(media
            .iter()
            .any(|e| matches!(e, Event::Data { ty: DataType::Caption, .. })));
    }

    #[test]
    fn test_detached_subscriber_pruned_on_write() {
        let mut publication = Publication::new("live");
        publication.start(None);
        let (sub, target) = attach(&mut publication);
        sub.lock().detach();
        publication.write_audio(1, &AudioTag::new(AudioCodec::Aac, 0), &Bytes::from_static(&[1]));
        assert!(target.media().is_empty());
        assert_eq!(publication.subscriber_count(), 0);
    }

    #[test]
    fn test_segmenting_from_properties() {
        let mut publication = Publication::new("live");
        publication.set_property("segments", "3");
        publication.set_property("duration", "1000");
        publication.start(None);
        let segments = publication.segments().unwrap();
        assert_eq!(segments.max_segments(), 3);
        assert_eq!(segments.segment_duration(), 1000);

        let tag = |t| AudioTag::new(AudioCodec::Aac, t);
        for t in (0..=5000).step_by(500) {
            publication.write_audio(1, &tag(t), &Bytes::from_static(&[1]));
        }
        let segments = publication.segments().unwrap();
        assert!(segments.count() <= 3);
        assert!(segments.count() > 0);

        publication.remove_property("segments");
        publication.start(None);
        assert!(publication.segments().is_none());
    }

    #[test]
    fn test_stop_callback_runs_before_recorder_closes() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::create(dir.path().join("live.flv"), MediaFormat::Flv).unwrap();
        let mut publication = Publication::new("live");
        publication.start(Some(recorder));
        publication.flush(None);

        let mut seen = None;
        publication.stop_with(|p| seen = p.recorder().map(|r| r.is_active()));
        assert_eq!(seen, Some(true));
        assert!(publication.recorder().is_none());
    }

    #[test]
    fn test_waiting_subscription_switches_on_key_frame() {
        let mut old = Publication::new("low");
        old.start(None);
        let (sub, target) = attach(&mut old);

        let mut new = Publication::new("high");
        new.start(None);
        new.write_video(1, &key(0), &Bytes::from_static(&[9]));
        sub.lock().wait_for(new.id(), new.name());
        new.add_waiting(&sub);

        new.write_video(1, &inter(40), &Bytes::from_static(&[1]));
        assert!(target.media().is_empty());
        new.write_video(1, &key(80), &Bytes::from_static(&[2]));
        assert_eq!(sub.lock().publication(), Some("high"));
        assert_eq!(new.subscriber_count(), 1);
        assert_eq!(new.waiting_count(), 0);

        old.write_video(1, &key(80), &Bytes::from_static(&[3]));
        assert_eq!(old.subscriber_count(), 0);
        assert_eq!(target.media().len(), 1);
    }
}
