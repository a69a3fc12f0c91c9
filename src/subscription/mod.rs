//! Consumer attachment to a publication
//!
//! A [`Subscription`] wraps a [`Target`] and keeps the replay state that makes
//! late joining work: the stream is announced with `begin_media` and the
//! current properties right before the first delivered packet, and each
//! track's held config is replayed ahead of its first payload.
//!
//! A subscription points at one publication and, during a bitrate switch, at
//! the publication it is waiting to cut over to. Neither side owns the other:
//! publications skip entries that no longer point at them.

pub mod selection;
pub mod target;

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::media::{AudioTag, DataType, Properties, VideoTag};
use crate::publication::{PublicationId, Source};

pub use selection::{Selection, TrackFilter};
pub use target::{Ejected, Target};

/// Handle shared by the session that owns the subscription and the
/// publications it is attached to
pub type SharedSubscription = Arc<Mutex<Subscription>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attachment {
    pub id: PublicationId,
    pub name: String,
}

pub struct Subscription {
    target: Box<dyn Target>,
    properties: Properties,
    selection: Selection,
    current: Option<Attachment>,
    next: Option<Attachment>,
    media_begun: bool,
    /// Property version last synced with the target
    prop_version: Option<u32>,
    /// The target holds properties from this media
    props_sent: bool,
    audio_ready: BTreeSet<u8>,
    /// Video tracks that reached a key frame
    video_ready: BTreeSet<u8>,
    /// Video tracks that received a config since the last cutover
    video_configured: BTreeSet<u8>,
}

impl Subscription {
    pub fn new(target: impl Target + 'static) -> Self {
        Self {
            target: Box::new(target),
            properties: Properties::new(),
            selection: Selection::default(),
            current: None,
            next: None,
            media_begun: false,
            prop_version: None,
            props_sent: false,
            audio_ready: BTreeSet::new(),
            video_ready: BTreeSet::new(),
            video_configured: BTreeSet::new(),
        }
    }

    pub fn shared(target: impl Target + 'static) -> SharedSubscription {
        Arc::new(Mutex::new(Self::new(target)))
    }

    pub fn target(&self) -> &dyn Target {
        self.target.as_ref()
    }

    pub fn target_mut(&mut self) -> &mut dyn Target {
        self.target.as_mut()
    }

    /// Parameters given at subscribe time
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Name of the publication currently delivering
    pub fn publication(&self) -> Option<&str> {
        self.current.as_ref().map(|a| a.name.as_str())
    }

    /// Name of the publication a pending switch waits on
    pub fn next_publication(&self) -> Option<&str> {
        self.next.as_ref().map(|a| a.name.as_str())
    }

    pub fn is_media_begun(&self) -> bool {
        self.media_begun
    }

    pub fn ejected(&self) -> Option<Ejected> {
        self.target.ejected()
    }

    pub(crate) fn configure(&mut self, params: Properties) {
        self.selection = Selection::from_properties(&params);
        self.properties = params;
    }

    pub(crate) fn current(&self) -> Option<&Attachment> {
        self.current.as_ref()
    }

    pub(crate) fn next(&self) -> Option<&Attachment> {
        self.next.as_ref()
    }

    pub(crate) fn is_attached_to(&self, id: PublicationId) -> bool {
        self.current.as_ref().is_some_and(|a| a.id == id)
    }

    pub(crate) fn is_waiting_for(&self, id: PublicationId) -> bool {
        self.next.as_ref().is_some_and(|a| a.id == id)
    }

    pub(crate) fn attach(&mut self, id: PublicationId, name: &str) {
        self.current = Some(Attachment {
            id,
            name: name.to_string(),
        });
    }

    pub(crate) fn wait_for(&mut self, id: PublicationId, name: &str) {
        self.next = Some(Attachment {
            id,
            name: name.to_string(),
        });
    }

    pub(crate) fn cancel_switch(&mut self) -> Option<Attachment> {
        self.next.take()
    }

    /// End media and forget both attachments
    pub(crate) fn detach(&mut self) -> (Option<Attachment>, Option<Attachment>) {
        self.reset_media();
        (self.current.take(), self.next.take())
    }

    /// Promote the pending publication to current. Media stays open; configs
    /// and properties are replayed from the new source.
    pub(crate) fn cut_over(&mut self) -> bool {
        let Some(next) = self.next.take() else {
            return false;
        };
        self.current = Some(next);
        self.clear_replay();
        true
    }

    /// Signal the end of the current media, once.
    pub fn reset_media(&mut self) {
        if self.media_begun {
            self.media_begun = false;
            self.target.end_media();
        }
        self.props_sent = false;
        self.clear_replay();
    }

    fn clear_replay(&mut self) {
        self.prop_version = None;
        self.audio_ready.clear();
        self.video_ready.clear();
        self.video_configured.clear();
    }

    fn begin(&mut self, source: &Source<'_>) {
        if !self.media_begun {
            self.media_begun = true;
            self.target.begin_media(source.name);
        }
        self.sync_properties(source.properties);
    }

    fn sync_properties(&mut self, properties: &Properties) {
        let version = properties.version();
        if self.prop_version == Some(version) {
            return;
        }
        if self.props_sent || !properties.is_empty() {
            self.target.write_properties(properties);
            self.props_sent = true;
        }
        self.prop_version = Some(version);
    }

    /// Announce a publishing source right away and send the held configs of
    /// the selected tracks. Video still starts at the next key frame.
    pub(crate) fn join(&mut self, source: &Source<'_>) {
        self.begin(source);
        for (track, (tag, config)) in source.tracks.audio_configs() {
            if self.selection.audio.accepts(track) && self.audio_ready.insert(track) {
                self.target.write_audio(track, tag, config);
            }
        }
        for (track, (tag, config)) in source.tracks.video_configs() {
            if self.selection.video.accepts(track) && self.video_configured.insert(track) {
                self.target.write_video(track, tag, config);
            }
        }
    }

    pub(crate) fn write_properties(&mut self, source: &Source<'_>) {
        if self.media_begun {
            self.sync_properties(source.properties);
        }
    }

    pub(crate) fn write_audio(
        &mut self,
        source: &Source<'_>,
        track: u8,
        tag: &AudioTag,
        packet: &Bytes,
    ) {
        if !self.selection.audio.accepts(track) {
            return;
        }
        self.begin(source);
        if self.audio_ready.insert(track) && !tag.is_config {
            if let Some((config_tag, config)) = source.tracks.audio_config(track) {
                let mut config_tag = *config_tag;
                config_tag.time = tag.time;
                self.target.write_audio(track, &config_tag, config);
            }
        }
        self.target.write_audio(track, tag, packet);
    }

    pub(crate) fn write_video(
        &mut self,
        source: &Source<'_>,
        track: u8,
        tag: &VideoTag,
        packet: &Bytes,
    ) {
        if !self.selection.video.accepts(track) {
            return;
        }
        if tag.is_config() {
            self.begin(source);
            self.video_configured.insert(track);
            self.target.write_video(track, tag, packet);
            return;
        }
        if !self.video_ready.contains(&track) {
            if !tag.frame.is_key() {
                tracing::trace!(stream = %source.name, track = track, "waiting for key frame");
                return;
            }
            self.begin(source);
            self.video_ready.insert(track);
            if self.video_configured.insert(track) {
                if let Some((config_tag, config)) = source.tracks.video_config(track) {
                    let mut config_tag = *config_tag;
                    config_tag.time = tag.time;
                    self.target.write_video(track, &config_tag, config);
                }
            }
        } else {
            self.begin(source);
        }
        self.target.write_video(track, tag, packet);
    }

    pub(crate) fn write_data(&mut self, source: &Source<'_>, track: u8, ty: DataType, packet: &Bytes) {
        if !self.selection.data.accepts(track) {
            return;
        }
        self.begin(source);
        self.target.write_data(track, ty, packet);
    }

    pub(crate) fn flush(&mut self) {
        if self.media_begun {
            self.target.flush();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("publication", &self.publication())
            .field("next", &self.next_publication())
            .field("selection", &self.selection)
            .field("media_begun", &self.media_begun)
            .finish()
    }
}
