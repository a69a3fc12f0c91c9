//! Per-track publication state
//!
//! Tracks are created on first use. Their config packets are what late
//! joiners receive before any payload.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::rate::LostRate;
use crate::media::h264::AvcConfig;
use crate::media::time::latest;
use crate::media::{AudioTag, VideoCodec, VideoTag};
use crate::subscription::TrackFilter;

#[derive(Debug, Clone, Default)]
pub struct AudioTrack {
    /// From the `<track>.audioLang` property
    pub lang: Option<String>,
    pub(crate) config: Option<(AudioTag, Bytes)>,
    pub(crate) lost: LostRate,
    pub(crate) last_time: Option<u32>,
}

impl AudioTrack {
    pub fn config(&self) -> Option<&(AudioTag, Bytes)> {
        self.config.as_ref()
    }

    pub fn lost_ratio(&self) -> f64 {
        self.lost.ratio()
    }

    pub fn last_time(&self) -> Option<u32> {
        self.last_time
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoTrack {
    pub(crate) config: Option<(VideoTag, Bytes)>,
    /// Parsed H.264 config, for NAL length size
    pub(crate) avc: Option<AvcConfig>,
    /// Drop frames until the next key frame
    pub wait_key_frame: bool,
    pub(crate) lost: LostRate,
    pub(crate) last_time: Option<u32>,
}

impl VideoTrack {
    pub fn config(&self) -> Option<&(VideoTag, Bytes)> {
        self.config.as_ref()
    }

    pub(crate) fn set_config(&mut self, tag: VideoTag, packet: Bytes) {
        self.avc = if tag.codec == VideoCodec::H264 {
            AvcConfig::parse(packet.clone()).ok()
        } else {
            None
        };
        self.config = Some((tag, packet));
    }

    pub fn nalu_length_size(&self) -> u8 {
        self.avc.as_ref().map_or(4, |c| c.nalu_length_size)
    }

    pub fn lost_ratio(&self) -> f64 {
        self.lost.ratio()
    }

    pub fn last_time(&self) -> Option<u32> {
        self.last_time
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataTrack {
    /// From the `<track>.textLang` property
    pub text_lang: Option<String>,
    pub(crate) lost: LostRate,
}

impl DataTrack {
    pub fn lost_ratio(&self) -> f64 {
        self.lost.ratio()
    }
}

/// All tracks of a publication, keyed by track number
#[derive(Debug, Clone, Default)]
pub struct Tracks {
    pub(crate) audios: BTreeMap<u8, AudioTrack>,
    pub(crate) videos: BTreeMap<u8, VideoTrack>,
    pub(crate) datas: BTreeMap<u8, DataTrack>,
}

impl Tracks {
    pub fn audio(&self, track: u8) -> Option<&AudioTrack> {
        self.audios.get(&track)
    }

    pub fn video(&self, track: u8) -> Option<&VideoTrack> {
        self.videos.get(&track)
    }

    pub fn data(&self, track: u8) -> Option<&DataTrack> {
        self.datas.get(&track)
    }

    pub(crate) fn audio_mut(&mut self, track: u8) -> &mut AudioTrack {
        self.audios.entry(track).or_default()
    }

    pub(crate) fn video_mut(&mut self, track: u8) -> &mut VideoTrack {
        self.videos.entry(track).or_default()
    }

    pub(crate) fn data_mut(&mut self, track: u8) -> &mut DataTrack {
        self.datas.entry(track).or_default()
    }

    pub fn audio_config(&self, track: u8) -> Option<&(AudioTag, Bytes)> {
        self.audios.get(&track).and_then(|t| t.config.as_ref())
    }

    pub fn video_config(&self, track: u8) -> Option<&(VideoTag, Bytes)> {
        self.videos.get(&track).and_then(|t| t.config.as_ref())
    }

    /// Held audio configs by track number
    pub fn audio_configs(&self) -> impl Iterator<Item = (u8, &(AudioTag, Bytes))> {
        self.audios
            .iter()
            .filter_map(|(&track, t)| t.config.as_ref().map(|c| (track, c)))
    }

    /// Held video configs by track number
    pub fn video_configs(&self) -> impl Iterator<Item = (u8, &(VideoTag, Bytes))> {
        self.videos
            .iter()
            .filter_map(|(&track, t)| t.config.as_ref().map(|c| (track, c)))
    }

    /// Whether a video track passes `filter`
    pub fn has_video(&self, filter: TrackFilter) -> bool {
        self.videos.keys().any(|&track| filter.accepts(track))
    }

    pub fn audio_count(&self) -> usize {
        self.audios.len()
    }

    pub fn video_count(&self) -> usize {
        self.videos.len()
    }

    pub fn data_count(&self) -> usize {
        self.datas.len()
    }

    /// Latest audio or video timestamp written
    pub fn last_time(&self) -> Option<u32> {
        let audio = self.audios.values().filter_map(|t| t.last_time);
        let video = self.videos.values().filter_map(|t| t.last_time);
        audio.chain(video).reduce(latest)
    }

    /// Highest lost ratio across tracks
    pub fn lost_ratio(&self) -> f64 {
        let audio = self.audios.values().map(|t| t.lost.ratio());
        let video = self.videos.values().map(|t| t.lost.ratio());
        let data = self.datas.values().map(|t| t.lost.ratio());
        audio.chain(video).chain(data).fold(0.0, f64::max)
    }

    pub(crate) fn clear(&mut self) {
        self.audios.clear();
        self.videos.clear();
        self.datas.clear();
    }
}
