//! Track selection from subscribe parameters
//!
//! `audioTrack`, `videoTrack` and `dataTrack` accept `all`, `none` or a
//! track number. `timeout=0` asks not to wait for an absent publication.

use crate::media::Properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackFilter {
    #[default]
    All,
    None,
    Only(u8),
}

impl TrackFilter {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            Some(TrackFilter::All)
        } else if value.eq_ignore_ascii_case("none") {
            Some(TrackFilter::None)
        } else {
            value.parse().ok().map(TrackFilter::Only)
        }
    }

    pub fn accepts(&self, track: u8) -> bool {
        match self {
            TrackFilter::All => true,
            TrackFilter::None => false,
            TrackFilter::Only(n) => *n == track,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub audio: TrackFilter,
    pub video: TrackFilter,
    pub data: TrackFilter,
    /// Seconds to wait for a publisher; `Some(0)` means fail at once
    pub timeout: Option<u32>,
}

impl Selection {
    /// Read selection parameters, keeping defaults for missing or malformed
    /// values.
    pub fn from_properties(properties: &Properties) -> Self {
        let filter = |key| {
            properties
                .get(key)
                .and_then(TrackFilter::parse)
                .unwrap_or_default()
        };
        Self {
            audio: filter("audioTrack"),
            video: filter("videoTrack"),
            data: filter("dataTrack"),
            timeout: properties.get_number("timeout"),
        }
    }

    pub fn waits(&self) -> bool {
        self.timeout != Some(0)
    }
}
