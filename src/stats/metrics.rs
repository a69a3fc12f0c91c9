//! Diagnostic snapshots of publications and the registry

use std::time::Duration;

use crate::publication::PublishingState;

/// Point-in-time view of one publication
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationStats {
    /// Stream name
    pub name: String,
    pub state: PublishingState,
    /// Subscriptions currently receiving this stream
    pub subscribers: usize,
    /// Subscriptions waiting for a key frame to switch here
    pub waiting: usize,
    /// Bytes per second over the last completed window
    pub byte_rate: u64,
    /// Highest byte rate seen since start
    pub max_byte_rate: u64,
    /// Total bytes received since start
    pub bytes_received: u64,
    /// Worst lost ratio across tracks
    pub lost_rate: f64,
    /// Half the last reported round trip, in milliseconds
    pub latency: u32,
    pub audio_tracks: usize,
    pub video_tracks: usize,
    pub data_tracks: usize,
    /// Completed segments in the live window, when segmenting
    pub segments: Option<usize>,
    pub uptime: Duration,
}

impl PublicationStats {
    /// Byte rate expressed in bits per second
    pub fn bitrate(&self) -> u64 {
        self.byte_rate * 8
    }
}

/// Aggregate view of a registry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryStats {
    /// Entries in the registry, published or only subscribed
    pub publications: usize,
    /// Entries with a live producer
    pub publishing: usize,
    pub subscribers: usize,
    pub waiting: usize,
}

impl RegistryStats {
    pub(crate) fn add(&mut self, stats: &PublicationStats) {
        self.publications += 1;
        if stats.state != PublishingState::Stopped {
            self.publishing += 1;
        }
        self.subscribers += stats.subscribers;
        self.waiting += stats.waiting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(state: PublishingState, subscribers: usize) -> PublicationStats {
        PublicationStats {
            name: "live".into(),
            state,
            subscribers,
            waiting: 0,
            byte_rate: 1000,
            max_byte_rate: 1000,
            bytes_received: 0,
            lost_rate: 0.0,
            latency: 0,
            audio_tracks: 0,
            video_tracks: 0,
            data_tracks: 0,
            segments: None,
            uptime: Duration::ZERO,
        }
    }

    #[test]
    fn test_bitrate() {
        assert_eq!(stats(PublishingState::Live, 0).bitrate(), 8000);
    }

    #[test]
    fn test_registry_aggregate() {
        let mut total = RegistryStats::default();
        total.add(&stats(PublishingState::Live, 2));
        total.add(&stats(PublishingState::Stopped, 1));
        assert_eq!(total.publications, 2);
        assert_eq!(total.publishing, 1);
        assert_eq!(total.subscribers, 3);
    }
}
