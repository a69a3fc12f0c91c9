//! Registry configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::media::MediaFormat;
use crate::publication::SegmentOptions;
use crate::segments::DURATION_TIMEOUT;

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Tick of the maintenance pass (ejection and waiting-key checks)
    pub maintenance_interval: Duration,

    /// Directory recorder files are created in
    pub record_dir: PathBuf,

    /// Directory completed segments are written to (None = memory only)
    pub segments_dir: Option<PathBuf>,

    /// Container format of persisted segments
    pub segment_format: MediaFormat,

    /// Segment duration budget in milliseconds when `duration` is not set
    pub default_segment_duration: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(1),
            record_dir: PathBuf::from("."),
            segments_dir: None,
            segment_format: MediaFormat::Ts,
            default_segment_duration: DURATION_TIMEOUT,
        }
    }
}

impl RegistryConfig {
    /// Set the maintenance interval
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Set the recording directory
    pub fn record_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_dir = dir.into();
        self
    }

    /// Persist completed segments under `dir`
    pub fn segments_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.segments_dir = Some(dir.into());
        self
    }

    /// Set the segment container format
    pub fn segment_format(mut self, format: MediaFormat) -> Self {
        self.segment_format = format;
        self
    }

    /// Set the default segment duration (milliseconds, at least 1)
    pub fn default_segment_duration(mut self, duration: u16) -> Self {
        self.default_segment_duration = duration.max(1);
        self
    }

    pub(crate) fn segment_options(&self) -> SegmentOptions {
        SegmentOptions {
            format: self.segment_format,
            default_duration: self.default_segment_duration,
            dir: self.segments_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.maintenance_interval, Duration::from_secs(1));
        assert_eq!(config.record_dir, PathBuf::from("."));
        assert!(config.segments_dir.is_none());
        assert_eq!(config.segment_format, MediaFormat::Ts);
        assert_eq!(config.default_segment_duration, 10_000);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::default()
            .maintenance_interval(Duration::from_millis(250))
            .segments_dir("/tmp/hls")
            .segment_format(MediaFormat::Flv)
            .default_segment_duration(0);

        assert_eq!(config.maintenance_interval, Duration::from_millis(250));
        assert_eq!(config.segments_dir, Some(PathBuf::from("/tmp/hls")));
        assert_eq!(config.default_segment_duration, 1);

        let options = config.segment_options();
        assert_eq!(options.format, MediaFormat::Flv);
        assert_eq!(options.default_duration, 1);
    }
}
