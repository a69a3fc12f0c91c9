//! Windowed rate accounting
//!
//! Both counters accumulate over one-second windows and report the last
//! completed window. Values are diagnostics only.

use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Bytes per second
#[derive(Debug, Clone)]
pub struct ByteRate {
    window_start: Instant,
    bytes: u64,
    rate: u64,
    total: u64,
}

impl ByteRate {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub(crate) fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            bytes: 0,
            rate: 0,
            total: 0,
        }
    }

    pub fn add(&mut self, bytes: usize) {
        self.add_at(bytes, Instant::now());
    }

    pub(crate) fn add_at(&mut self, bytes: usize, now: Instant) {
        self.roll_at(now);
        self.bytes += bytes as u64;
        self.total += bytes as u64;
    }

    /// Close the window if it has elapsed
    pub fn tick(&mut self) {
        self.roll_at(Instant::now());
    }

    pub(crate) fn roll_at(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < WINDOW {
            return;
        }
        let ms = elapsed.as_millis().max(1) as u64;
        self.rate = self.bytes * 1000 / ms;
        self.bytes = 0;
        self.window_start = now;
    }

    /// Bytes per second over the last completed window
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Bytes since creation
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for ByteRate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proportion of lost bytes
#[derive(Debug, Clone)]
pub struct LostRate {
    window_start: Instant,
    received: u64,
    lost: u64,
    ratio: f64,
}

impl LostRate {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub(crate) fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            received: 0,
            lost: 0,
            ratio: 0.0,
        }
    }

    pub fn received(&mut self, bytes: usize) {
        self.received_at(bytes, Instant::now());
    }

    pub fn lost(&mut self, bytes: u32) {
        self.lost_at(bytes, Instant::now());
    }

    pub(crate) fn received_at(&mut self, bytes: usize, now: Instant) {
        self.roll_at(now);
        self.received += bytes as u64;
    }

    pub(crate) fn lost_at(&mut self, bytes: u32, now: Instant) {
        self.roll_at(now);
        self.lost += bytes as u64;
    }

    fn roll_at(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) < WINDOW {
            return;
        }
        let total = self.received + self.lost;
        self.ratio = if total == 0 {
            0.0
        } else {
            self.lost as f64 / total as f64
        };
        self.received = 0;
        self.lost = 0;
        self.window_start = now;
    }

    /// Lost share of the last completed window, in `0.0..=1.0`
    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl Default for LostRate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_rate_reports_completed_window() {
        let start = Instant::now();
        let mut rate = ByteRate::starting_at(start);
        rate.add_at(500, start);
        rate.add_at(500, start + Duration::from_millis(400));
        assert_eq!(rate.rate(), 0);

        rate.roll_at(start + Duration::from_secs(1));
        assert_eq!(rate.rate(), 1000);
        assert_eq!(rate.total(), 1000);

        // an idle window reports zero
        rate.roll_at(start + Duration::from_secs(2));
        assert_eq!(rate.rate(), 0);
    }

    #[test]
    fn test_byte_rate_normalizes_long_window() {
        let start = Instant::now();
        let mut rate = ByteRate::starting_at(start);
        rate.add_at(4000, start);
        rate.roll_at(start + Duration::from_secs(2));
        assert_eq!(rate.rate(), 2000);
    }

    #[test]
    fn test_lost_ratio() {
        let start = Instant::now();
        let mut lost = LostRate::starting_at(start);
        lost.received_at(900, start);
        lost.lost_at(100, start);
        assert_eq!(lost.ratio(), 0.0);
        lost.received_at(0, start + Duration::from_secs(1));
        assert!((lost.ratio() - 0.1).abs() < 1e-9);
    }
}
