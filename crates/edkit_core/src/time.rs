//! Frame timing for the editor update loop
//!
//! Fixed frame rate; scripts are ticked once per frame.

use std::time::Duration;

/// Default editor frame rate (60 Hz = 16.666ms per frame)
pub const DEFAULT_FRAME_RATE_HZ: u32 = 60;

/// Frame counter advanced once per host update.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frame_count: u64,
    frame_duration: Duration,
    elapsed: Duration,
}

impl FrameClock {
    pub fn new(rate_hz: u32) -> Self {
        let rate_hz = rate_hz.max(1);
        Self {
            frame_count: 0,
            frame_duration: Duration::from_micros(1_000_000 / u64::from(rate_hz)),
            elapsed: Duration::ZERO,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn advance_frame(&mut self) {
        self.frame_count += 1;
        self.elapsed += self.frame_duration;
    }

    pub fn total_time(&self) -> Duration {
        self.elapsed
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE_HZ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_by_fixed_duration() {
        let mut clock = FrameClock::new(50);
        clock.advance_frame();
        clock.advance_frame();
        assert_eq!(clock.frame_count(), 2);
        assert_eq!(clock.total_time(), Duration::from_millis(40));
    }

    #[test]
    fn zero_rate_is_clamped() {
        let clock = FrameClock::new(0);
        assert_eq!(clock.frame_duration(), Duration::from_secs(1));
    }
}
