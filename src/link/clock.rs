//! Clocked exchange state
//!
//! Timestamps are wall time plus an adjustable offset, in 2^21 ticks per
//! second, masked to 31 bits.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Timestamp resolution
pub const TICKS_PER_SECOND: f64 = (1u32 << 21) as f64;

/// Timestamps are positive 31-bit values
pub const TIMESTAMP_MASK: u32 = 0x7FFF_FFFF;

/// Logical clock for one link
#[derive(Debug, Clone)]
pub struct LinkClock {
    /// Wall time (seconds) at `started`
    origin_secs: f64,
    started: Instant,
    /// Accumulated virtual time adjustment in seconds
    time_offset: f64,
}

impl LinkClock {
    /// Create a clock following wall time
    pub fn new() -> Self {
        let origin_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self::with_origin(origin_secs)
    }

    /// Create a clock that reads `origin_secs` now and advances with real time
    pub fn with_origin(origin_secs: f64) -> Self {
        Self {
            origin_secs,
            started: Instant::now(),
            time_offset: 0.0,
        }
    }

    pub fn time_offset(&self) -> f64 {
        self.time_offset
    }

    /// Shift the clock by `seconds` of simulated time
    pub fn advance(&mut self, seconds: f64) {
        self.time_offset += seconds;
    }

    /// Current logical timestamp
    pub fn timestamp(&self) -> u32 {
        let secs = self.origin_secs + self.started.elapsed().as_secs_f64() + self.time_offset;
        let ticks = (secs * TICKS_PER_SECOND) as i64;
        (ticks as u32) & TIMESTAMP_MASK
    }
}

impl Default for LinkClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_masked() {
        let clock = LinkClock::new();
        assert_eq!(clock.timestamp() & !TIMESTAMP_MASK, 0);
    }

    #[test]
    fn test_timestamp_non_decreasing() {
        let clock = LinkClock::with_origin(10.0);
        let mut last = clock.timestamp();
        for _ in 0..1000 {
            let now = clock.timestamp();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_advance_moves_timestamp() {
        let mut clock = LinkClock::with_origin(1.0);
        let before = clock.timestamp();
        clock.advance(5.0);
        let after = clock.timestamp();
        assert_eq!(clock.time_offset(), 5.0);
        // At least five seconds worth of ticks, plus whatever elapsed
        assert!(after - before >= 5 * (1 << 21));
    }

    #[test]
    fn test_advance_zero_is_noop() {
        let mut clock = LinkClock::with_origin(2.0);
        clock.advance(0.0);
        assert_eq!(clock.time_offset(), 0.0);
    }
}
