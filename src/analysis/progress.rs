//! Progress heuristic for the ingest phase.
//!
//! The final length of the model's JSON is unknown while streaming, so
//! progress is estimated from how much text has arrived. Ingest starts at
//! 35% and the estimate stops at 95%; only stream completion reaches 100.

use std::time::Duration;

use tokio::time::Instant;

/// Progress reported when the first byte of the stream is expected.
pub const INGEST_START_PERCENT: u8 = 35;

/// Upper bound of the estimate before the stream ends.
pub const INGEST_CEILING_PERCENT: u8 = 95;

/// Characters of output treated as a "typical" full answer.
const TYPICAL_RESPONSE_CHARS: u64 = 3000;

/// Minimum spacing between two ingest status emissions.
pub const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// `min(35 + len/3000 * 60, 95)`, floored.
pub fn estimate_percent(accumulated_chars: usize) -> u8 {
    // Integer arithmetic keeps the floor exact.
    let span = u64::from(INGEST_CEILING_PERCENT - INGEST_START_PERCENT);
    let gained = (accumulated_chars as u64).saturating_mul(span) / TYPICAL_RESPONSE_CHARS;
    let estimate = u64::from(INGEST_START_PERCENT).saturating_add(gained);
    estimate.min(u64::from(INGEST_CEILING_PERCENT)) as u8
}

/// True iff strictly more than `interval` has passed since `last_emit`.
pub fn should_emit(now: Instant, last_emit: Instant, interval: Duration) -> bool {
    now.saturating_duration_since(last_emit) > interval
}

/// Stateful wrapper that throttles emissions for one session.
#[derive(Debug)]
pub struct ProgressEstimator {
    interval: Duration,
    last_emit: Instant,
}

impl ProgressEstimator {
    /// Start the throttle clock now.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: Instant::now(),
        }
    }

    /// Estimated percent for the given accumulated length.
    pub fn on_delta(&self, accumulated_chars: usize) -> u8 {
        estimate_percent(accumulated_chars)
    }

    /// Returns true (and restarts the clock) if an emission is due at `now`.
    pub fn try_emit(&mut self, now: Instant) -> bool {
        if should_emit(now, self.last_emit, self.interval) {
            self.last_emit = now;
            true
        } else {
            false
        }
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_EMIT_INTERVAL)
    }
}
