//! # Send Throttle
//!
//! Some peripherals drop writes that arrive faster than their firmware can
//! drain them. Each codec advertises a minimum spacing between consecutive
//! writes to its send characteristic and the dispatcher waits it out before
//! every write.
//!
//! ```text
//!   write        write               write
//!     │◄─interval─►│◄────interval────►│
//! ────┴────────────┴──────────────────┴────► t
//! ```
//!
//! The throttle never sleeps itself; callers pass the current instant so the
//! same logic runs under a real or a paused clock.

use std::time::{Duration, Instant};

use crate::error::{ProtocolError, Result};

/// Default suggested spacing between writes, in milliseconds
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 500;

/// Validate a caller-supplied interval in milliseconds
///
/// Negative values are rejected; zero disables throttling.
pub fn validate_interval_ms(ms: i64) -> Result<Duration> {
    u64::try_from(ms).map(Duration::from_millis).map_err(|_| {
        ProtocolError::Configuration(format!("send interval must be >= 0, got {ms}"))
    })
}

/// Tracks the last write and reports how long the next one must wait
#[derive(Debug, Clone)]
pub struct SendThrottle {
    interval: Duration,
    last_send: Option<Instant>,
}

impl SendThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_send: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the spacing; the last-send mark is kept
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Whether any spacing is enforced at all
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Time left before a write is allowed at `now`
    pub fn wait_time(&self, now: Instant) -> Duration {
        match self.last_send {
            Some(last) if self.is_enabled() => {
                (last + self.interval).saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        }
    }

    /// Mark a write as issued at `now`
    pub fn record_send(&mut self, now: Instant) {
        self.last_send = Some(now);
    }

    /// Forget the last write, e.g. after a reconnect
    pub fn reset(&mut self) {
        self.last_send = None;
    }
}

impl Default for SendThrottle {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SEND_INTERVAL_MS))
    }
}
