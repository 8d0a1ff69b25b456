//! Microsecond clock used to stamp events and judge snapshot intervals.
//!
//! Everything that reads "now" goes through a [`Clock`] handle so tests can
//! place events at exact instants.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of the current time in microseconds since the Unix epoch
pub trait Clock: Send + Sync {
    /// Current time in microseconds
    fn now_micros(&self) -> i64;
}

/// Shared clock handle
pub type ClockRef = Arc<dyn Clock>;

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

/// Manually driven clock
///
/// Starts at a fixed instant and only moves when told to.
///
/// ```rust
/// use chronolog::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(100);
/// clock.advance(50);
/// assert_eq!(clock.now_micros(), 150);
/// ```
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start` microseconds
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, micros: i64) {
        self.now.store(micros, Ordering::SeqCst);
    }

    /// Move forward by `micros`
    pub fn advance(&self, micros: i64) {
        self.now.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now_micros())
            .finish()
    }
}

/// Default clock handle
pub fn system_clock() -> ClockRef {
    Arc::new(SystemClock)
}
