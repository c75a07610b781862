use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Time source injected into the stateful trackers.
///
/// The cooldown tracker needs a monotonic reading (immune to wall-clock
/// adjustments), the calendar-hour tracker needs the UTC wall clock. Keeping
/// both behind one trait lets tests simulate hour-boundary crossings and
/// cooldown expiry without sleeping.
pub trait Clock: Send + Sync {
    /// Current UTC wall-clock time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Monotonic time elapsed since some fixed origin.
    fn monotonic(&self) -> Duration;
}

/// Production clock backed by `chrono::Utc` and `std::time::Instant`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// `advance` moves both the wall clock and the monotonic reading, matching
/// how real time passes.
pub struct ManualClock {
    inner: Mutex<ManualClockState>,
}

struct ManualClockState {
    utc: DateTime<Utc>,
    monotonic: Duration,
}

impl ManualClock {
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ManualClockState {
                utc,
                monotonic: Duration::ZERO,
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock();
        state.utc += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        state.monotonic += by;
    }

    pub fn set_utc(&self, utc: DateTime<Utc>) {
        self.inner.lock().utc = utc;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.lock().utc
    }

    fn monotonic(&self) -> Duration {
        self.inner.lock().monotonic
    }
}
