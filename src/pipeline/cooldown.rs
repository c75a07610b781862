use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::clock::Clock;

/// Quiet period after a phase-count switch, protecting the onboard charger
/// relay from rapid switching.
pub const OBC_COOLDOWN: Duration = Duration::from_secs(30);

/// Tracks per-charger cooldown periods after phase switches.
///
/// Entries are never removed; activity is recomputed from elapsed time on
/// every read, so re-checking an expired entry is idempotent. The map grows
/// only with distinct charger identities, bounded by the configured vehicle
/// count.
pub struct ObcCooldownTracker {
    clock: Arc<dyn Clock>,
    window: Duration,
    started: HashMap<String, Duration>,
}

impl ObcCooldownTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            window: OBC_COOLDOWN,
            started: HashMap::new(),
        }
    }

    /// Record "now" against a charger, overwriting any prior entry.
    pub fn start_cooldown(&mut self, charger_id: &str) {
        self.started
            .insert(charger_id.to_owned(), self.clock.monotonic());
    }

    /// True iff a cooldown was started and strictly less than the window has
    /// elapsed since.
    pub fn is_active(&self, charger_id: &str) -> bool {
        match self.started.get(charger_id) {
            None => false,
            Some(&start) => self.clock.monotonic() - start < self.window,
        }
    }

    /// Seconds left in the cooldown, or 0.0 once expired (or never started).
    pub fn remaining_seconds(&self, charger_id: &str) -> f64 {
        match self.started.get(charger_id) {
            None => 0.0,
            Some(&start) => {
                let elapsed = self.clock.monotonic() - start;
                self.window.saturating_sub(elapsed).as_secs_f64()
            }
        }
    }
}
