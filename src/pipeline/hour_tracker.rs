use std::sync::Arc;

use chrono::Timelike;

use super::clock::Clock;

/// Average grid power over the current calendar hour.
///
/// Swedish grid operators bill demand tariffs (effekttaxa) on the average
/// power drawn per calendar hour (xx:00:00 to xx:59:59), not a rolling
/// 60-minute window. The tracker therefore discards every sample when the
/// UTC hour rolls over instead of sliding. A sliding mean would misstate
/// the billable peak.
pub struct CalendarHourTracker {
    clock: Arc<dyn Clock>,
    samples: Vec<f64>,
    current_hour: Option<u32>,
}

impl CalendarHourTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            samples: Vec::new(),
            current_hour: None,
        }
    }

    /// Record a power sample in watts for "now".
    ///
    /// Crossing an hour boundary clears all retained samples first; samples
    /// never span two calendar hours.
    pub fn add_sample(&mut self, watts: f64) {
        let hour = self.clock.now_utc().hour();
        if self.current_hour.is_some_and(|h| h != hour) {
            self.samples.clear();
        }
        self.current_hour = Some(hour);
        self.samples.push(watts);
    }

    /// Arithmetic mean of the retained samples, in kW. 0.0 when empty.
    pub fn average_kw(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().sum();
        (sum / self.samples.len() as f64) / 1000.0
    }

    /// Headroom to the power limit in kW, floored at zero.
    pub fn available_capacity_kw(&self, power_limit_kw: f64) -> f64 {
        (power_limit_kw - self.average_kw()).max(0.0)
    }

    /// UTC hour (0-23) of the most recent sample, if any.
    pub fn current_hour(&self) -> Option<u32> {
        self.current_hour
    }

    /// Number of samples retained for the current hour.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
