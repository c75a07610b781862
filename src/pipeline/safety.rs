use serde::{Deserialize, Serialize};

use super::DecisionReason;

/// Current ceiling applied when the grid meter cannot be read. Low enough to
/// be safe under worst-case site load regardless of the configured limit.
pub const SAFE_MODE_MAX_AMPS: u32 = 6;

/// Outcome of the per-cycle safety evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyResult {
    pub allow_charging: bool,
    pub reason: DecisionReason,
    pub safe_mode: bool,
    pub max_amps: Option<u32>,
}

impl SafetyResult {
    fn blocked(reason: DecisionReason) -> Self {
        Self {
            allow_charging: false,
            reason,
            safe_mode: false,
            max_amps: None,
        }
    }
}

/// Stateless safety rule chain; first matching rule wins.
pub struct SafetyCheck;

impl SafetyCheck {
    /// Evaluate the safety rules, in strict priority order:
    ///
    /// 1. Grid Rewards active while the battery is net-exporting blocks
    ///    charging outright; importing for the EV would undercut the
    ///    committed export.
    /// 2. An active OBC cooldown blocks charging; the onboard charger relay
    ///    must settle before any new command.
    /// 3. An unavailable grid meter allows charging only in safe mode,
    ///    capped at [`SAFE_MODE_MAX_AMPS`], since total site draw cannot be
    ///    bounded without live telemetry.
    /// 4. Otherwise charging is fully permitted.
    pub fn evaluate(
        grid_rewards_active: bool,
        battery_power_w: f64,
        grid_meter_available: bool,
        obc_cooldown_active: bool,
    ) -> SafetyResult {
        if grid_rewards_active && battery_power_w < 0.0 {
            return SafetyResult::blocked(DecisionReason::GridRewardsActiveBatteryExporting);
        }

        if obc_cooldown_active {
            return SafetyResult::blocked(DecisionReason::ObcCooldownActive);
        }

        if !grid_meter_available {
            return SafetyResult {
                allow_charging: true,
                reason: DecisionReason::GridMeterUnavailableSafeMode,
                safe_mode: true,
                max_amps: Some(SAFE_MODE_MAX_AMPS),
            };
        }

        SafetyResult {
            allow_charging: true,
            reason: DecisionReason::AllClear,
            safe_mode: false,
            max_amps: None,
        }
    }
}
