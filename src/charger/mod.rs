//! Charger control layer: the capability trait the controller issues
//! pipeline decisions through, plus the Easee implementation.

pub mod easee;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use easee::EaseeCharger;

/// Charger-control errors surfaced by the host-service seam.
#[derive(Debug, Error)]
pub enum ChargerError {
    #[error("communication error: {0}")]
    Communication(String),
    #[error("charger offline or unavailable")]
    Offline,
    #[error("unsupported phase count: {0}")]
    InvalidPhases(u8),
}

/// Desired charger state for one vehicle, used to deduplicate commands so
/// the vendor cloud API is never spammed with identical requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargerCommand {
    pub amps: u32,
    pub phases: u8,
    pub paused: bool,
}

impl ChargerCommand {
    /// True when issuing this command would change anything, i.e. it differs
    /// from the last issued command (or none was ever issued).
    pub fn differs_from(&self, other: Option<&ChargerCommand>) -> bool {
        match other {
            None => true,
            Some(prev) => self != prev,
        }
    }
}

/// Capability set for controlling a single charger.
///
/// Command methods report success as a boolean: a charger stuck under an
/// external cloud schedule is an expected, recoverable condition, never a
/// fatal error.
#[async_trait]
pub trait ChargerControl: Send + Sync {
    /// Set the dynamic charging current limit in amps.
    async fn set_charging_current(&self, amps: u32) -> bool;

    /// Set the number of active phases (1 or 3).
    async fn set_phases(&self, phases: u8) -> bool;

    async fn pause_charging(&self) -> bool;

    async fn resume_charging(&self) -> bool;

    /// Current charger status string, or `None` if unknown.
    async fn current_status(&self) -> Option<String>;

    /// Verify the charger reached the expected status within a bounded
    /// number of retries.
    async fn verify_state(&self, expected_status: Option<&str>, timeout: Duration) -> bool;
}

/// Host-service seam the vendor adapters talk through (service calls and
/// entity state reads performed by the smart-home host).
#[async_trait]
pub trait HostServices: Send + Sync {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        payload: serde_json::Value,
    ) -> Result<(), ChargerError>;

    async fn read_state(&self, entity_id: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_differs_from_nothing() {
        let cmd = ChargerCommand {
            amps: 16,
            phases: 3,
            paused: false,
        };
        assert!(cmd.differs_from(None));
    }

    #[test]
    fn identical_commands_do_not_differ() {
        let cmd = ChargerCommand {
            amps: 16,
            phases: 3,
            paused: false,
        };
        assert!(!cmd.differs_from(Some(&cmd)));
        assert!(cmd.differs_from(Some(&ChargerCommand {
            amps: 10,
            phases: 3,
            paused: false,
        })));
    }
}
