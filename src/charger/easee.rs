//! Easee charger adapter.
//!
//! The adapter keeps "master control" over the charger: external cloud
//! schedules (e.g. Tibber smart charging) can put the charger into a state
//! that ignores local commands, so every command is preceded by a wake if
//! needed, and issued state is verified with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ChargerControl, HostServices};

/// States in which an external cloud service has taken control and the
/// charger ignores local commands until resumed.
const WAKEUP_STATES: [&str; 2] = ["awaiting_smart_charging", "standby"];

const VERIFY_MAX_RETRIES: u32 = 3;
const VERIFY_RETRY_DELAY: Duration = Duration::from_secs(2);
const WAKEUP_SETTLE: Duration = Duration::from_secs(1);

fn needs_wakeup(status: &str) -> bool {
    WAKEUP_STATES.contains(&status.to_lowercase().as_str())
}

fn is_blocking(status: &str) -> bool {
    // Same states block local control until the charger is woken.
    needs_wakeup(status)
}

/// Controls an Easee charger through the host's service layer.
pub struct EaseeCharger {
    host: Arc<dyn HostServices>,
    charger_id: String,
    circuit_id: String,
    status_entity: String,
    verify_retry_delay: Duration,
    wakeup_settle: Duration,
}

impl EaseeCharger {
    pub fn new(host: Arc<dyn HostServices>, charger_id: &str, circuit_id: &str) -> Self {
        Self {
            host,
            charger_id: charger_id.to_owned(),
            circuit_id: circuit_id.to_owned(),
            status_entity: format!("sensor.easee_{charger_id}_status"),
            verify_retry_delay: VERIFY_RETRY_DELAY,
            wakeup_settle: WAKEUP_SETTLE,
        }
    }

    /// Builds the adapter from the configured status entity, so the entity
    /// it polls is exactly the one the controller keys commands on. The
    /// Easee charger id is extracted from `sensor.easee_{id}_status`; an
    /// entity outside that pattern keeps its object id as the charger and
    /// circuit id.
    pub fn from_status_entity(host: Arc<dyn HostServices>, entity_id: &str) -> Self {
        let id = entity_id
            .strip_prefix("sensor.easee_")
            .and_then(|rest| rest.strip_suffix("_status"))
            .unwrap_or_else(|| {
                entity_id
                    .split_once('.')
                    .map_or(entity_id, |(_, object_id)| object_id)
            });
        let mut charger = Self::new(host, id, id);
        charger.status_entity = entity_id.to_owned();
        charger
    }

    /// Shrinks the internal waits so adapter tests run without real delays.
    #[doc(hidden)]
    pub fn with_delays(mut self, verify_retry_delay: Duration, wakeup_settle: Duration) -> Self {
        self.verify_retry_delay = verify_retry_delay;
        self.wakeup_settle = wakeup_settle;
        self
    }

    /// Wake the charger from a cloud-controlled state before a command.
    async fn ensure_ready(&self) {
        let Some(status) = self.host.read_state(&self.status_entity).await else {
            return;
        };
        if needs_wakeup(&status) {
            info!(
                charger = %self.charger_id,
                %status,
                "charger cloud-controlled, sending resume to take control"
            );
            if let Err(err) = self
                .host
                .call_service(
                    "easee",
                    "action_command",
                    json!({ "charger_id": self.charger_id, "action_command": "resume" }),
                )
                .await
            {
                warn!(charger = %self.charger_id, %err, "wakeup resume failed");
                return;
            }
            tokio::time::sleep(self.wakeup_settle).await;
        }
    }

    async fn action_command(&self, action: &str) -> bool {
        match self
            .host
            .call_service(
                "easee",
                "action_command",
                json!({ "charger_id": self.charger_id, "action_command": action }),
            )
            .await
        {
            Ok(()) => {
                info!(charger = %self.charger_id, action, "issued action command");
                true
            }
            Err(err) => {
                warn!(charger = %self.charger_id, action, %err, "action command failed");
                false
            }
        }
    }
}

#[async_trait]
impl ChargerControl for EaseeCharger {
    async fn set_charging_current(&self, amps: u32) -> bool {
        self.ensure_ready().await;
        match self
            .host
            .call_service(
                "easee",
                "set_circuit_dynamic_limit",
                json!({
                    "circuit_id": self.circuit_id,
                    "currentP1": amps,
                    "currentP2": amps,
                    "currentP3": amps,
                }),
            )
            .await
        {
            Ok(()) => {
                info!(circuit = %self.circuit_id, amps, "set dynamic circuit limit");
                true
            }
            Err(err) => {
                warn!(circuit = %self.circuit_id, %err, "failed to set charging current");
                false
            }
        }
    }

    async fn set_phases(&self, phases: u8) -> bool {
        if phases != 1 && phases != 3 {
            warn!(charger = %self.charger_id, phases, "unsupported phase count");
            return false;
        }
        self.ensure_ready().await;
        // Phase selection goes through the static circuit limit: a phase is
        // enabled by giving it a non-zero ceiling.
        match self
            .host
            .call_service(
                "easee",
                "set_charger_circuit_static_limit",
                json!({
                    "charger_id": self.charger_id,
                    "currentP1": 32,
                    "currentP2": if phases >= 2 { 32 } else { 0 },
                    "currentP3": if phases >= 3 { 32 } else { 0 },
                }),
            )
            .await
        {
            Ok(()) => {
                info!(charger = %self.charger_id, phases, "set phase count");
                true
            }
            Err(err) => {
                warn!(charger = %self.charger_id, %err, "failed to set phases");
                false
            }
        }
    }

    async fn pause_charging(&self) -> bool {
        self.action_command("pause").await
    }

    async fn resume_charging(&self) -> bool {
        self.action_command("resume").await
    }

    async fn current_status(&self) -> Option<String> {
        self.host.read_state(&self.status_entity).await
    }

    async fn verify_state(&self, expected_status: Option<&str>, timeout: Duration) -> bool {
        for attempt in 0..VERIFY_MAX_RETRIES {
            let delay = if attempt == 0 {
                timeout
            } else {
                self.verify_retry_delay
            };
            tokio::time::sleep(delay).await;

            let Some(status) = self.host.read_state(&self.status_entity).await else {
                warn!(charger = %self.charger_id, "could not read charger state");
                return false;
            };

            if is_blocking(&status) {
                debug!(
                    charger = %self.charger_id,
                    %status,
                    attempt = attempt + 1,
                    max = VERIFY_MAX_RETRIES,
                    "charger still cloud-blocked"
                );
                continue;
            }

            match expected_status {
                None => return true,
                Some(expected) if status == expected => return true,
                Some(_) => continue,
            }
        }

        warn!(
            charger = %self.charger_id,
            attempts = VERIFY_MAX_RETRIES,
            "charger did not reach expected state; an external service may \
             be overriding charger settings"
        );
        false
    }
}
