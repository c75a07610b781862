use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Where a vehicle's state-of-charge reading comes from.
///
/// Classification is purely lexical on the configured source identifier:
/// `sensor.*` identifiers are API-backed, `input_number.*` identifiers are
/// manual user entry, anything else (or no source at all) is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SocSource {
    Api,
    Manual,
    None,
}

pub fn classify_soc_source(entity_id: Option<&str>) -> SocSource {
    match entity_id {
        Some(id) if id.starts_with("sensor.") => SocSource::Api,
        Some(id) if id.starts_with("input_number.") => SocSource::Manual,
        _ => SocSource::None,
    }
}

/// Immutable per-vehicle configuration, from the persisted config entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub vehicle_id: String,
    pub name: String,
    /// Lower number = served first by the allocator.
    pub priority: u32,
    pub charger_entity_id: String,
    pub soc_entity_id: Option<String>,
    pub target_soc: u8,
    pub departure_entity_id: Option<String>,
}

/// Mutable vehicle state for one decision cycle.
///
/// Rebuilt from scratch every cycle and discarded afterward; the pipeline
/// fills in `allocated_amps`/`allocated_phases`, which both start at "no
/// allocation" (0 A, 1 phase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: String,
    pub name: String,
    pub priority: u32,
    pub target_soc: u8,
    pub current_soc: Option<u8>,
    pub departure_time: Option<DateTime<Utc>>,
    pub is_connected: bool,
    pub soc_source: SocSource,
    pub soc_entity_id: Option<String>,
    pub charger_entity_id: String,
    pub allocated_amps: u32,
    pub allocated_phases: u8,
}

impl VehicleState {
    /// Build a fresh cycle state from config plus live readings.
    ///
    /// Malformed readings are the caller's problem: anything unreadable must
    /// already be normalized to `None` / disconnected.
    pub fn from_config(
        config: &VehicleConfig,
        current_soc: Option<u8>,
        is_connected: bool,
        departure_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            vehicle_id: config.vehicle_id.clone(),
            name: config.name.clone(),
            priority: config.priority,
            target_soc: config.target_soc,
            current_soc,
            departure_time,
            is_connected,
            soc_source: classify_soc_source(config.soc_entity_id.as_deref()),
            soc_entity_id: config.soc_entity_id.clone(),
            charger_entity_id: config.charger_entity_id.clone(),
            allocated_amps: 0,
            allocated_phases: 1,
        }
    }

    /// A vehicle needs charging iff it is connected and its SoC is unknown
    /// or below target. Never true for a disconnected vehicle.
    pub fn needs_charge(&self) -> bool {
        if !self.is_connected {
            return false;
        }
        match self.current_soc {
            None => true,
            Some(soc) => soc < self.target_soc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(soc_entity: Option<&str>) -> VehicleConfig {
        VehicleConfig {
            vehicle_id: "ev1".into(),
            name: "Model Y".into(),
            priority: 1,
            charger_entity_id: "sensor.easee_garage_status".into(),
            soc_entity_id: soc_entity.map(Into::into),
            target_soc: 80,
            departure_entity_id: None,
        }
    }

    #[test]
    fn classifies_soc_sources_lexically() {
        assert_eq!(classify_soc_source(Some("sensor.ev_soc")), SocSource::Api);
        assert_eq!(
            classify_soc_source(Some("input_number.ev_soc")),
            SocSource::Manual
        );
        assert_eq!(classify_soc_source(Some("switch.ev_soc")), SocSource::None);
        assert_eq!(classify_soc_source(None), SocSource::None);
    }

    #[test]
    fn fresh_state_has_no_allocation() {
        let state = VehicleState::from_config(&config(Some("sensor.ev_soc")), Some(50), true, None);
        assert_eq!(state.allocated_amps, 0);
        assert_eq!(state.allocated_phases, 1);
        assert_eq!(state.soc_source, SocSource::Api);
    }

    #[test]
    fn needs_charge_requires_connection() {
        let mut state = VehicleState::from_config(&config(None), Some(50), true, None);
        assert!(state.needs_charge());

        state.is_connected = false;
        assert!(!state.needs_charge());
    }

    #[test]
    fn unknown_soc_counts_as_needing_charge() {
        let state = VehicleState::from_config(&config(None), None, true, None);
        assert!(state.needs_charge());
    }

    #[test]
    fn soc_at_target_does_not_need_charge() {
        let state = VehicleState::from_config(&config(None), Some(80), true, None);
        assert!(!state.needs_charge());
    }
}
