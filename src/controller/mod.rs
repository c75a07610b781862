//! Cycle controller: owns the cross-cycle trackers and user overrides,
//! runs the decision pipeline on a fixed tick, and issues deduplicated
//! charger commands from its output.

pub mod readings;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::charger::{ChargerCommand, ChargerControl};
use crate::config::Config;
use crate::domain::VehicleState;
use crate::pipeline::clock::Clock;
use crate::pipeline::cooldown::ObcCooldownTracker;
use crate::pipeline::hour_tracker::CalendarHourTracker;
use crate::pipeline::{run_decision_pipeline, CycleSnapshot, PipelineContext};

pub use readings::{SensorReader, SimulatedReadings, SiteReadings, VehicleReadings};

/// Shared handle the API and the cycle task both hold.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RwLock<Controller>>,
}

impl AppState {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller: Arc::new(RwLock::new(controller)),
        }
    }
}

pub struct Controller {
    config: Config,
    reader: Arc<dyn SensorReader>,
    /// Keyed by charger entity id.
    chargers: HashMap<String, Arc<dyn ChargerControl>>,
    cooldowns: ObcCooldownTracker,
    hour_tracker: CalendarHourTracker,
    force_charge: HashSet<String>,
    pause_all: bool,
    last_commands: HashMap<String, ChargerCommand>,
    snapshot: CycleSnapshot,
}

impl Controller {
    pub fn new(
        config: Config,
        reader: Arc<dyn SensorReader>,
        chargers: HashMap<String, Arc<dyn ChargerControl>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let snapshot = CycleSnapshot::initial(config.site.power_limit_kw);
        Self {
            config,
            reader,
            chargers,
            cooldowns: ObcCooldownTracker::new(clock.clone()),
            hour_tracker: CalendarHourTracker::new(clock),
            force_charge: HashSet::new(),
            pause_all: false,
            last_commands: HashMap::new(),
            snapshot,
        }
    }

    /// Latest result snapshot; the baseline the view layer exposes until
    /// the next cycle supersedes it.
    pub fn snapshot(&self) -> &CycleSnapshot {
        &self.snapshot
    }

    pub fn pause_all(&self) -> bool {
        self.pause_all
    }

    /// Suppress all charger command issuance. The pipeline keeps computing
    /// as if unpaused so the would-be allocation stays observable.
    pub fn set_pause_all(&mut self, paused: bool) {
        self.pause_all = paused;
    }

    pub fn force_charge_vehicles(&self) -> &HashSet<String> {
        &self.force_charge
    }

    /// Toggle the force-charge override for a configured vehicle. Returns
    /// false for an unknown vehicle id.
    pub fn set_force_charge(&mut self, vehicle_id: &str, enabled: bool) -> bool {
        let known = self
            .config
            .vehicles
            .iter()
            .any(|v| v.to_vehicle_config().vehicle_id == vehicle_id);
        if !known {
            return false;
        }
        if enabled {
            self.force_charge.insert(vehicle_id.to_owned());
        } else {
            self.force_charge.remove(vehicle_id);
        }
        true
    }

    /// Read sensors, run the four-stage pipeline, store the snapshot, and
    /// issue charger commands for any allocation that changed.
    pub async fn run_cycle(&mut self) {
        let site = self.reader.site().await;

        let mut vehicles = Vec::with_capacity(self.config.vehicles.len());
        for entry in &self.config.vehicles {
            let vehicle_config = entry.to_vehicle_config();
            let readings = self.reader.vehicle(&vehicle_config).await;
            vehicles.push(VehicleState::from_config(
                &vehicle_config,
                readings.current_soc,
                readings.is_connected,
                readings.departure_time,
            ));
        }

        if !site.grid_meter_available {
            warn!("grid meter unavailable, cycle will run in safe mode");
        }

        let ctx = PipelineContext {
            grid_power_w: site.grid_power_w,
            solar_power_w: site.solar_power_w,
            battery_power_w: site.battery_power_w,
            battery_soc: site.battery_soc,
            grid_rewards_active: site.grid_rewards_active,
            grid_meter_available: site.grid_meter_available,
            current_export_price: site.current_export_price,
            current_import_price: site.current_import_price,
            night_prices: site.night_prices,
            grid_fee_import: self.config.economics.grid_fee_import,
            grid_fee_export: self.config.economics.grid_fee_export,
            export_compensation: self.config.economics.export_compensation,
            vat_rate: self.config.economics.vat_rate,
            power_limit_kw: self.config.site.power_limit_kw,
            fuse_size: self.config.site.fuse_size,
            vehicles,
            force_charge_vehicles: self.force_charge.clone(),
            last_commands: self.last_commands.clone(),
        };

        self.snapshot = run_decision_pipeline(ctx, &self.cooldowns, &mut self.hour_tracker);
        info!(
            reason = %self.snapshot.decision_reason,
            available_kw = self.snapshot.available_capacity_kw,
            "cycle complete"
        );

        if self.pause_all {
            debug!("pause-all set, suppressing charger commands");
            return;
        }

        let vehicles = self.snapshot.vehicles.clone();
        for vehicle in &vehicles {
            self.issue_command(vehicle).await;
        }
    }

    async fn issue_command(&mut self, vehicle: &VehicleState) {
        let entity = vehicle.charger_entity_id.clone();
        let Some(charger) = self.chargers.get(&entity).cloned() else {
            return;
        };

        let desired = ChargerCommand {
            amps: vehicle.allocated_amps,
            phases: vehicle.allocated_phases,
            paused: vehicle.allocated_amps == 0,
        };
        let previous = self.last_commands.get(&entity).copied();
        if !desired.differs_from(previous.as_ref()) {
            return;
        }

        let mut ok = true;

        let phases_changed = previous.map_or(true, |prev| prev.phases != desired.phases);
        if phases_changed && !desired.paused {
            if charger.set_phases(desired.phases).await {
                // The OBC relay needs its quiet period after a phase switch.
                self.cooldowns.start_cooldown(&entity);
            } else {
                ok = false;
            }
        }

        if desired.paused {
            ok &= charger.pause_charging().await;
        } else {
            ok &= charger.set_charging_current(desired.amps).await;
            if previous.map_or(true, |prev| prev.paused) {
                ok &= charger.resume_charging().await;
            }
        }

        if ok {
            self.last_commands.insert(entity, desired);
        } else {
            // Not recorded, so the next cycle retries the same command.
            warn!(charger = %vehicle.charger_entity_id, "charger command not fully applied");
        }
    }
}

/// Run decision cycles forever at the configured tick. A single task with
/// sequential awaits, so cycles never overlap.
pub fn spawn_controller_task(state: AppState, tick: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            state.controller.write().await.run_cycle().await;
        }
    })
}
