//! The per-cycle decision pipeline: safety, capacity constraints, user
//! intent, then economic optimization.
//!
//! The pipeline is synchronous and never blocks; all sensor I/O happens
//! before it runs and all charger I/O after. Its only cross-cycle state is
//! the two trackers the controller owns and passes in.

pub mod allocator;
pub mod clock;
pub mod cooldown;
pub mod hour_tracker;
pub mod opportunity;
pub mod safety;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::charger::ChargerCommand;
use crate::domain::VehicleState;

use allocator::{allocate_power_to_vehicles, VOLTAGE_V};
use cooldown::ObcCooldownTracker;
use hour_tracker::CalendarHourTracker;
use opportunity::{evaluate_opportunity_cost, find_cheapest_night_price, OpportunityCostInputs};
use safety::{SafetyCheck, SAFE_MODE_MAX_AMPS};

/// Fixed vocabulary of decision reason codes.
///
/// These render to stable snake_case strings ("all_clear",
/// "export_more_profitable", ...) that the view layer and tests match on;
/// the composite decision reason is these parts joined with `" | "`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    GridRewardsActiveBatteryExporting,
    ObcCooldownActive,
    GridMeterUnavailableSafeMode,
    AllClear,
    NoNightPricesAvailable,
    ExportMoreProfitable,
    ChargingNowCheaper,
    ForceCharge,
}

/// Everything one cycle needs, materialized by the controller before the
/// pipeline runs. Unreadable sensors must already be normalized to safe
/// defaults; the pipeline never sees a failed read.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub grid_power_w: f64,
    pub solar_power_w: f64,
    pub battery_power_w: f64,
    pub battery_soc: u8,
    pub grid_rewards_active: bool,
    pub grid_meter_available: bool,
    pub current_export_price: f64,
    pub current_import_price: f64,
    /// Pre-filtered by the host to the qualifying night window.
    pub night_prices: Vec<(DateTime<Utc>, f64)>,
    pub grid_fee_import: f64,
    pub grid_fee_export: f64,
    pub export_compensation: f64,
    pub vat_rate: f64,
    pub power_limit_kw: f64,
    pub fuse_size: u32,
    pub vehicles: Vec<VehicleState>,
    pub force_charge_vehicles: HashSet<String>,
    /// Opaque passthrough for the command adapter's dedup cache.
    pub last_commands: HashMap<String, ChargerCommand>,
}

/// Result of one pipeline cycle. Immutable once returned; superseded
/// entirely by the next cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSnapshot {
    pub grid_power_w: f64,
    pub solar_power_w: f64,
    pub battery_power_w: f64,
    pub battery_soc: u8,
    pub grid_rewards_active: bool,
    pub grid_meter_available: bool,
    pub current_export_price: f64,
    pub current_import_price: f64,
    pub cheapest_night_price: Option<f64>,
    pub night_prices: Vec<(DateTime<Utc>, f64)>,
    pub grid_fee_import: f64,
    pub grid_fee_export: f64,
    pub export_compensation: f64,
    pub vat_rate: f64,
    pub calendar_hour_avg_kw: f64,
    pub available_capacity_kw: f64,
    pub power_limit_kw: f64,
    pub vehicles: Vec<VehicleState>,
    pub decision_reason: String,
    pub last_commands: HashMap<String, ChargerCommand>,
    pub opportunity_export_revenue: f64,
    pub opportunity_night_cost: f64,
}

impl CycleSnapshot {
    /// Placeholder snapshot before the first cycle has run.
    pub fn initial(power_limit_kw: f64) -> Self {
        Self {
            grid_power_w: 0.0,
            solar_power_w: 0.0,
            battery_power_w: 0.0,
            battery_soc: 0,
            grid_rewards_active: false,
            grid_meter_available: true,
            current_export_price: 0.0,
            current_import_price: 0.0,
            cheapest_night_price: None,
            night_prices: Vec::new(),
            grid_fee_import: 0.0,
            grid_fee_export: 0.0,
            export_compensation: 0.0,
            vat_rate: 0.25,
            calendar_hour_avg_kw: 0.0,
            available_capacity_kw: 0.0,
            power_limit_kw,
            vehicles: Vec::new(),
            decision_reason: "initialized".to_owned(),
            last_commands: HashMap::new(),
            opportunity_export_revenue: 0.0,
            opportunity_night_cost: 0.0,
        }
    }
}

/// Execute the four-stage decision pipeline for one cycle.
///
/// Stage 1 (safety) can terminate the cycle outright; stages 2-4 run in
/// strict sequence otherwise. The two trackers are the only state mutated
/// across cycles.
pub fn run_decision_pipeline(
    mut ctx: PipelineContext,
    cooldowns: &ObcCooldownTracker,
    hour_tracker: &mut CalendarHourTracker,
) -> CycleSnapshot {
    let cheapest_night = find_cheapest_night_price(&ctx.night_prices);

    // Stage 1: safety.
    let any_obc_active = ctx
        .vehicles
        .iter()
        .any(|v| cooldowns.is_active(&v.charger_entity_id));
    let safety = SafetyCheck::evaluate(
        ctx.grid_rewards_active,
        ctx.battery_power_w,
        ctx.grid_meter_available,
        any_obc_active,
    );
    debug!(reason = %safety.reason, "pipeline stage 1 (safety)");

    if !safety.allow_charging {
        for v in &mut ctx.vehicles {
            v.allocated_amps = 0;
            v.allocated_phases = 1;
        }
        let reason = safety.reason.to_string();
        return build_snapshot(ctx, hour_tracker, cheapest_night, reason, 0.0, 0.0);
    }

    // Stage 2: constraints. Safe mode bounds capacity by the fallback
    // current instead of the calendar-hour headroom.
    hour_tracker.add_sample(ctx.grid_power_w);
    let mut available_kw = if safety.safe_mode {
        f64::from(safety.max_amps.unwrap_or(SAFE_MODE_MAX_AMPS)) * VOLTAGE_V / 1000.0
    } else {
        hour_tracker.available_capacity_kw(ctx.power_limit_kw)
    };
    debug!(
        avg_kw = hour_tracker.average_kw(),
        available_kw, "pipeline stage 2 (constraints)"
    );

    // Stage 3: user intent. Forced vehicles are allocated first, against
    // the full capacity.
    let forced: Vec<VehicleState> = ctx
        .vehicles
        .iter()
        .filter(|v| ctx.force_charge_vehicles.contains(&v.vehicle_id))
        .cloned()
        .collect();
    let normal: Vec<VehicleState> = ctx
        .vehicles
        .iter()
        .filter(|v| !ctx.force_charge_vehicles.contains(&v.vehicle_id))
        .cloned()
        .collect();
    let mut reason_parts: Vec<DecisionReason> = Vec::new();

    if !forced.is_empty() {
        let allocations = allocate_power_to_vehicles(&forced, available_kw, ctx.fuse_size);
        for alloc in &allocations {
            write_back(&mut ctx.vehicles, alloc.vehicle_id.as_str(), alloc.amps, alloc.phases);
            available_kw -= f64::from(alloc.amps) * VOLTAGE_V / 1000.0;
        }
        reason_parts.push(DecisionReason::ForceCharge);
    }

    // Stage 4: optimization. Evaluated unconditionally so the cost figures
    // are reported even when force-charge consumed all capacity.
    let opp = evaluate_opportunity_cost(OpportunityCostInputs {
        current_export_price: ctx.current_export_price,
        cheapest_night_import_price: cheapest_night,
        grid_fee_import: ctx.grid_fee_import,
        grid_fee_export: ctx.grid_fee_export,
        export_compensation: ctx.export_compensation,
        vat_rate: ctx.vat_rate,
    });
    debug!(reason = %opp.reason, "pipeline stage 4 (optimization)");

    if opp.should_charge_now && !normal.is_empty() {
        let remaining_kw = available_kw.max(0.0);
        let allocations = allocate_power_to_vehicles(&normal, remaining_kw, ctx.fuse_size);
        for alloc in &allocations {
            write_back(&mut ctx.vehicles, alloc.vehicle_id.as_str(), alloc.amps, alloc.phases);
        }
        reason_parts.push(opp.reason);
    } else if !normal.is_empty() {
        for v in &mut ctx.vehicles {
            if !ctx.force_charge_vehicles.contains(&v.vehicle_id) {
                v.allocated_amps = 0;
                v.allocated_phases = 1;
            }
        }
        reason_parts.push(opp.reason);
    }

    let reason = if reason_parts.is_empty() {
        opp.reason.to_string()
    } else {
        reason_parts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    };

    build_snapshot(
        ctx,
        hour_tracker,
        cheapest_night,
        reason,
        opp.export_revenue,
        opp.night_charge_cost,
    )
}

fn write_back(vehicles: &mut [VehicleState], vehicle_id: &str, amps: u32, phases: u8) {
    for v in vehicles.iter_mut() {
        if v.vehicle_id == vehicle_id {
            v.allocated_amps = amps;
            v.allocated_phases = phases;
        }
    }
}

fn build_snapshot(
    ctx: PipelineContext,
    hour_tracker: &CalendarHourTracker,
    cheapest_night_price: Option<f64>,
    decision_reason: String,
    opportunity_export_revenue: f64,
    opportunity_night_cost: f64,
) -> CycleSnapshot {
    CycleSnapshot {
        grid_power_w: ctx.grid_power_w,
        solar_power_w: ctx.solar_power_w,
        battery_power_w: ctx.battery_power_w,
        battery_soc: ctx.battery_soc,
        grid_rewards_active: ctx.grid_rewards_active,
        grid_meter_available: ctx.grid_meter_available,
        current_export_price: ctx.current_export_price,
        current_import_price: ctx.current_import_price,
        cheapest_night_price,
        night_prices: ctx.night_prices,
        grid_fee_import: ctx.grid_fee_import,
        grid_fee_export: ctx.grid_fee_export,
        export_compensation: ctx.export_compensation,
        vat_rate: ctx.vat_rate,
        calendar_hour_avg_kw: hour_tracker.average_kw(),
        available_capacity_kw: hour_tracker.available_capacity_kw(ctx.power_limit_kw),
        power_limit_kw: ctx.power_limit_kw,
        vehicles: ctx.vehicles,
        decision_reason,
        last_commands: ctx.last_commands,
        opportunity_export_revenue,
        opportunity_night_cost,
    }
}
