use serde::{Deserialize, Serialize};

use crate::domain::VehicleState;

/// Most onboard chargers cannot regulate below 6 A; anything less is never
/// issued.
pub const MIN_CHARGING_AMPS: u32 = 6;
pub const NUM_PHASES: u8 = 3;
pub const VOLTAGE_V: f64 = 230.0;
pub const DEFAULT_FUSE_SIZE: u32 = 20;

/// Allocation for a single vehicle in one allocator pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerAllocation {
    pub vehicle_id: String,
    pub amps: u32,
    pub phases: u8,
}

/// Distribute available capacity across vehicles by priority.
///
/// Vehicles are sorted ascending by priority number (1 = served first);
/// equal priorities keep their input order (stable sort). The loop is a
/// strict greedy: each vehicle takes as many amps as the remaining capacity
/// funds at three-phase 230 V, capped by the fuse rating, and is never
/// revisited to make room for a later vehicle. Allocations below
/// [`MIN_CHARGING_AMPS`] are rounded down to zero.
pub fn allocate_power_to_vehicles(
    vehicles: &[VehicleState],
    available_capacity_kw: f64,
    fuse_size: u32,
) -> Vec<PowerAllocation> {
    let mut sorted: Vec<&VehicleState> = vehicles.iter().collect();
    sorted.sort_by_key(|v| v.priority);

    let mut remaining_kw = available_capacity_kw;
    let mut allocations = Vec::with_capacity(sorted.len());

    for vehicle in sorted {
        if !vehicle.needs_charge() || !vehicle.is_connected {
            allocations.push(PowerAllocation {
                vehicle_id: vehicle.vehicle_id.clone(),
                amps: 0,
                phases: NUM_PHASES,
            });
            continue;
        }

        // Three-phase draw: I = W / (V * 3), truncated to whole amps.
        let max_amps_from_capacity =
            (remaining_kw.max(0.0) * 1000.0 / (VOLTAGE_V * f64::from(NUM_PHASES))) as u32;

        if max_amps_from_capacity < MIN_CHARGING_AMPS {
            allocations.push(PowerAllocation {
                vehicle_id: vehicle.vehicle_id.clone(),
                amps: 0,
                phases: NUM_PHASES,
            });
            continue;
        }

        let amps = max_amps_from_capacity.min(fuse_size);
        remaining_kw -= f64::from(amps) * VOLTAGE_V * f64::from(NUM_PHASES) / 1000.0;
        allocations.push(PowerAllocation {
            vehicle_id: vehicle.vehicle_id.clone(),
            amps,
            phases: NUM_PHASES,
        });
    }

    allocations
}
