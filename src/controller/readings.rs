use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::VehicleConfig;

/// Site-wide readings for one cycle, already normalized by the host:
/// unreadable powers become 0.0, an unreadable grid meter additionally
/// clears `grid_meter_available`, and the night price list is pre-filtered
/// to the qualifying night window (21:00-05:00 UTC).
#[derive(Debug, Clone)]
pub struct SiteReadings {
    pub grid_power_w: f64,
    pub grid_meter_available: bool,
    pub solar_power_w: f64,
    pub battery_power_w: f64,
    pub battery_soc: u8,
    pub grid_rewards_active: bool,
    pub current_export_price: f64,
    pub current_import_price: f64,
    pub night_prices: Vec<(DateTime<Utc>, f64)>,
}

impl Default for SiteReadings {
    fn default() -> Self {
        Self {
            grid_power_w: 0.0,
            grid_meter_available: true,
            solar_power_w: 0.0,
            battery_power_w: 0.0,
            battery_soc: 0,
            grid_rewards_active: false,
            current_export_price: 0.0,
            current_import_price: 0.0,
            night_prices: Vec::new(),
        }
    }
}

/// Per-vehicle readings for one cycle, normalized the same way: unknown SoC
/// is `None`, unavailable or disconnected-like charger states read as not
/// connected.
#[derive(Debug, Clone, Default)]
pub struct VehicleReadings {
    pub current_soc: Option<u8>,
    pub is_connected: bool,
    pub departure_time: Option<DateTime<Utc>>,
}

/// The host's live-reading seam. Implementations do the sensor I/O and the
/// normalization; the pipeline never sees a failed read.
#[async_trait]
pub trait SensorReader: Send + Sync {
    async fn site(&self) -> SiteReadings;

    async fn vehicle(&self, config: &VehicleConfig) -> VehicleReadings;
}

/// In-memory reader with settable values, for tests and for running the
/// binary without a live smart-home host.
pub struct SimulatedReadings {
    site: Mutex<SiteReadings>,
    vehicles: Mutex<HashMap<String, VehicleReadings>>,
}

impl SimulatedReadings {
    pub fn new(site: SiteReadings) -> Self {
        Self {
            site: Mutex::new(site),
            vehicles: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_site(&self, site: SiteReadings) {
        *self.site.lock() = site;
    }

    pub fn set_vehicle(&self, vehicle_id: &str, readings: VehicleReadings) {
        self.vehicles
            .lock()
            .insert(vehicle_id.to_owned(), readings);
    }
}

impl Default for SimulatedReadings {
    fn default() -> Self {
        Self::new(SiteReadings::default())
    }
}

#[async_trait]
impl SensorReader for SimulatedReadings {
    async fn site(&self) -> SiteReadings {
        self.site.lock().clone()
    }

    async fn vehicle(&self, config: &VehicleConfig) -> VehicleReadings {
        self.vehicles
            .lock()
            .get(&config.vehicle_id)
            .cloned()
            .unwrap_or_default()
    }
}
