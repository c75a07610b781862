use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;
use validator::Validate;

use crate::domain::VehicleConfig;
use crate::pipeline::allocator::DEFAULT_FUSE_SIZE;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    pub server: ServerConfig,
    #[validate(nested)]
    pub controller: ControllerConfig,
    #[validate(nested)]
    pub site: SiteConfig,
    #[validate(nested)]
    pub economics: EconomicsConfig,
    #[validate(nested)]
    #[serde(default)]
    pub vehicles: Vec<VehicleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ControllerConfig {
    /// Seconds between decision cycles.
    #[validate(range(min = 1))]
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

/// Site sensors and electrical limits. Sensor identifiers name entities in
/// the smart-home host; the controller reads them fresh every cycle.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SiteConfig {
    pub grid_sensor: String,
    pub solar_sensor: String,
    pub battery_power_sensor: String,
    pub battery_soc_sensor: String,
    pub price_sensor: String,
    pub grid_rewards_entity: Option<String>,
    #[validate(range(min = 0.1, max = 100.0))]
    #[serde(default = "default_power_limit_kw")]
    pub power_limit_kw: f64,
    #[validate(range(min = 6, max = 63))]
    #[serde(default = "default_fuse_size")]
    pub fuse_size: u32,
}

/// Tariff components as per-kWh rates; VAT as a fraction.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EconomicsConfig {
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub grid_fee_import: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub grid_fee_export: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub export_compensation: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_vat_rate")]
    pub vat_rate: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VehicleEntry {
    /// Stable identity; defaults to the name when omitted.
    pub vehicle_id: Option<String>,
    pub name: String,
    #[validate(range(min = 1))]
    #[serde(default = "default_priority")]
    pub priority: u32,
    pub charger_entity: String,
    pub soc_entity: Option<String>,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_target_soc")]
    pub target_soc: u8,
    pub departure_entity: Option<String>,
}

impl VehicleEntry {
    pub fn to_vehicle_config(&self) -> VehicleConfig {
        VehicleConfig {
            vehicle_id: self
                .vehicle_id
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            name: self.name.clone(),
            priority: self.priority,
            charger_entity_id: self.charger_entity.clone(),
            soc_entity_id: self.soc_entity.clone(),
            target_soc: self.target_soc,
            departure_entity_id: self.departure_entity.clone(),
        }
    }
}

fn default_tick_seconds() -> u64 {
    30
}

fn default_power_limit_kw() -> f64 {
    11.0
}

fn default_fuse_size() -> u32 {
    DEFAULT_FUSE_SIZE
}

fn default_vat_rate() -> f64 {
    0.25
}

fn default_priority() -> u32 {
    1
}

fn default_target_soc() -> u8 {
    80
}

impl Config {
    /// Load from `config/default.toml` with `EVCC__`-prefixed environment
    /// overrides, then bounds-check. The pipeline performs no validation of
    /// its own; out-of-range values must fail here.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("EVCC__").split("__"));
        let config: Config = figment.extract().context("reading configuration")?;
        config.validate().context("validating configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toml_config(vat: f64, fuse: u32) -> String {
        format!(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [controller]

            [site]
            grid_sensor = "sensor.grid_power"
            solar_sensor = "sensor.solar_power"
            battery_power_sensor = "sensor.battery_power"
            battery_soc_sensor = "sensor.battery_soc"
            price_sensor = "sensor.nordpool"
            fuse_size = {fuse}

            [economics]
            vat_rate = {vat}

            [[vehicles]]
            name = "Model Y"
            charger_entity = "sensor.easee_garage_status"
            "#
        )
    }

    fn load_str(raw: &str) -> Result<Config> {
        let config: Config = Figment::new().merge(Toml::string(raw)).extract()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_are_applied() {
        let config = load_str(&toml_config(0.25, 20)).unwrap();
        assert_eq!(config.controller.tick_seconds, 30);
        assert_eq!(config.site.power_limit_kw, 11.0);
        assert_eq!(config.vehicles[0].target_soc, 80);
        assert_eq!(config.vehicles[0].priority, 1);
    }

    #[test]
    fn vehicle_id_falls_back_to_name() {
        let config = load_str(&toml_config(0.25, 20)).unwrap();
        let vehicle = config.vehicles[0].to_vehicle_config();
        assert_eq!(vehicle.vehicle_id, "Model Y");
    }

    #[test]
    fn out_of_range_vat_is_rejected() {
        assert!(load_str(&toml_config(1.5, 20)).is_err());
    }

    #[test]
    fn undersized_fuse_is_rejected() {
        assert!(load_str(&toml_config(0.25, 4)).is_err());
    }
}
