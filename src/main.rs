use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ev_charge_controller::charger::{ChargerControl, ChargerError, EaseeCharger, HostServices};
use ev_charge_controller::config::Config;
use ev_charge_controller::controller::{
    spawn_controller_task, AppState, Controller, SimulatedReadings,
};
use ev_charge_controller::pipeline::clock::SystemClock;
use ev_charge_controller::{api, telemetry};
use tracing::{info, warn};

/// Stand-in host until the service runs against a live smart-home
/// installation: service calls are logged and acknowledged, states read as
/// a connected, idle charger.
struct LoggingHost;

#[async_trait::async_trait]
impl HostServices for LoggingHost {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        payload: serde_json::Value,
    ) -> Result<(), ChargerError> {
        info!(domain, service, %payload, "host service call");
        Ok(())
    }

    async fn read_state(&self, entity_id: &str) -> Option<String> {
        info!(entity_id, "host state read");
        Some("ready_to_charge".to_owned())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Config::load()?;

    if cfg.vehicles.is_empty() {
        warn!("no vehicles configured; the pipeline will have nothing to allocate");
    }

    let host: Arc<dyn HostServices> = Arc::new(LoggingHost);
    let mut chargers: HashMap<String, Arc<dyn ChargerControl>> = HashMap::new();
    for entry in &cfg.vehicles {
        let vehicle = entry.to_vehicle_config();
        chargers.insert(
            vehicle.charger_entity_id.clone(),
            Arc::new(EaseeCharger::from_status_entity(
                host.clone(),
                &vehicle.charger_entity_id,
            )),
        );
    }

    let reader = Arc::new(SimulatedReadings::default());
    let clock = Arc::new(SystemClock::new());
    let controller = Controller::new(cfg.clone(), reader, chargers, clock);
    let state = AppState::new(controller);

    let tick = Duration::from_secs(cfg.controller.tick_seconds);
    let _cycle_task = spawn_controller_task(state.clone(), tick);

    let app = api::router(state);
    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0 - the override API will be reachable from the network");
    }

    info!(%addr, "starting EV charge controller");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
