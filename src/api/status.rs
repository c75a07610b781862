use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::response::{not_found, ok};
use crate::controller::AppState;
use crate::pipeline::CycleSnapshot;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub snapshot: CycleSnapshot,
    pub pause_all: bool,
    pub force_charge_vehicles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForceChargeRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub paused: bool,
}

pub async fn health() -> impl IntoResponse {
    ok("ok")
}

/// Latest cycle snapshot plus the override state living outside it.
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let controller = state.controller.read().await;
    let mut force: Vec<String> = controller
        .force_charge_vehicles()
        .iter()
        .cloned()
        .collect();
    force.sort();
    ok(StatusResponse {
        snapshot: controller.snapshot().clone(),
        pause_all: controller.pause_all(),
        force_charge_vehicles: force,
    })
}

pub async fn set_force_charge(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    Json(req): Json<ForceChargeRequest>,
) -> axum::response::Response {
    let mut controller = state.controller.write().await;
    if controller.set_force_charge(&vehicle_id, req.enabled) {
        ok(serde_json::json!({ "vehicle_id": vehicle_id, "enabled": req.enabled }))
            .into_response()
    } else {
        not_found(format!("unknown vehicle: {vehicle_id}")).into_response()
    }
}

pub async fn set_pause(
    State(state): State<AppState>,
    Json(req): Json<PauseRequest>,
) -> impl IntoResponse {
    let mut controller = state.controller.write().await;
    controller.set_pause_all(req.paused);
    ok(serde_json::json!({ "paused": req.paused }))
}
