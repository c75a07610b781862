//! Read-only status surface plus the two host-writable overrides
//! (per-vehicle force charge and the global pause-all flag), standing in
//! for the smart-home host's entity layer.

mod response;
mod status;

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(status::health))
        .route("/api/v1/status", get(status::get_status))
        .route(
            "/api/v1/vehicles/:vehicle_id/force-charge",
            put(status::set_force_charge),
        )
        .route("/api/v1/pause", put(status::set_pause))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
