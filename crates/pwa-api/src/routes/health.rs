//! Health check endpoints

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Bucket of the serving controller; absent while requests pass through
    pub controller: Option<String>,
    pub update_status: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    metrics::counter!("pwa_cache_health_checks_total").increment(1);

    let controller = state
        .registration
        .active_controller()
        .map(|c| c.cache_name().to_string());
    let update_status = state.update_status.borrow().as_str();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        controller,
        update_status,
    })
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
}
