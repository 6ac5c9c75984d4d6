//! Controller control plane
//!
//! What a page would otherwise do through its registration handle: post
//! messages to the waiting controller, ask for an update check, report that
//! it became visible, and read the current lifecycle state.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use pwa_core::{ControllerMessage, RegistrationSnapshot, UpdateOutcome, UpdateStatus};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub registration: RegistrationSnapshot,
    pub update_status: UpdateStatus,
    pub reload_generation: u64,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub activated: bool,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub outcome: UpdateOutcome,
}

/// GET /_sw/status
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        registration: state.registration.snapshot(),
        update_status: *state.update_status.borrow(),
        reload_generation: state.reload.generation(),
    })
}

/// POST /_sw/message
///
/// Always accepted; a message that finds nothing waiting is a no-op.
async fn message(
    State(state): State<AppState>,
    Json(message): Json<ControllerMessage>,
) -> (StatusCode, Json<MessageResponse>) {
    debug!("Client message: {:?}", message);

    let activated = match state.registration.post_message(&message).await {
        Ok(activated) => activated,
        Err(e) => {
            warn!("Message {:?} failed: {}", message, e);
            false
        }
    };

    (StatusCode::ACCEPTED, Json(MessageResponse { activated }))
}

/// POST /_sw/update
async fn update(State(state): State<AppState>) -> Result<Json<UpdateResponse>, ApiError> {
    let outcome = state.registration.update().await?;
    info!("Update check requested: {:?}", outcome);
    Ok(Json(UpdateResponse { outcome }))
}

/// POST /_sw/visible
async fn visible(State(state): State<AppState>) -> StatusCode {
    state.visibility.notify_one();
    StatusCode::NO_CONTENT
}

/// Create control plane routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/_sw/status", get(status))
        .route("/_sw/message", post(message))
        .route("/_sw/update", post(update))
        .route("/_sw/visible", post(visible))
}
