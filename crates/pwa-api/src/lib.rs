//! PWA Cache HTTP API
//!
//! Axum router for the offline shell cache: every request that is not part
//! of the `/_sw` control plane or a health check is routed through the
//! active cache controller.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
