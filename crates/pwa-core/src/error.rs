//! Core error types

use thiserror::Error;

use crate::controller::{ControllerState, LifecycleEvent};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] pwa_storage::StorageError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] pwa_proxy::ProxyError),

    #[error("Install of {cache_name} failed: {reason}")]
    InstallFailed { cache_name: String, reason: String },

    #[error("Precache of {url} returned status {status}")]
    PrecacheStatus { url: String, status: u16 },

    #[error("Invalid lifecycle transition: {event:?} in state {from:?}")]
    InvalidTransition {
        from: ControllerState,
        event: LifecycleEvent,
    },

    #[error("Controller is not active (state: {0:?})")]
    NotActive(ControllerState),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
