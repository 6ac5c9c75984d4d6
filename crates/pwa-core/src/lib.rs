//! Offline Shell Cache Core Logic
//!
//! This crate provides the cache controller (per-request strategies and
//! versioned bucket lifecycle), the registration that holds installing,
//! waiting and active controllers, and the update coordinator that hands
//! clients over to a newly installed version.

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod registration;
pub mod routing;

#[cfg(test)]
mod testing;

pub use config::{ControllerConfig, CoordinatorConfig};
pub use controller::{
    CacheController, ControllerId, ControllerMessage, ControllerState, FetchOutcome,
    LifecycleEvent,
};
pub use coordinator::{
    CoordinatorExit, CoordinatorInput, CoordinatorState, Effect, ReloadSignal, Reloader,
    UpdateCoordinator, UpdateStatus,
};
pub use error::CoreError;
pub use registration::{
    ClientId, ControllerInfo, ControllerSource, Registration, RegistrationEvent,
    RegistrationSnapshot, StaticSource, UpdateOutcome,
};
pub use routing::{RequestRouter, Strategy};
