//! Update coordinator
//!
//! Watches a [`Registration`](crate::Registration) on behalf of one page,
//! hands control to a newly installed version and reloads the page once.

mod driver;
mod state;

pub use driver::{CoordinatorExit, ReloadSignal, Reloader, UpdateCoordinator};
pub use state::{CoordinatorInput, CoordinatorState, Effect, UpdateStatus};
