//! Cache controller
//!
//! One controller instance per version: it owns the bucket named after that
//! version, precaches the shell on install, purges older buckets on
//! activation and answers fetches while active.

mod lifecycle;
mod message;
mod worker;

pub use lifecycle::{ControllerState, LifecycleEvent};
pub use message::ControllerMessage;
pub use worker::{CacheController, ControllerId, FetchOutcome};
