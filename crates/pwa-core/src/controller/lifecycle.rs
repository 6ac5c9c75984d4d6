//! Controller lifecycle state machine

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a single controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// Created, install not started
    #[default]
    Parsed,
    /// Precaching the manifest into a staging area
    Installing,
    /// Installed; waiting while another controller is active
    Installed,
    /// Purging stale buckets
    Activating,
    /// Serving fetches
    Activated,
    /// Failed to install or superseded
    Redundant,
}

/// Input to [`ControllerState::transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Install,
    InstallSucceeded,
    InstallFailed,
    Activate,
    ActivateSucceeded,
    Supersede,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Parsed => "parsed",
            ControllerState::Installing => "installing",
            ControllerState::Installed => "installed",
            ControllerState::Activating => "activating",
            ControllerState::Activated => "activated",
            ControllerState::Redundant => "redundant",
        }
    }

    /// Next state for `event`, or an error if the event is not valid here
    pub fn transition(self, event: LifecycleEvent) -> Result<ControllerState, CoreError> {
        use ControllerState::*;
        use LifecycleEvent::*;

        let next = match (self, event) {
            (Parsed, Install) => Installing,
            (Installing, InstallSucceeded) => Installed,
            (Installing, InstallFailed) => Redundant,
            (Installed, Activate) => Activating,
            (Activating, ActivateSucceeded) => Activated,
            (Redundant, _) => {
                return Err(CoreError::InvalidTransition { from: self, event });
            }
            (_, Supersede) => Redundant,
            _ => return Err(CoreError::InvalidTransition { from: self, event }),
        };

        Ok(next)
    }
}
