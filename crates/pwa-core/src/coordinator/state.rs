//! Coordinator state machine
//!
//! Pure transition logic: every input yields a list of effects for the
//! driver to carry out. Timers and I/O live in the driver.

use serde::Serialize;
use std::time::Duration;

use crate::config::CoordinatorConfig;

/// Status shown to the user while an update is handed off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    #[default]
    Checking,
    UpdateAvailable,
    Updating,
    Finished,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Checking => "checking",
            UpdateStatus::UpdateAvailable => "update-available",
            UpdateStatus::Updating => "updating",
            UpdateStatus::Finished => "finished",
        }
    }
}

/// Something the coordinator observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorInput {
    /// No registration to watch
    RuntimeUnavailable,
    /// A controller is active; `waiting` tells if a new one already waits
    Ready { waiting: bool },
    /// An update check completed
    UpdateChecked,
    /// An update check failed
    UpdateCheckFailed,
    /// The re-check delay elapsed
    Recheck { waiting: bool },
    /// The controller found by the last update reached `Installed`
    WorkerInstalled { controlled: bool },
    /// The hand-off delay elapsed
    HandOffDue,
    /// A new controller took over
    ControllerChanged,
    /// The page became visible again
    BecameVisible,
}

/// Something the driver must do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ScheduleHandOff(Duration),
    SendSkipWaiting,
    CheckForUpdate,
    ScheduleRecheck(Duration),
    Reload,
}

#[derive(Debug, Clone)]
pub struct CoordinatorState {
    status: UpdateStatus,
    reloaded: bool,
    hand_off_scheduled: bool,
    config: CoordinatorConfig,
}

impl CoordinatorState {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            status: UpdateStatus::Checking,
            reloaded: false,
            hand_off_scheduled: false,
            config,
        }
    }

    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    pub fn reloaded(&self) -> bool {
        self.reloaded
    }

    /// Apply an input and return the effects it triggers
    pub fn handle(&mut self, input: CoordinatorInput) -> Vec<Effect> {
        use CoordinatorInput::*;

        if self.reloaded {
            return Vec::new();
        }

        match input {
            RuntimeUnavailable => {
                self.status = UpdateStatus::Finished;
                Vec::new()
            }
            Ready { waiting: true } | Recheck { waiting: true } => self.update_detected(),
            Ready { waiting: false } => vec![Effect::CheckForUpdate],
            UpdateChecked if self.status == UpdateStatus::Checking => {
                vec![Effect::ScheduleRecheck(self.config.recheck_delay())]
            }
            UpdateChecked => Vec::new(),
            UpdateCheckFailed | Recheck { waiting: false } => {
                if self.status == UpdateStatus::Checking {
                    self.status = UpdateStatus::Finished;
                }
                Vec::new()
            }
            WorkerInstalled { controlled: true } => self.update_detected(),
            WorkerInstalled { controlled: false } => Vec::new(),
            HandOffDue => {
                self.status = UpdateStatus::Updating;
                self.hand_off_scheduled = false;
                vec![Effect::SendSkipWaiting]
            }
            ControllerChanged => {
                self.reloaded = true;
                vec![Effect::Reload]
            }
            BecameVisible => vec![Effect::CheckForUpdate],
        }
    }

    fn update_detected(&mut self) -> Vec<Effect> {
        if self.hand_off_scheduled || self.status == UpdateStatus::Updating {
            return Vec::new();
        }

        self.status = UpdateStatus::UpdateAvailable;
        self.hand_off_scheduled = true;
        vec![Effect::ScheduleHandOff(self.config.hand_off_delay())]
    }
}
