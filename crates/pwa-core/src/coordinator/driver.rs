//! Async driver for the coordinator state machine

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::state::{CoordinatorInput, CoordinatorState, Effect, UpdateStatus};
use crate::config::CoordinatorConfig;
use crate::controller::{ControllerId, ControllerMessage, ControllerState};
use crate::registration::{ClientId, Registration, RegistrationEvent};

/// Receives the reload request once a new controller took over
pub trait Reloader: Send + Sync {
    fn reload(&self);
}

/// Reloader that bumps a generation counter observers can watch
pub struct ReloadSignal {
    generation: watch::Sender<u64>,
}

impl ReloadSignal {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self { generation }
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl Default for ReloadSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Reloader for ReloadSignal {
    fn reload(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

/// Why [`UpdateCoordinator::begin_watching`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorExit {
    /// A new controller took over and the reload was requested
    Reloaded,
    /// Nothing to watch
    Finished,
    /// The registration stopped publishing events
    Closed,
}

/// Watches a registration for one page session
pub struct UpdateCoordinator {
    registration: Option<Arc<Registration>>,
    reloader: Arc<dyn Reloader>,
    state: CoordinatorState,
    status: Arc<watch::Sender<UpdateStatus>>,
    visibility: Arc<Notify>,
}

impl UpdateCoordinator {
    pub fn new(
        registration: Option<Arc<Registration>>,
        reloader: Arc<dyn Reloader>,
        config: CoordinatorConfig,
    ) -> Self {
        let (status, _) = watch::channel(UpdateStatus::Checking);

        Self {
            registration,
            reloader,
            state: CoordinatorState::new(config),
            status: Arc::new(status),
            visibility: Arc::new(Notify::new()),
        }
    }

    /// Publish status on a shared channel
    pub fn with_status(mut self, status: Arc<watch::Sender<UpdateStatus>>) -> Self {
        status.send_replace(self.state.status());
        self.status = status;
        self
    }

    /// Listen for "page became visible" notifications on a shared handle
    pub fn with_visibility(mut self, visibility: Arc<Notify>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn status(&self) -> watch::Receiver<UpdateStatus> {
        self.status.subscribe()
    }

    pub fn visibility(&self) -> Arc<Notify> {
        self.visibility.clone()
    }

    fn apply(&mut self, input: CoordinatorInput) -> Vec<Effect> {
        let before = self.state.status();
        let effects = self.state.handle(input);
        let after = self.state.status();

        if before != after {
            info!("Update status: {} -> {}", before.as_str(), after.as_str());
        }
        debug!("{:?} -> {:?}", input, effects);

        self.status.send_replace(after);
        effects
    }

    /// Run until a reload is requested
    ///
    /// Without a registration the status goes straight to `finished`.
    pub async fn begin_watching(mut self) -> CoordinatorExit {
        let Some(registration) = self.registration.clone() else {
            info!("No controller runtime available");
            self.apply(CoordinatorInput::RuntimeUnavailable);
            return CoordinatorExit::Finished;
        };

        let mut events = registration.subscribe();
        let client = registration.attach_client();
        registration.ready().await;

        let initial = registration.active_controller().map(|c| c.id());
        let mut installing: Option<ControllerId> = None;

        let hand_off = sleep(Duration::ZERO);
        let recheck = sleep(Duration::ZERO);
        tokio::pin!(hand_off, recheck);
        let mut hand_off_armed = false;
        let mut recheck_armed = false;

        let mut queue: VecDeque<Effect> = self
            .apply(CoordinatorInput::Ready {
                waiting: registration.has_waiting(),
            })
            .into();

        loop {
            while let Some(effect) = queue.pop_front() {
                match effect {
                    Effect::ScheduleHandOff(delay) => {
                        hand_off.as_mut().reset(Instant::now() + delay);
                        hand_off_armed = true;
                    }
                    Effect::ScheduleRecheck(delay) => {
                        recheck.as_mut().reset(Instant::now() + delay);
                        recheck_armed = true;
                    }
                    Effect::SendSkipWaiting => {
                        if let Err(e) = registration
                            .post_message(&ControllerMessage::SkipWaiting)
                            .await
                        {
                            warn!("Skip waiting failed: {}", e);
                        }
                    }
                    Effect::CheckForUpdate => {
                        let input = match registration.update().await {
                            Ok(outcome) => {
                                debug!("Update check: {:?}", outcome);
                                CoordinatorInput::UpdateChecked
                            }
                            Err(e) => {
                                warn!("Update check failed: {}", e);
                                CoordinatorInput::UpdateCheckFailed
                            }
                        };
                        queue.extend(self.apply(input));
                    }
                    Effect::Reload => {
                        info!("Controller changed, reloading");
                        self.reloader.reload();
                        leave(&registration, client).await;
                        return CoordinatorExit::Reloaded;
                    }
                }
            }

            let input = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => match translate(event, initial, &mut installing) {
                        Some(input) => input,
                        None => continue,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Coordinator missed {} registration events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        leave(&registration, client).await;
                        return CoordinatorExit::Closed;
                    }
                },
                () = &mut hand_off, if hand_off_armed => {
                    hand_off_armed = false;
                    CoordinatorInput::HandOffDue
                }
                () = &mut recheck, if recheck_armed => {
                    recheck_armed = false;
                    CoordinatorInput::Recheck {
                        waiting: registration.has_waiting(),
                    }
                }
                () = self.visibility.notified() => CoordinatorInput::BecameVisible,
            };

            queue.extend(self.apply(input));
        }
    }
}

fn translate(
    event: RegistrationEvent,
    initial: Option<ControllerId>,
    installing: &mut Option<ControllerId>,
) -> Option<CoordinatorInput> {
    match event {
        RegistrationEvent::UpdateFound { id, .. } => {
            *installing = Some(id);
            None
        }
        RegistrationEvent::StateChange {
            id,
            state: ControllerState::Installed,
            controlled,
            ..
        } if *installing == Some(id) => Some(CoordinatorInput::WorkerInstalled { controlled }),
        RegistrationEvent::StateChange { .. } => None,
        RegistrationEvent::ControllerChange { id, .. } if initial != Some(id) => {
            Some(CoordinatorInput::ControllerChanged)
        }
        RegistrationEvent::ControllerChange { .. } => None,
    }
}

async fn leave(registration: &Registration, client: ClientId) {
    if let Err(e) = registration.detach_client(client).await {
        warn!("Failed to detach client: {}", e);
    }
}
