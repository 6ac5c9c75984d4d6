//! Controller registration
//!
//! Holds the installing, waiting and active controllers for one scope and
//! serializes every lifecycle change. Fetches only ever see a fully
//! activated controller.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pwa_proxy::{FetchRequest, Fetcher};
use pwa_storage::CacheStorage;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ControllerConfig;
use crate::controller::{
    CacheController, ControllerId, ControllerMessage, ControllerState, FetchOutcome,
};
use crate::error::CoreError;

/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A page attached to the registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClientId(Uuid);

/// Summary of one controller slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerInfo {
    pub id: ControllerId,
    pub cache_name: String,
    pub version: String,
    pub state: ControllerState,
}

impl ControllerInfo {
    fn of(controller: &CacheController) -> Self {
        Self {
            id: controller.id(),
            cache_name: controller.cache_name().to_string(),
            version: controller.version().to_string(),
            state: controller.state(),
        }
    }
}

/// Lifecycle notification broadcast to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RegistrationEvent {
    /// A new controller started installing
    UpdateFound { id: ControllerId, cache_name: String },
    /// A controller changed state; `controlled` is set when another
    /// controller was active at the time
    StateChange {
        id: ControllerId,
        cache_name: String,
        state: ControllerState,
        controlled: bool,
    },
    /// A new controller took over
    ControllerChange { id: ControllerId, cache_name: String },
}

/// Serializable view of the registration
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSnapshot {
    pub scope: String,
    pub installing: Option<ControllerInfo>,
    pub waiting: Option<ControllerInfo>,
    pub active: Option<ControllerInfo>,
    pub clients: usize,
}

/// Result of [`Registration::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOutcome {
    /// The configured version is already active or waiting
    UpToDate,
    /// Installed and waiting for a skip-waiting signal or for clients to leave
    Waiting,
    /// Installed and activated right away
    Activated,
}

/// Where the registration reads the current controller configuration from
#[async_trait]
pub trait ControllerSource: Send + Sync {
    async fn current(&self) -> Result<ControllerConfig, CoreError>;
}

/// Fixed in-memory configuration
pub struct StaticSource {
    config: RwLock<ControllerConfig>,
}

impl StaticSource {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Replace the configuration returned by the next update check
    pub fn set(&self, config: ControllerConfig) {
        *self.config.write() = config;
    }
}

#[async_trait]
impl ControllerSource for StaticSource {
    async fn current(&self) -> Result<ControllerConfig, CoreError> {
        Ok(self.config.read().clone())
    }
}

#[derive(Default)]
struct Slots {
    installing: Option<ControllerInfo>,
    waiting: Option<CacheController>,
    clients: HashSet<ClientId>,
}

/// Installing, waiting and active controllers for one scope
pub struct Registration {
    scope: Url,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    source: Arc<dyn ControllerSource>,
    active: RwLock<Option<Arc<CacheController>>>,
    slots: Mutex<Slots>,
    lifecycle: tokio::sync::Mutex<()>,
    events: broadcast::Sender<RegistrationEvent>,
    ready: watch::Sender<bool>,
}

impl Registration {
    pub fn new(
        scope: Url,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        source: Arc<dyn ControllerSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (ready, _) = watch::channel(false);

        Self {
            scope,
            storage,
            fetcher,
            source,
            active: RwLock::new(None),
            slots: Mutex::new(Slots::default()),
            lifecycle: tokio::sync::Mutex::new(()),
            events,
            ready,
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegistrationEvent) {
        debug!("Registration event: {:?}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_state(&self, info: &ControllerInfo, controlled: bool) {
        self.emit(RegistrationEvent::StateChange {
            id: info.id,
            cache_name: info.cache_name.clone(),
            state: info.state,
            controlled,
        });
    }

    /// Wait until a controller is active
    pub async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        if rx.wait_for(|ready| *ready).await.is_err() {
            warn!("Registration dropped while waiting for an active controller");
        }
    }

    pub fn active_controller(&self) -> Option<Arc<CacheController>> {
        self.active.read().clone()
    }

    pub fn has_active(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn has_waiting(&self) -> bool {
        self.slots.lock().waiting.is_some()
    }

    pub fn snapshot(&self) -> RegistrationSnapshot {
        let active = self.active.read().as_deref().map(ControllerInfo::of);
        let slots = self.slots.lock();

        RegistrationSnapshot {
            scope: self.scope.to_string(),
            installing: slots.installing.clone(),
            waiting: slots.waiting.as_ref().map(ControllerInfo::of),
            active,
            clients: slots.clients.len(),
        }
    }

    // ==================== Clients ====================

    /// Attach a page; while any page is attached a new version waits
    pub fn attach_client(&self) -> ClientId {
        let id = ClientId(Uuid::new_v4());
        self.slots.lock().clients.insert(id);
        debug!("Client {:?} attached", id);
        id
    }

    /// Detach a page; the waiting controller activates once none remain
    pub async fn detach_client(&self, client: ClientId) -> Result<(), CoreError> {
        let _guard = self.lifecycle.lock().await;

        let waiting = {
            let mut slots = self.slots.lock();
            slots.clients.remove(&client);
            if slots.clients.is_empty() {
                slots.waiting.take()
            } else {
                None
            }
        };

        if let Some(controller) = waiting {
            info!(
                "Last client detached, activating waiting {}",
                controller.cache_name()
            );
            self.promote(controller).await?;
        }

        Ok(())
    }

    // ==================== Lifecycle ====================

    /// Check for a new controller version and install it
    ///
    /// A failed install leaves the current active and waiting controllers
    /// untouched.
    pub async fn update(&self) -> Result<UpdateOutcome, CoreError> {
        let _guard = self.lifecycle.lock().await;

        let config = self.source.current().await?;
        config.validate()?;
        let cache_name = config.cache_name();

        let active_name = self.active.read().as_ref().map(|c| c.cache_name().to_string());
        let waiting_name = self
            .slots
            .lock()
            .waiting
            .as_ref()
            .map(|c| c.cache_name().to_string());
        if active_name.as_deref() == Some(cache_name.as_str())
            || waiting_name.as_deref() == Some(cache_name.as_str())
        {
            debug!("Controller {} is up to date", cache_name);
            return Ok(UpdateOutcome::UpToDate);
        }

        let mut controller = CacheController::new(
            self.scope.clone(),
            config,
            self.storage.clone(),
            self.fetcher.clone(),
        );
        info!("Update found: {} (active: {:?})", cache_name, active_name);

        self.slots.lock().installing = Some(ControllerInfo::of(&controller));
        self.emit(RegistrationEvent::UpdateFound {
            id: controller.id(),
            cache_name: cache_name.clone(),
        });

        let result = controller.install().await;
        self.slots.lock().installing = None;
        let controlled = self.has_active();

        if let Err(e) = result {
            self.emit_state(&ControllerInfo::of(&controller), controlled);
            return Err(e);
        }

        let superseded = self.slots.lock().waiting.take();
        if let Some(mut old) = superseded {
            old.mark_redundant();
            info!("Waiting {} superseded by {}", old.cache_name(), cache_name);
            self.emit_state(&ControllerInfo::of(&old), controlled);
        }

        let no_clients = self.slots.lock().clients.is_empty();
        if !controlled || no_clients || controller.config().skip_waiting_on_install {
            self.emit_state(&ControllerInfo::of(&controller), controlled);
            self.promote(controller).await?;
            return Ok(UpdateOutcome::Activated);
        }

        let info = ControllerInfo::of(&controller);
        self.slots.lock().waiting = Some(controller);
        info!("{} installed and waiting", cache_name);
        self.emit_state(&info, controlled);

        Ok(UpdateOutcome::Waiting)
    }

    /// Deliver a client message to the waiting controller
    ///
    /// Returns true if it caused an activation. Without a waiting controller
    /// this is a no-op.
    pub async fn post_message(&self, message: &ControllerMessage) -> Result<bool, CoreError> {
        let _guard = self.lifecycle.lock().await;

        let waiting = {
            let mut slots = self.slots.lock();
            let accepted = slots
                .waiting
                .as_ref()
                .is_some_and(|controller| controller.on_message(message));
            if accepted { slots.waiting.take() } else { None }
        };

        match waiting {
            Some(controller) => {
                info!("Skip waiting requested for {}", controller.cache_name());
                self.promote(controller).await?;
                Ok(true)
            }
            None => {
                debug!("Message {:?} had no effect", message);
                Ok(false)
            }
        }
    }

    /// Activate `controller` and make it the one serving fetches
    async fn promote(&self, mut controller: CacheController) -> Result<(), CoreError> {
        controller.activate().await?;

        let controller = Arc::new(controller);
        let info = ControllerInfo::of(&controller);
        let previous = self.active.write().replace(controller);

        if let Some(previous) = previous {
            info!(
                "Controller {} replaced by {}",
                previous.cache_name(),
                info.cache_name
            );
        }

        self.emit_state(&info, true);
        self.emit(RegistrationEvent::ControllerChange {
            id: info.id,
            cache_name: info.cache_name.clone(),
        });
        self.ready.send_replace(true);

        Ok(())
    }

    // ==================== Fetch ====================

    /// Route a request through the active controller, if any
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, CoreError> {
        match self.active_controller() {
            Some(controller) => controller.handle_fetch(request).await,
            None => Ok(FetchOutcome::Passthrough),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFetcher, SCOPE, url};
    use pwa_storage::MemoryStorage;

    struct Fixture {
        registration: Registration,
        storage: Arc<MemoryStorage>,
        fetcher: Arc<MockFetcher>,
        source: Arc<StaticSource>,
    }

    fn version(v: &str) -> ControllerConfig {
        ControllerConfig {
            version: v.to_string(),
            ..Default::default()
        }
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve_shell();
        let source = Arc::new(StaticSource::new(version("v1")));
        let registration = Registration::new(
            url(SCOPE),
            storage.clone(),
            fetcher.clone(),
            source.clone(),
        );

        Fixture {
            registration,
            storage,
            fetcher,
            source,
        }
    }

    #[tokio::test]
    async fn test_first_install_activates() {
        let f = fixture();
        let mut events = f.registration.subscribe();

        assert_eq!(f.registration.update().await.unwrap(), UpdateOutcome::Activated);
        f.registration.ready().await;

        let snapshot = f.registration.snapshot();
        assert_eq!(snapshot.active.unwrap().cache_name, "san-camilo-v1");
        assert!(snapshot.waiting.is_none());

        assert!(matches!(
            events.recv().await.unwrap(),
            RegistrationEvent::UpdateFound { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            RegistrationEvent::StateChange {
                state: ControllerState::Installed,
                controlled: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_same_version_is_up_to_date() {
        let f = fixture();
        f.registration.update().await.unwrap();
        assert_eq!(f.registration.update().await.unwrap(), UpdateOutcome::UpToDate);
    }

    #[tokio::test]
    async fn test_new_version_waits_while_clients_attached() {
        let f = fixture();
        f.registration.update().await.unwrap();
        let client = f.registration.attach_client();

        f.source.set(version("v2"));
        assert_eq!(f.registration.update().await.unwrap(), UpdateOutcome::Waiting);
        assert!(f.registration.has_waiting());
        assert_eq!(
            f.registration.active_controller().unwrap().cache_name(),
            "san-camilo-v1"
        );

        f.registration.detach_client(client).await.unwrap();
        assert!(!f.registration.has_waiting());
        assert_eq!(
            f.registration.active_controller().unwrap().cache_name(),
            "san-camilo-v2"
        );
        assert_eq!(f.storage.keys().await.unwrap(), vec!["san-camilo-v2"]);
    }

    #[tokio::test]
    async fn test_skip_waiting_activates() {
        let f = fixture();
        f.registration.update().await.unwrap();
        let _client = f.registration.attach_client();
        f.source.set(version("v2"));
        f.registration.update().await.unwrap();

        let mut events = f.registration.subscribe();
        assert!(f
            .registration
            .post_message(&ControllerMessage::SkipWaiting)
            .await
            .unwrap());

        let snapshot = f.registration.snapshot();
        assert_eq!(snapshot.active.unwrap().cache_name, "san-camilo-v2");
        assert_eq!(snapshot.clients, 1);

        loop {
            if let RegistrationEvent::ControllerChange { cache_name, .. } =
                events.recv().await.unwrap()
            {
                assert_eq!(cache_name, "san-camilo-v2");
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_skip_waiting_without_waiting_is_noop() {
        let f = fixture();
        f.registration.update().await.unwrap();
        assert!(!f
            .registration
            .post_message(&ControllerMessage::SkipWaiting)
            .await
            .unwrap());
        assert!(!f
            .registration
            .post_message(&ControllerMessage::Unknown)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_version() {
        let f = fixture();
        f.registration.update().await.unwrap();
        let _client = f.registration.attach_client();

        f.fetcher.fail(&format!("{}manifest.json", SCOPE));
        f.source.set(version("v2"));
        assert!(f.registration.update().await.is_err());

        let snapshot = f.registration.snapshot();
        assert_eq!(snapshot.active.unwrap().cache_name, "san-camilo-v1");
        assert!(snapshot.waiting.is_none());
        assert!(snapshot.installing.is_none());
        assert_eq!(f.storage.keys().await.unwrap(), vec!["san-camilo-v1"]);
    }

    #[tokio::test]
    async fn test_newer_waiting_supersedes_older() {
        let f = fixture();
        f.registration.update().await.unwrap();
        let _client = f.registration.attach_client();

        f.source.set(version("v2"));
        f.registration.update().await.unwrap();
        f.source.set(version("v3"));
        assert_eq!(f.registration.update().await.unwrap(), UpdateOutcome::Waiting);

        let snapshot = f.registration.snapshot();
        assert_eq!(snapshot.waiting.unwrap().cache_name, "san-camilo-v3");
    }

    #[tokio::test]
    async fn test_skip_waiting_on_install() {
        let f = fixture();
        f.registration.update().await.unwrap();
        let _client = f.registration.attach_client();

        f.source.set(ControllerConfig {
            skip_waiting_on_install: true,
            ..version("v2")
        });
        assert_eq!(f.registration.update().await.unwrap(), UpdateOutcome::Activated);
    }

    #[tokio::test]
    async fn test_fetch_without_active_passes_through() {
        let f = fixture();
        let request = FetchRequest::get(url("https://hospice.example/assets/a.js"));
        let outcome = f.registration.handle_fetch(&request).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Passthrough));
    }
}
