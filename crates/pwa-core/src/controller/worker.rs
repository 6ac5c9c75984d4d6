//! Cache controller implementation

use chrono::Utc;
use futures::future::try_join_all;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use pwa_proxy::{FetchMode, FetchRequest, FetchResponse, Fetcher, ResponseType};
use pwa_storage::{CacheKey, CacheStorage, StagingId, StorageError, StoredResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::lifecycle::{ControllerState, LifecycleEvent};
use super::message::ControllerMessage;
use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::routing::{RequestRouter, Strategy};

/// Unique identifier of a controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(Uuid);

impl ControllerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of routing a request through an active controller
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the caller fetches it from the network itself
    Passthrough,
    /// Served from the controller's bucket
    Cache(FetchResponse),
    /// Served from the network
    Network(FetchResponse),
}

impl FetchOutcome {
    /// The response, if the controller produced one
    pub fn into_response(self) -> Option<FetchResponse> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Cache(r) | FetchOutcome::Network(r) => Some(r),
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::Passthrough => "passthrough",
            FetchOutcome::Cache(_) => "cache",
            FetchOutcome::Network(_) => "network",
        }
    }
}

/// A single controller version
pub struct CacheController {
    id: ControllerId,
    scope: Url,
    config: ControllerConfig,
    cache_name: String,
    router: RequestRouter,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: ControllerState,
}

impl CacheController {
    /// Create a controller for `config`, serving requests under `scope`
    pub fn new(
        scope: Url,
        config: ControllerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let router = RequestRouter::new(&scope, &config);
        let cache_name = config.cache_name();

        Self {
            id: ControllerId::new(),
            scope,
            config,
            cache_name,
            router,
            storage,
            fetcher,
            state: ControllerState::Parsed,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn apply(&mut self, event: LifecycleEvent) -> Result<(), CoreError> {
        let next = self.state.transition(event)?;
        debug!(
            "Controller {} ({}): {} -> {}",
            self.id,
            self.cache_name,
            self.state.as_str(),
            next.as_str()
        );
        self.state = next;
        Ok(())
    }

    // ==================== Lifecycle ====================

    /// Precache the manifest; all-or-nothing
    ///
    /// On failure nothing is left in storage and the controller becomes
    /// redundant.
    pub async fn install(&mut self) -> Result<(), CoreError> {
        self.apply(LifecycleEvent::Install)?;
        info!(
            "Installing controller {} ({} resources into {})",
            self.id,
            self.config.precache.len(),
            self.cache_name
        );

        match self.precache().await {
            Ok(count) => {
                self.apply(LifecycleEvent::InstallSucceeded)?;
                metrics::counter!("pwa_cache_install_total", "result" => "success").increment(1);
                info!("Installed {} ({} entries precached)", self.cache_name, count);
                Ok(())
            }
            Err(e) => {
                self.apply(LifecycleEvent::InstallFailed)?;
                metrics::counter!("pwa_cache_install_total", "result" => "failure").increment(1);
                warn!("Install of {} failed: {}", self.cache_name, e);
                Err(CoreError::InstallFailed {
                    cache_name: self.cache_name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn precache(&self) -> Result<usize, CoreError> {
        let staging = self.storage.begin_staging(&self.cache_name).await?;

        let result = match self.populate(&staging).await {
            Ok(count) => self
                .storage
                .commit_staging(&staging)
                .await
                .map(|()| count)
                .map_err(CoreError::from),
            Err(e) => Err(e),
        };

        if result.is_err()
            && let Err(e) = self.storage.discard_staging(&staging).await
        {
            warn!("Failed to discard staging area {}: {}", staging, e);
        }

        result
    }

    async fn populate(&self, staging: &StagingId) -> Result<usize, CoreError> {
        let requests = self
            .config
            .precache
            .iter()
            .map(|path| {
                self.scope
                    .join(path)
                    .map(FetchRequest::get)
                    .map_err(|e| CoreError::InvalidConfig(format!("{}: {}", path, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = self.fetcher.fetch(request, FetchMode::Default).await?;
            if !response.status.is_success() {
                return Err(CoreError::PrecacheStatus {
                    url: request.url.to_string(),
                    status: response.status.as_u16(),
                });
            }
            Ok::<_, CoreError>((CacheKey::get(request.url.as_str()), response))
        }))
        .await?;

        for (key, response) in &responses {
            self.storage
                .put_staged(staging, key, &to_stored(response))
                .await?;
        }

        Ok(responses.len())
    }

    /// Purge every bucket but our own
    ///
    /// Returns the names of the deleted buckets. Failure to delete a single
    /// bucket is logged and does not stop the activation.
    pub async fn activate(&mut self) -> Result<Vec<String>, CoreError> {
        self.apply(LifecycleEvent::Activate)?;
        info!("Activating controller {} ({})", self.id, self.cache_name);

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to list buckets during activation: {}", e);
                Vec::new()
            }
        };

        let mut deleted = Vec::new();
        for name in names.into_iter().filter(|n| *n != self.cache_name) {
            match self.storage.delete(&name).await {
                Ok(true) => {
                    debug!("Deleted stale bucket {}", name);
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to delete stale bucket {}: {}", name, e),
            }
        }

        if let Err(e) = self.storage.open(&self.cache_name).await {
            warn!("Failed to open bucket {}: {}", self.cache_name, e);
        }

        self.apply(LifecycleEvent::ActivateSucceeded)?;
        info!(
            "Activated {} ({} stale buckets removed)",
            self.cache_name,
            deleted.len()
        );
        Ok(deleted)
    }

    /// Mark a controller that will never become active
    pub fn mark_redundant(&mut self) {
        if let Err(e) = self.apply(LifecycleEvent::Supersede) {
            debug!("Ignoring supersede of {}: {}", self.id, e);
        }
    }

    /// Handle a message from a client; true if it asks to skip waiting
    pub fn on_message(&self, message: &ControllerMessage) -> bool {
        match message {
            ControllerMessage::SkipWaiting => self.state == ControllerState::Installed,
            ControllerMessage::Unknown => {
                debug!("Ignoring unknown message for controller {}", self.id);
                false
            }
        }
    }

    // ==================== Fetch ====================

    /// Route a request through this controller
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, CoreError> {
        if self.state != ControllerState::Activated {
            return Err(CoreError::NotActive(self.state));
        }

        let strategy = self.router.classify(&request.url);
        debug!("{} {} -> {}", request.method, request.url, strategy.as_str());

        let result = match strategy {
            Strategy::Passthrough => Ok(FetchOutcome::Passthrough),
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirstSelective => self.cache_first_selective(request).await,
        };

        let outcome = match &result {
            Ok(outcome) => outcome.source(),
            Err(_) => "error",
        };
        metrics::counter!(
            "pwa_cache_fetch_total",
            "strategy" => strategy.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        result
    }

    /// Cache, then network; successful responses are written back
    async fn cache_first(&self, request: &FetchRequest) -> Result<FetchOutcome, CoreError> {
        let key = cache_key(request);

        if let Some(key) = &key
            && let Some(hit) = self.lookup(key, &request.url).await
        {
            return Ok(FetchOutcome::Cache(hit));
        }

        let response = self.fetcher.fetch(request, FetchMode::Default).await?;

        if response.status == StatusCode::OK
            && let Some(key) = &key
        {
            self.store(key, &response).await;
        }

        Ok(FetchOutcome::Network(response))
    }

    /// Network without transport caching; the bucket only on failure
    async fn network_first(&self, request: &FetchRequest) -> Result<FetchOutcome, CoreError> {
        match self.fetcher.fetch(request, FetchMode::NoCache).await {
            Ok(mut response) => {
                apply_no_cache_headers(&mut response.headers);
                Ok(FetchOutcome::Network(response))
            }
            Err(e) => {
                warn!("Network failed for {}, trying cache: {}", request.url, e);

                if let Some(key) = cache_key(request)
                    && let Some(hit) = self.lookup(&key, &request.url).await
                {
                    return Ok(FetchOutcome::Cache(hit));
                }

                Err(CoreError::Proxy(e))
            }
        }
    }

    /// Cache, then network; only allow-listed same-origin 200s are stored
    async fn cache_first_selective(
        &self,
        request: &FetchRequest,
    ) -> Result<FetchOutcome, CoreError> {
        let key = cache_key(request);

        if let Some(key) = &key
            && let Some(hit) = self.lookup(key, &request.url).await
        {
            return Ok(FetchOutcome::Cache(hit));
        }

        let response = self.fetcher.fetch(request, FetchMode::Default).await?;

        if response.status == StatusCode::OK
            && response.response_type == ResponseType::Basic
            && self.router.is_allowlisted(&request.url)
            && let Some(key) = &key
        {
            self.store(key, &response).await;
        }

        Ok(FetchOutcome::Network(response))
    }

    /// Read from our bucket; storage errors count as a miss
    async fn lookup(&self, key: &CacheKey, url: &Url) -> Option<FetchResponse> {
        match self.storage.match_entry(&self.cache_name, key).await {
            Ok(Some(stored)) => match from_stored(stored, url) {
                Ok(response) => {
                    debug!("Cache hit: {}", key);
                    Some(response)
                }
                Err(e) => {
                    warn!("Unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => {
                debug!("Cache miss: {}", key);
                None
            }
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Write to our bucket; failures are logged and the response still served
    ///
    /// Once a newer version purged our bucket, late writes are dropped.
    async fn store(&self, key: &CacheKey, response: &FetchResponse) {
        match self
            .storage
            .put(&self.cache_name, key, &to_stored(response))
            .await
        {
            Ok(()) => {}
            Err(StorageError::BucketNotFound(_)) => {
                debug!("Bucket {} is gone, not caching {}", self.cache_name, key);
            }
            Err(e) => warn!("Failed to cache {}: {}", key, e),
        }
    }
}

/// Only GET requests have a cache identity
fn cache_key(request: &FetchRequest) -> Option<CacheKey> {
    (request.method == Method::GET).then(|| CacheKey::get(request.url.as_str()))
}

fn apply_no_cache_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

fn to_stored(response: &FetchResponse) -> StoredResponse {
    let headers = response
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    StoredResponse {
        url: response.url.to_string(),
        status: response.status.as_u16(),
        headers,
        response_type: response.response_type.as_str().to_string(),
        stored_at: Utc::now(),
        body: response.body.clone(),
    }
}

fn from_stored(stored: StoredResponse, request_url: &Url) -> Result<FetchResponse, StorageError> {
    let status = StatusCode::from_u16(stored.status)
        .map_err(|_| StorageError::Backend(format!("invalid status {}", stored.status)))?;

    let mut headers = HeaderMap::with_capacity(stored.headers.len());
    for (name, value) in &stored.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }

    let url = Url::parse(&stored.url).unwrap_or_else(|_| request_url.clone());
    let response_type = stored.response_type.parse().unwrap_or(ResponseType::Basic);

    Ok(FetchResponse {
        status,
        headers,
        body: stored.body,
        url,
        response_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFetcher, SCOPE, url};
    use bytes::Bytes;
    use pwa_storage::{LocalStorage, MemoryStorage};

    fn controller(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<MockFetcher>,
        version: &str,
    ) -> CacheController {
        let config = ControllerConfig {
            version: version.to_string(),
            ..Default::default()
        };
        CacheController::new(url(SCOPE), config, storage, fetcher)
    }

    async fn active_controller(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<MockFetcher>,
    ) -> CacheController {
        fetcher.serve_shell();
        let mut controller = controller(storage, fetcher, "v1");
        controller.install().await.unwrap();
        controller.activate().await.unwrap();
        controller
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn CacheStorage> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve_shell();

        let mut controller = controller(storage.clone(), fetcher, "v1");
        controller.install().await.unwrap();

        assert_eq!(controller.state(), ControllerState::Installed);
        assert_eq!(storage.keys().await.unwrap(), vec!["san-camilo-v1"]);
        assert_eq!(storage.entry_count("san-camilo-v1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_install_fails_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn CacheStorage> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve_shell();
        fetcher.fail(&format!("{}logo-hospice.png", SCOPE));

        let mut controller = controller(storage.clone(), fetcher, "v2");
        let result = controller.install().await;

        assert!(matches!(result, Err(CoreError::InstallFailed { .. })));
        assert_eq!(controller.state(), ControllerState::Redundant);
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(controller.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_install_fails_on_error_status() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve_shell();
        fetcher.respond(&format!("{}manifest.json", SCOPE), 404, "missing");

        let mut controller = controller(storage.clone(), fetcher, "v2");
        let err = controller.install().await.unwrap_err();

        assert!(err.to_string().contains("404"));
        assert!(!storage.has("san-camilo-v2").await.unwrap());
    }

    #[tokio::test]
    async fn test_activate_deletes_other_buckets() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        storage.open("san-camilo-v1").await.unwrap();
        storage.open("unrelated-cache").await.unwrap();

        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve_shell();
        let mut controller = controller(storage.clone(), fetcher, "v2");
        controller.install().await.unwrap();
        let mut deleted = controller.activate().await.unwrap();
        deleted.sort();

        assert_eq!(deleted, vec!["san-camilo-v1", "unrelated-cache"]);
        assert_eq!(storage.keys().await.unwrap(), vec!["san-camilo-v2"]);
        assert_eq!(controller.state(), ControllerState::Activated);
    }

    #[tokio::test]
    async fn test_fetch_requires_active() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = controller(storage, fetcher, "v1");

        let request = FetchRequest::get(url("https://hospice.example/"));
        assert!(matches!(
            controller.handle_fetch(&request).await,
            Err(CoreError::NotActive(ControllerState::Parsed))
        ));
    }

    #[tokio::test]
    async fn test_object_storage_not_intercepted() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage.clone(), fetcher.clone()).await;
        let before = storage.entry_count("san-camilo-v1").await.unwrap();

        let photo = "https://firebasestorage.googleapis.com/v0/b/app/o/guest.jpg";
        let outcome = controller
            .handle_fetch(&FetchRequest::get(url(photo)))
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::Passthrough));
        assert_eq!(fetcher.calls_to(photo), 0);
        assert_eq!(storage.entry_count("san-camilo-v1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_asset_served_from_cache_on_second_request() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage.clone(), fetcher.clone()).await;

        let asset = "https://hospice.example/assets/app.abc123.js";
        fetcher.respond(asset, 200, "console.log(1)");

        let first = controller
            .handle_fetch(&FetchRequest::get(url(asset)))
            .await
            .unwrap();
        assert!(matches!(first, FetchOutcome::Network(_)));
        assert!(storage
            .match_entry("san-camilo-v1", &CacheKey::get(asset))
            .await
            .unwrap()
            .is_some());

        let second = controller
            .handle_fetch(&FetchRequest::get(url(asset)))
            .await
            .unwrap();
        let FetchOutcome::Cache(response) = second else {
            panic!("expected cache hit");
        };
        assert_eq!(response.body, Bytes::from_static(b"console.log(1)"));
        assert_eq!(fetcher.calls_to(asset), 1);
    }

    #[tokio::test]
    async fn test_superseded_controller_does_not_recreate_bucket() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let old = active_controller(storage.clone(), fetcher.clone()).await;

        let mut new = controller(storage.clone(), fetcher.clone(), "v2");
        new.install().await.unwrap();
        new.activate().await.unwrap();

        let asset = "https://hospice.example/assets/late.js";
        fetcher.respond(asset, 200, "late");
        let outcome = old
            .handle_fetch(&FetchRequest::get(url(asset)))
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::Network(_)));
        assert_eq!(storage.keys().await.unwrap(), vec!["san-camilo-v2"]);
    }

    #[tokio::test]
    async fn test_asset_error_status_not_cached() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage.clone(), fetcher.clone()).await;

        let asset = "https://hospice.example/assets/missing.js";
        fetcher.respond(asset, 404, "");

        for _ in 0..2 {
            let outcome = controller
                .handle_fetch(&FetchRequest::get(url(asset)))
                .await
                .unwrap();
            assert!(matches!(outcome, FetchOutcome::Network(ref r) if r.status == 404));
        }
        assert_eq!(fetcher.calls_to(asset), 2);
    }

    #[tokio::test]
    async fn test_asset_network_failure_propagates() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage, fetcher.clone()).await;

        let asset = "https://hospice.example/assets/offline.js";
        fetcher.fail(asset);

        assert!(matches!(
            controller.handle_fetch(&FetchRequest::get(url(asset))).await,
            Err(CoreError::Proxy(_))
        ));
    }

    #[tokio::test]
    async fn test_shell_gets_no_cache_headers() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage, fetcher.clone()).await;

        let route = "https://hospice.example/huespedes/7";
        fetcher.respond_with_header(route, "cache-control", "max-age=3600");

        let outcome = controller
            .handle_fetch(&FetchRequest::get(url(route)))
            .await
            .unwrap();
        let FetchOutcome::Network(response) = outcome else {
            panic!("expected network response");
        };

        assert_eq!(
            response.headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(response.headers.get_all(header::CACHE_CONTROL).iter().count(), 1);
        assert_eq!(response.headers[header::PRAGMA], "no-cache");
        assert_eq!(response.headers[header::EXPIRES], "0");
        assert_eq!(fetcher.last_mode(route), Some(FetchMode::NoCache));
    }

    #[tokio::test]
    async fn test_shell_falls_back_to_cache_when_offline() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage, fetcher.clone()).await;

        let shell = "https://hospice.example/index.html";
        fetcher.fail(shell);

        let outcome = controller
            .handle_fetch(&FetchRequest::get(url(shell)))
            .await
            .unwrap();
        let FetchOutcome::Cache(response) = outcome else {
            panic!("expected cache fallback");
        };
        assert_eq!(response.body, Bytes::from_static(b"<html>shell</html>"));
    }

    #[tokio::test]
    async fn test_shell_route_offline_without_cache_fails() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage, fetcher.clone()).await;

        let route = "https://hospice.example/partes/2024-05-01";
        fetcher.fail(route);

        assert!(matches!(
            controller.handle_fetch(&FetchRequest::get(url(route))).await,
            Err(CoreError::Proxy(_))
        ));
    }

    #[tokio::test]
    async fn test_shell_success_does_not_write_cache() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage.clone(), fetcher.clone()).await;

        let route = "https://hospice.example/partes";
        fetcher.respond(route, 200, "<html>partes</html>");
        controller
            .handle_fetch(&FetchRequest::get(url(route)))
            .await
            .unwrap();

        assert!(storage
            .match_entry("san-camilo-v1", &CacheKey::get(route))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_selective_only_stores_allowlisted() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage.clone(), fetcher.clone()).await;
        storage.delete("san-camilo-v1").await.unwrap();
        storage.open("san-camilo-v1").await.unwrap();

        let manifest = "https://hospice.example/manifest.json";
        let other = "https://hospice.example/robots.txt";
        fetcher.respond(other, 200, "User-agent: *");

        for target in [manifest, other] {
            controller
                .handle_fetch(&FetchRequest::get(url(target)))
                .await
                .unwrap();
        }

        assert!(storage
            .match_entry("san-camilo-v1", &CacheKey::get(manifest))
            .await
            .unwrap()
            .is_some());
        assert!(storage
            .match_entry("san-camilo-v1", &CacheKey::get(other))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_selective_skips_cross_origin() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage.clone(), fetcher.clone()).await;

        let foreign = "https://cdn.example/manifest.json";
        fetcher.respond(foreign, 200, "{}");
        controller
            .handle_fetch(&FetchRequest::get(url(foreign)))
            .await
            .unwrap();

        assert!(storage
            .match_entry("san-camilo-v1", &CacheKey::get(foreign))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_non_get_never_cached() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let controller = active_controller(storage.clone(), fetcher.clone()).await;

        let asset = "https://hospice.example/assets/upload";
        fetcher.respond(asset, 200, "ok");
        let request = FetchRequest::new(Method::POST, url(asset));

        controller.handle_fetch(&request).await.unwrap();
        controller.handle_fetch(&request).await.unwrap();

        assert_eq!(fetcher.calls_to(asset), 2);
    }

    #[tokio::test]
    async fn test_skip_waiting_only_when_installed() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve_shell();
        let mut controller = controller(storage, fetcher, "v1");

        assert!(!controller.on_message(&ControllerMessage::SkipWaiting));
        controller.install().await.unwrap();
        assert!(controller.on_message(&ControllerMessage::SkipWaiting));
        assert!(!controller.on_message(&ControllerMessage::Unknown));
    }
}
