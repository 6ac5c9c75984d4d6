//! Application state

use pwa_core::{Registration, ReloadSignal, UpdateStatus};
use pwa_proxy::Fetcher;
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use url::Url;

/// Prometheus handle used by the metrics endpoint
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<Registration>,
    /// Network access for requests the controller does not intercept
    pub fetcher: Arc<dyn Fetcher>,
    /// Public origin that relative request targets are resolved against
    pub app_origin: Url,
    pub update_status: watch::Receiver<UpdateStatus>,
    pub visibility: Arc<Notify>,
    pub reload: Arc<ReloadSignal>,
}

impl AppState {
    pub fn new(
        registration: Arc<Registration>,
        fetcher: Arc<dyn Fetcher>,
        app_origin: Url,
        update_status: watch::Receiver<UpdateStatus>,
        visibility: Arc<Notify>,
        reload: Arc<ReloadSignal>,
    ) -> Self {
        Self {
            registration,
            fetcher,
            app_origin,
            update_status,
            visibility,
            reload,
        }
    }
}
