//! Request classification
//!
//! Decides which caching strategy handles a request, from its URL alone.
//! Rules are evaluated in a fixed priority order; the first match wins.

use serde::Serialize;
use url::Url;

use crate::config::ControllerConfig;

/// Caching strategy for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Not intercepted; goes straight to the network
    Passthrough,
    /// Fingerprinted build assets: cache, then network with write-back
    CacheFirst,
    /// Application shell: network without transport caching, cache on failure
    NetworkFirst,
    /// Everything else: cache, then network; only allow-listed files are stored
    CacheFirstSelective,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Passthrough => "passthrough",
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirstSelective => "cache-first-selective",
        }
    }
}

/// URL-pattern router for one controller version
#[derive(Debug, Clone)]
pub struct RequestRouter {
    origin: url::Origin,
    asset_marker: String,
    shell_documents: Vec<String>,
    shell_routes: Vec<String>,
    passthrough_hosts: Vec<String>,
    static_allowlist: Vec<String>,
}

impl RequestRouter {
    /// Create a router for requests made under `scope`
    pub fn new(scope: &Url, config: &ControllerConfig) -> Self {
        Self {
            origin: scope.origin(),
            asset_marker: config.asset_marker.clone(),
            shell_documents: config.shell_documents.clone(),
            shell_routes: config.shell_routes.clone(),
            passthrough_hosts: config
                .passthrough_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            static_allowlist: config.static_allowlist.clone(),
        }
    }

    /// Pick the strategy for `url`
    pub fn classify(&self, url: &Url) -> Strategy {
        if self.is_passthrough_host(url) {
            return Strategy::Passthrough;
        }

        if url.path().contains(&self.asset_marker) {
            return Strategy::CacheFirst;
        }

        if self.is_shell(url) {
            return Strategy::NetworkFirst;
        }

        Strategy::CacheFirstSelective
    }

    /// Whether the catch-all strategy may persist a response for `url`
    pub fn is_allowlisted(&self, url: &Url) -> bool {
        let path = url.path();
        self.static_allowlist
            .iter()
            .any(|entry| path.ends_with(entry.as_str()))
    }

    fn is_passthrough_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        self.passthrough_hosts.iter().any(|h| {
            host == *h
                || host
                    .strip_suffix(h.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    fn is_shell(&self, url: &Url) -> bool {
        if url.origin() != self.origin {
            return false;
        }

        let path = url.path();
        self.shell_documents.iter().any(|doc| path == doc)
            || self
                .shell_routes
                .iter()
                .any(|route| path.starts_with(route.as_str()))
    }
}
