//! Upstream origin client

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, header};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::ProxyError;
use crate::fetcher::Fetcher;
use crate::message::{FetchMode, FetchRequest, FetchResponse, ResponseType};

/// Headers that only make sense for a single hop
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Origin client configuration
#[derive(Clone, Debug)]
pub struct OriginClientConfig {
    /// Public origin the application is served under
    pub app_origin: Url,
    /// Where requests for the application origin are actually fetched from
    pub upstream_url: Url,
    /// Skip TLS certificate verification
    pub skip_tls_verify: bool,
    /// Overall request timeout; `None` uses the client default
    pub timeout: Option<Duration>,
}

/// Fetches requests from the network
///
/// Requests for the application origin are rewritten onto the upstream
/// URL (same path and query). Anything else is fetched as-is.
pub struct OriginClient {
    config: OriginClientConfig,
    client: Client,
}

impl OriginClient {
    /// Create a new origin client
    pub fn new(config: OriginClientConfig) -> Result<Self, ProxyError> {
        let mut builder = Client::builder();

        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build()?;

        info!(
            "Created origin client for {} -> {}",
            config.app_origin, config.upstream_url
        );

        Ok(Self { config, client })
    }

    /// Whether `url` belongs to the application origin
    pub fn is_app_origin(&self, url: &Url) -> bool {
        url.origin() == self.config.app_origin.origin()
    }

    /// Resolve the URL a request is actually sent to
    pub fn target_url(&self, url: &Url) -> Result<Url, ProxyError> {
        if !self.is_app_origin(url) {
            return Ok(url.clone());
        }

        let base = self.config.upstream_url.path().trim_end_matches('/');
        let mut target = self.config.upstream_url.clone();
        target.set_path(&format!("{}{}", base, url.path()));
        target.set_query(url.query());

        if target.cannot_be_a_base() {
            return Err(ProxyError::InvalidUrl(target.to_string()));
        }
        Ok(target)
    }

    /// Check if the upstream is reachable
    pub async fn ping(&self) -> Result<bool, ProxyError> {
        let response = self
            .client
            .head(self.config.upstream_url.clone())
            .send()
            .await?;
        Ok(!response.status().is_server_error())
    }
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

#[async_trait]
impl Fetcher for OriginClient {
    async fn fetch(
        &self,
        request: &FetchRequest,
        mode: FetchMode,
    ) -> Result<FetchResponse, ProxyError> {
        let target = self.target_url(&request.url)?;
        debug!("Fetching {} {} via {}", request.method, request.url, target);

        let mut headers = forwardable(&request.headers);
        if mode == FetchMode::NoCache {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let mut builder = self
            .client
            .request(request.method.clone(), target)
            .headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let response_headers = forwardable(response.headers());
        let body = response.bytes().await?;

        let response_type = if self.is_app_origin(&request.url) {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };

        Ok(FetchResponse {
            status,
            headers: response_headers,
            body,
            url: request.url.clone(),
            response_type,
        })
    }
}
