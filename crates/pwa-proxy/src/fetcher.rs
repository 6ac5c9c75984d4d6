//! Network fetcher trait

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::message::{FetchMode, FetchRequest, FetchResponse};

/// Anything that can take a request to the network
///
/// HTTP error statuses are successful fetches; only transport failures
/// (unreachable host, reset connection, ...) are reported as errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &FetchRequest,
        mode: FetchMode,
    ) -> Result<FetchResponse, ProxyError>;
}
