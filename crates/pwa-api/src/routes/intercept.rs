//! Fetch interception

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Uri},
    response::Response,
};
use pwa_core::FetchOutcome;
use pwa_proxy::{FetchMode, FetchRequest, FetchResponse};
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::state::AppState;

/// Response header naming where a response came from
pub const SOURCE_HEADER: &str = "x-pwa-cache-source";

/// Resolve the request target to an absolute URL
///
/// Absolute-form targets (forward proxy requests) are kept as-is; origin-form
/// targets always belong to the application origin, even when the path
/// starts with `//`.
fn absolute_url(app_origin: &Url, uri: &Uri) -> Result<Url, ApiError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string()).map_err(|e| {
            ApiError::BadRequest(format!("invalid request target {}: {}", uri, e))
        });
    }

    let mut url = app_origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url)
}

fn into_response(response: FetchResponse, source: &'static str) -> Result<Response, ApiError> {
    let mut builder = Response::builder().status(response.status);

    if let Some(headers) = builder.headers_mut() {
        headers.extend(response.headers);
        headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    }

    builder
        .body(Body::from(response.body))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Fallback handler: every request not claimed by another route
pub async fn intercept(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let url = absolute_url(&state.app_origin, &uri)?;
    let request = FetchRequest {
        method,
        url,
        headers,
        body,
    };

    let outcome = state.registration.handle_fetch(&request).await?;
    let source = outcome.source();
    debug!("{} {} served from {}", request.method, request.url, source);

    let response = match outcome {
        FetchOutcome::Cache(response) | FetchOutcome::Network(response) => response,
        FetchOutcome::Passthrough => state.fetcher.fetch(&request, FetchMode::Default).await?,
    };

    into_response(response, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url() {
        let origin = Url::parse("https://hospice.example").unwrap();

        let relative: Uri = "/huespedes/3?tab=1".parse().unwrap();
        assert_eq!(
            absolute_url(&origin, &relative).unwrap().as_str(),
            "https://hospice.example/huespedes/3?tab=1"
        );

        let absolute: Uri = "https://firebasestorage.googleapis.com/v0/o/a.jpg"
            .parse()
            .unwrap();
        assert_eq!(
            absolute_url(&origin, &absolute).unwrap().host_str(),
            Some("firebasestorage.googleapis.com")
        );
    }

    #[test]
    fn test_double_slash_path_stays_on_origin() {
        let origin = Url::parse("https://hospice.example").unwrap();

        let target: Uri = "//firebasestorage.googleapis.com/v0/o/a.jpg?alt=media"
            .parse()
            .unwrap();
        let url = absolute_url(&origin, &target).unwrap();

        assert_eq!(url.host_str(), Some("hospice.example"));
        assert_eq!(url.path(), "//firebasestorage.googleapis.com/v0/o/a.jpg");
        assert_eq!(url.query(), Some("alt=media"));
    }
}
