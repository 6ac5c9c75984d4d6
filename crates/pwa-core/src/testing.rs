//! Test doubles shared by the unit tests of this crate

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use pwa_proxy::{FetchMode, FetchRequest, FetchResponse, Fetcher, ProxyError, ResponseType};
use std::collections::HashMap;
use url::Url;

pub const SCOPE: &str = "https://hospice.example/";

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

enum Route {
    Respond(FetchResponse),
    Fail,
}

/// Scripted network; unknown URLs fail like an unreachable host
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<(String, FetchMode)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every default precache resource
    pub fn serve_shell(&self) {
        for path in ["", "index.html"] {
            self.respond(&format!("{}{}", SCOPE, path), 200, "<html>shell</html>");
        }
        self.respond(&format!("{}manifest.json", SCOPE), 200, "{}");
        self.respond(&format!("{}logo-hospice.png", SCOPE), 200, "PNG");
    }

    pub fn respond(&self, target: &str, status: u16, body: &'static str) {
        let target = url(target);
        let response_type = if target.host_str() == Some("hospice.example") {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };
        let response =
            FetchResponse::new(StatusCode::from_u16(status).unwrap(), target.clone(), body)
                .with_type(response_type);
        self.routes
            .lock()
            .insert(target.to_string(), Route::Respond(response));
    }

    pub fn respond_with_header(&self, target: &str, name: &'static str, value: &'static str) {
        self.respond(target, 200, "<html>route</html>");
        let key = url(target).to_string();
        let mut routes = self.routes.lock();
        if let Some(Route::Respond(response)) = routes.remove(&key) {
            routes.insert(key, Route::Respond(response.with_header(name, value)));
        }
    }

    pub fn fail(&self, target: &str) {
        self.routes.lock().insert(url(target).to_string(), Route::Fail);
    }

    pub fn calls_to(&self, target: &str) -> usize {
        let key = url(target).to_string();
        self.calls.lock().iter().filter(|(u, _)| *u == key).count()
    }

    pub fn last_mode(&self, target: &str) -> Option<FetchMode> {
        let key = url(target).to_string();
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(u, _)| *u == key)
            .map(|(_, mode)| *mode)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        mode: FetchMode,
    ) -> Result<FetchResponse, ProxyError> {
        let key = request.url.to_string();
        self.calls.lock().push((key.clone(), mode));

        match self.routes.lock().get(&key) {
            Some(Route::Respond(response)) => Ok(response.clone()),
            Some(Route::Fail) | None => Err(ProxyError::Unreachable(key)),
        }
    }
}
