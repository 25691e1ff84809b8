//! Client cache bridge.
//!
//! # Data Flow
//! ```text
//! prefetch / prefetch_json_for / cache
//!     → Router::will_cache_on_client (lookahead, no handlers run)
//!     → ClientCache collaborator (service worker messaging, outside this crate)
//! ```
//!
//! # Design Decisions
//! - The core only issues directives; cache storage belongs to the collaborator
//! - Paths whose route has no `cache(client: true)` are never forwarded

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::routing::request::Request;
use crate::routing::router::Router;

/// Service worker cache collaborator.
pub trait ClientCache: Send + Sync {
    /// Runtime caching options, forwarded verbatim.
    fn configure_cache(&self, options: &Value);

    /// Cache `path`. Without `data` the collaborator fetches it itself.
    fn cache(&self, path: &str, data: Option<&Value>);

    fn abort_prefetches(&self);

    fn resume_prefetches(&self);
}

/// Lookahead-gated front for a [`ClientCache`].
#[derive(Clone)]
pub struct ServiceWorkerBridge {
    router: Arc<Router>,
    cache: Arc<dyn ClientCache>,
}

impl ServiceWorkerBridge {
    pub fn new(router: Arc<Router>, cache: Arc<dyn ClientCache>) -> Self {
        Self { router, cache }
    }

    /// Forward `path` if its route caches on the client. Returns whether it was forwarded.
    pub fn cache(&self, path: &str, data: Option<&Value>) -> bool {
        let request = Request::get(&route_path(path));
        if !self.router.will_cache_on_client(&request) {
            tracing::debug!(path, "Route does not cache on client, skipping");
            return false;
        }
        self.cache.cache(path, data);
        true
    }

    /// Prefetch the JSON variant of a page path, and the page itself when `include_ssr`.
    pub fn prefetch_json_for(&self, path: &str, include_ssr: bool) {
        if path.is_empty() {
            return;
        }
        self.cache(&json_path(path), None);
        if include_ssr {
            self.cache(path, None);
        }
    }

    /// Prefetch both the page and its JSON.
    pub fn prefetch(&self, path: &str) {
        self.cache(path, None);
        self.prefetch_json_for(path, false);
    }

    pub fn abort_prefetches(&self) {
        self.cache.abort_prefetches();
    }

    pub fn resume_prefetches(&self) {
        self.cache.resume_prefetches();
    }

    pub fn configure_cache(&self, options: &Value) {
        self.cache.configure_cache(options);
    }
}

/// `pathname.json + search`. Absolute URLs keep their origin.
pub fn json_path(path: &str) -> String {
    if path.starts_with("http") {
        if let Ok(url) = url::Url::parse(path) {
            let search = url.query().map(|q| format!("?{}", q)).unwrap_or_default();
            return format!("{}{}.json{}", url.origin().ascii_serialization(), url.path(), search);
        }
    }
    match path.split_once('?') {
        Some((pathname, query)) => format!("{}.json?{}", pathname, query),
        None => format!("{}.json", path),
    }
}

/// Path and query of a possibly absolute URL.
fn route_path(path: &str) -> String {
    match url::Url::parse(path) {
        Ok(url) if url.has_host() => match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        },
        _ => path.to_string(),
    }
}

/// A call received by [`RecordingClientCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCacheCall {
    Configure(Value),
    Cache { path: String, data: Option<Value> },
    AbortPrefetches,
    ResumePrefetches,
}

/// In-memory [`ClientCache`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingClientCache {
    calls: Mutex<Vec<ClientCacheCall>>,
}

impl RecordingClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: ClientCacheCall) {
        self.calls.lock().expect("client cache mutex poisoned").push(call);
    }

    pub fn calls(&self) -> Vec<ClientCacheCall> {
        self.calls.lock().expect("client cache mutex poisoned").clone()
    }

    /// Paths passed to `cache`, in order.
    pub fn cached_paths(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClientCacheCall::Cache { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl ClientCache for RecordingClientCache {
    fn configure_cache(&self, options: &Value) {
        self.record(ClientCacheCall::Configure(options.clone()));
    }

    fn cache(&self, path: &str, data: Option<&Value>) {
        self.record(ClientCacheCall::Cache {
            path: path.to_string(),
            data: data.cloned(),
        });
    }

    fn abort_prefetches(&self) {
        self.record(ClientCacheCall::AbortPrefetches);
    }

    fn resume_prefetches(&self) {
        self.record(ClientCacheCall::ResumePrefetches);
    }
}
