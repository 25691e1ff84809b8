//! Capabilities injected into the dispatcher.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::handlers::spec::HandlerFuture;
use crate::routing::request::Request;

/// A request forwarded to an upstream backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    /// Target backend, `None` for `proxy_upstream`.
    pub backend: Option<String>,
    /// Path and query to request, after any `transform_path` rewrite.
    pub path: String,
}

/// Physical proxying for `from_origin`/`proxy_upstream` outside the edge.
pub trait Upstream: Send + Sync {
    fn fetch(&self, upstream: UpstreamRequest, request: &Request) -> HandlerFuture;
}

pub type CachedFuture = Pin<Box<dyn Future<Output = Option<Value>> + Send>>;

/// Lookup of a previously cached `from_server` result.
///
/// Freshness is the implementation's concern. The dispatcher uses any non-null `Some`;
/// `None` or `Some(Value::Null)` falls through to the fetch.
pub trait CachedResponse: Send + Sync {
    fn cached_response(&self, request: &Request) -> CachedFuture;
}

impl<F, Fut> CachedResponse for F
where
    F: Fn(&Request) -> Fut + Send + Sync,
    Fut: Future<Output = Option<Value>> + Send + 'static,
{
    fn cached_response(&self, request: &Request) -> CachedFuture {
        Box::pin((self)(request))
    }
}
