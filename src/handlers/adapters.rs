//! Adapter constructors.
//!
//! Each constructor wraps a function, static value or marker into a
//! [`HandlerSpec`] with the default environment gates of its kind.

use std::future::Future;

use http::StatusCode;
use serde_json::Value;

use crate::cache::CacheDirective;
use crate::handlers::spec::{boxed, HandlerContext, HandlerKind, HandlerResult, HandlerSpec, RunOn};
use crate::handlers::template::PathTemplate;

/// Backend used by `from_origin_default()`.
pub const DEFAULT_ORIGIN_BACKEND: &str = "origin";

/// Client-side view state. Skipped for data-only requests.
pub fn from_client<F, Fut>(f: F) -> HandlerSpec
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerSpec::new(HandlerKind::FromClient, RunOn::CLIENT, Some(boxed(f)))
}

/// Static client-side view state.
pub fn from_client_state(value: Value) -> HandlerSpec {
    from_client(move |_| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

/// Server data handler.
pub fn from_server<F, Fut>(f: F) -> HandlerSpec
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerSpec::new(HandlerKind::FromServer { module: None }, RunOn::BOTH, Some(boxed(f)))
}

/// Server handler referenced by module path, bound outside this process.
pub fn from_server_module(module: impl Into<String>) -> HandlerSpec {
    HandlerSpec::new(
        HandlerKind::FromServer {
            module: Some(module.into()),
        },
        RunOn::BOTH,
        None,
    )
}

/// Proxy to a named origin backend.
pub fn from_origin(backend: impl Into<String>) -> HandlerSpec {
    HandlerSpec::new(
        HandlerKind::FromOrigin {
            backend: backend.into(),
            transform_path: None,
        },
        RunOn::SERVER,
        None,
    )
}

pub fn from_origin_default() -> HandlerSpec {
    from_origin(DEFAULT_ORIGIN_BACKEND)
}

/// Proxy to the upstream site as-is.
pub fn proxy_upstream() -> HandlerSpec {
    HandlerSpec::new(HandlerKind::ProxyUpstream, RunOn::SERVER, None)
}

/// Proxy to the upstream site, transforming its result with `f`.
/// The fetched value is available as `HandlerContext::upstream`.
pub fn proxy_upstream_with<F, Fut>(f: F) -> HandlerSpec
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerSpec::new(HandlerKind::ProxyUpstream, RunOn::SERVER, Some(boxed(f)))
}

/// Attach a cache directive to the route. Never executed.
pub fn cache(directive: CacheDirective) -> HandlerSpec {
    HandlerSpec::new(HandlerKind::Cache(directive), RunOn::BOTH, None)
}

/// Redirect to `template`, substituting `{name}` placeholders. Defaults to 301.
pub fn redirect_to(template: impl Into<String>) -> HandlerSpec {
    HandlerSpec::new(
        HandlerKind::Redirect {
            template: PathTemplate::new(template),
            status: StatusCode::MOVED_PERMANENTLY,
        },
        RunOn::BOTH,
        None,
    )
}

/// Plain function handler.
pub fn handler<F, Fut>(f: F) -> HandlerSpec
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerSpec::new(HandlerKind::Raw, RunOn::BOTH, Some(boxed(f)))
}
