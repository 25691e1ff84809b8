//! Route table and registration.
//!
//! # Responsibilities
//! - Store routes in registration order
//! - Compose mounted sub-routers into flat routes
//! - Select the matching route (or fallback) for a request
//! - Answer lookahead queries without executing handlers
//!
//! # Design Decisions
//! - Immutable after construction; shared across requests behind `Arc`
//! - Configuration mistakes surface at registration as `RouteError`
//! - First match wins (registration order)
//! - Explicit `Selection::NotFound` rather than a silent default

use std::future::Future;
use std::sync::Arc;

use http::Method;
use serde_json::Value;
use thiserror::Error;

use crate::cache::{create_custom_cache_key, CacheDirective, CacheKeyBuilder};
use crate::client_cache::ClientCache;
use crate::edge::{EdgeCompiler, EdgeConfig};
use crate::handlers::spec::{
    BoxedErrorHandler, HandlerContext, HandlerFuture, HandlerKind, HandlerResult, HandlerSpec,
};
use crate::handlers::{HandlerError, TemplateError, Upstream};
use crate::navigation::{LifecycleEvent, LifecyclePhase};
use crate::routing::environment::Environment;
use crate::routing::matcher::{PatternError, PatternMatch, RoutePattern};
use crate::routing::request::Request;

/// Path registered by `app_shell`.
pub const APP_SHELL_PATH: &str = "/.app-shell";

pub type LifecycleListener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Registration errors.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("route {pattern}: {source}")]
    Template {
        pattern: String,
        #[source]
        source: TemplateError,
    },

    #[error("mount prefix must start with '/': {0}")]
    InvalidPrefix(String),
}

/// A registered route.
#[derive(Clone)]
pub struct Route {
    pub(crate) method: Method,
    pub(crate) pattern: RoutePattern,
    pub(crate) handlers: Vec<HandlerSpec>,
    pub(crate) error_handler: Option<BoxedErrorHandler>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.source())
            .field("handlers", &self.handlers)
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl Route {
    fn new(method: Method, source: &str, handlers: Vec<HandlerSpec>) -> Result<Self, RouteError> {
        let pattern = RoutePattern::parse(source)?;
        let handlers = bind_all(&pattern, handlers)?;
        Ok(Self {
            method,
            pattern,
            handlers,
            error_handler: None,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn handlers(&self) -> &[HandlerSpec] {
        &self.handlers
    }
}

fn bind_all(pattern: &RoutePattern, handlers: Vec<HandlerSpec>) -> Result<Vec<HandlerSpec>, RouteError> {
    handlers
        .into_iter()
        .map(|h| {
            h.bind(pattern.param_names()).map_err(|source| RouteError::Template {
                pattern: pattern.source().to_string(),
                source,
            })
        })
        .collect()
}

/// Outcome of MATCH.
pub enum Selection<'a> {
    Route(&'a Route, PatternMatch),
    Fallback(&'a [HandlerSpec]),
    NotFound,
}

impl<'a> Selection<'a> {
    /// The handler chain that would run. Empty for `NotFound`.
    pub fn handlers(&self) -> &'a [HandlerSpec] {
        match self {
            Selection::Route(route, _) => &route.handlers,
            Selection::Fallback(handlers) => *handlers,
            Selection::NotFound => &[],
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Selection::Route(route, _) => route.pattern.source(),
            Selection::Fallback(_) => "__fallback__",
            Selection::NotFound => "__not_found__",
        }
    }

    /// Route-level error handler, if the route came from a mounted router that set one.
    pub(crate) fn error_handler(&self) -> Option<&'a BoxedErrorHandler> {
        match self {
            Selection::Route(route, _) => route.error_handler.as_ref(),
            _ => None,
        }
    }
}

/// The route table.
#[derive(Clone, Default)]
pub struct Router {
    pub(crate) routes: Vec<Route>,
    pub(crate) fallback: Option<Vec<HandlerSpec>>,
    pub(crate) error_handler: Option<BoxedErrorHandler>,
    pub(crate) environment: Environment,
    pub(crate) upstream: Option<Arc<dyn Upstream>>,
    pub(crate) client_cache: Option<Arc<dyn ClientCache>>,
    listeners: Vec<(LifecyclePhase, LifecycleListener)>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("fallback", &self.fallback)
            .field("environment", &self.environment)
            .field("has_upstream", &self.upstream.is_some())
            .field("has_client_cache", &self.client_cache.is_some())
            .finish()
    }
}

impl Router {
    /// Empty router in the environment given by `EDGE_ROUTER_RUNTIME`.
    pub fn new() -> Self {
        Self {
            environment: Environment::from_env(),
            ..Default::default()
        }
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn current_environment(&self) -> Environment {
        self.environment
    }

    /// Inject the proxy capability used by `from_origin`/`proxy_upstream` at runtime.
    pub fn upstream<U: Upstream + 'static>(mut self, upstream: U) -> Self {
        self.upstream = Some(Arc::new(upstream));
        self
    }

    pub fn client_cache(mut self, cache: Arc<dyn ClientCache>) -> Self {
        self.client_cache = Some(cache);
        self
    }

    pub fn route(
        mut self,
        method: Method,
        pattern: &str,
        handlers: impl IntoIterator<Item = HandlerSpec>,
    ) -> Result<Self, RouteError> {
        let route = Route::new(method, pattern, handlers.into_iter().collect())?;
        tracing::debug!(method = %route.method, pattern, "Registered route");
        self.routes.push(route);
        Ok(self)
    }

    pub fn get(self, pattern: &str, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.route(Method::GET, pattern, handlers)
    }

    pub fn post(self, pattern: &str, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.route(Method::POST, pattern, handlers)
    }

    pub fn put(self, pattern: &str, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.route(Method::PUT, pattern, handlers)
    }

    pub fn patch(self, pattern: &str, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.route(Method::PATCH, pattern, handlers)
    }

    pub fn delete(self, pattern: &str, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.route(Method::DELETE, pattern, handlers)
    }

    pub fn options(self, pattern: &str, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.route(Method::OPTIONS, pattern, handlers)
    }

    pub fn head(self, pattern: &str, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.route(Method::HEAD, pattern, handlers)
    }

    /// Mount every route of `sub` under `prefix`.
    ///
    /// Patterns are joined at registration so params from the prefix and the
    /// sub-pattern merge. A sub pattern of `/` maps to the prefix itself. The
    /// sub-router's error handler applies to the mounted routes; its fallback
    /// is not carried over.
    pub fn mount(mut self, prefix: &str, sub: Router) -> Result<Self, RouteError> {
        if !prefix.starts_with('/') {
            return Err(RouteError::InvalidPrefix(prefix.to_string()));
        }
        let prefix = prefix.trim_end_matches('/');

        if sub.fallback.is_some() {
            tracing::warn!(prefix, "Fallback of mounted router is ignored");
        }

        for route in sub.routes {
            let joined = match route.pattern.source() {
                "/" if prefix.is_empty() => "/".to_string(),
                "/" => prefix.to_string(),
                source => format!("{}{}", prefix, source),
            };
            let mut mounted = Route::new(route.method, &joined, route.handlers)?;
            mounted.error_handler = route.error_handler.or_else(|| sub.error_handler.clone());
            tracing::debug!(method = %mounted.method, pattern = %joined, "Mounted route");
            self.routes.push(mounted);
        }
        Ok(self)
    }

    /// Chain to run when no route matches.
    pub fn fallback(mut self, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        let handlers = handlers
            .into_iter()
            .map(|h| {
                h.bind(&[]).map_err(|source| RouteError::Template {
                    pattern: "__fallback__".to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.fallback = Some(handlers);
        Ok(self)
    }

    /// Handler for errors raised by any handler of a run.
    pub fn error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HandlerError, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.error_handler = Some(Arc::new(move |e: HandlerError, cx: HandlerContext| -> HandlerFuture {
            Box::pin(f(e, cx))
        }));
        self
    }

    /// Register the app shell route, `GET /.app-shell`.
    pub fn app_shell(self, handlers: impl IntoIterator<Item = HandlerSpec>) -> Result<Self, RouteError> {
        self.get(APP_SHELL_PATH, handlers)
    }

    pub fn is_app_shell_configured(&self) -> bool {
        self.routes
            .iter()
            .any(|r| r.method == Method::GET && r.pattern.source() == APP_SHELL_PATH)
    }

    /// Register a navigation lifecycle listener.
    pub fn on<F>(mut self, phase: LifecyclePhase, listener: F) -> Self
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners.push((phase, Arc::new(listener)));
        self
    }

    pub(crate) fn emit(&self, event: &LifecycleEvent) {
        for (phase, listener) in &self.listeners {
            if *phase == event.phase {
                listener(event);
            }
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn fallback_handlers(&self) -> Option<&[HandlerSpec]> {
        self.fallback.as_deref()
    }

    /// First route matching method and path.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<(&Route, PatternMatch)> {
        self.routes
            .iter()
            .filter(|r| r.method == *method)
            .find_map(|r| r.pattern.matches(path).map(|m| (r, m)))
    }

    /// MATCH for a request, falling back to the fallback chain.
    pub fn select(&self, request: &Request) -> Selection<'_> {
        match self.match_route(&request.method, &request.path) {
            Some((route, m)) => Selection::Route(route, m),
            None => match &self.fallback {
                Some(handlers) => Selection::Fallback(handlers),
                None => Selection::NotFound,
            },
        }
    }

    /// The matched chain carries `cache(client: true)`.
    pub fn will_cache_on_client(&self, request: &Request) -> bool {
        self.select(request)
            .handlers()
            .iter()
            .filter_map(HandlerSpec::cache_directive)
            .any(CacheDirective::caches_on_client)
    }

    /// The matched chain proxies to an origin or the upstream site on the server.
    pub fn will_fetch_from_upstream(&self, request: &Request) -> bool {
        self.select(request).handlers().iter().any(is_upstream)
    }

    /// The client cannot render `path` itself: its chain goes upstream and
    /// has no handler eligible on the client.
    pub fn will_navigate_to_upstream(&self, path: &str) -> bool {
        let selection = self.select(&Request::get(path));
        let handlers = selection.handlers();
        handlers.iter().any(is_upstream)
            && !handlers.iter().any(|h| {
                !matches!(h.kind, HandlerKind::Cache(_)) && h.run_on.allows(Environment::Client)
            })
    }

    pub fn create_custom_cache_key(&self) -> CacheKeyBuilder {
        create_custom_cache_key()
    }

    /// Forward client cache options verbatim. Returns false without a client cache.
    pub fn configure_client_cache(&self, options: &Value) -> bool {
        match &self.client_cache {
            Some(cache) => {
                cache.configure_cache(options);
                true
            }
            None => {
                tracing::debug!("No client cache configured");
                false
            }
        }
    }

    pub fn create_edge_configuration(&self) -> EdgeConfig {
        EdgeCompiler::new(self).compile()
    }
}

fn is_upstream(spec: &HandlerSpec) -> bool {
    matches!(spec.kind, HandlerKind::FromOrigin { .. } | HandlerKind::ProxyUpstream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{cache, from_client_state, from_origin, from_server, proxy_upstream, redirect_to};
    use serde_json::json;

    fn data() -> HandlerSpec {
        from_server(|_| async { Ok(json!({})) })
    }

    #[test]
    fn test_first_match_wins() {
        let router = Router::new()
            .get("/p/:id", [data()])
            .unwrap()
            .get("/p/special", [data()])
            .unwrap();
        let (route, m) = router.match_route(&Method::GET, "/p/special").unwrap();
        assert_eq!(route.pattern().source(), "/p/:id");
        assert_eq!(m.params.get("id"), Some("special"));
    }

    #[test]
    fn test_method_must_match() {
        let router = Router::new().post("/cart", [data()]).unwrap();
        assert!(router.match_route(&Method::GET, "/cart").is_none());
        assert!(router.match_route(&Method::POST, "/cart").is_some());
    }

    #[test]
    fn test_registration_errors() {
        assert!(matches!(
            Router::new().get("no-slash", [data()]),
            Err(RouteError::Pattern(_))
        ));
        assert!(matches!(
            Router::new().get("/a/:id", [redirect_to("/b/{nope}")]),
            Err(RouteError::Template { .. })
        ));
        assert!(matches!(
            Router::new().mount("api", Router::new()),
            Err(RouteError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_mount_joins_patterns() {
        let products = Router::new()
            .get("/", [data()])
            .unwrap()
            .get("/:id", [data()])
            .unwrap();
        let router = Router::new().mount("/products/", products).unwrap();

        let sources: Vec<_> = router.routes().iter().map(|r| r.pattern().source()).collect();
        assert_eq!(sources, vec!["/products", "/products/:id"]);
    }

    #[test]
    fn test_app_shell() {
        let router = Router::new();
        assert!(!router.is_app_shell_configured());
        let router = router.app_shell([from_client_state(json!({"page": "Shell"}))]).unwrap();
        assert!(router.is_app_shell_configured());
    }

    #[test]
    fn test_lookahead() {
        let router = Router::new()
            .get("/c/:id", [cache(CacheDirective::client(true)), data()])
            .unwrap()
            .get("/legacy/*path", [from_origin("legacy")])
            .unwrap()
            .get("/proxied", [proxy_upstream(), data()])
            .unwrap();

        assert!(router.will_cache_on_client(&Request::get("/c/1")));
        assert!(router.will_cache_on_client(&Request::get("/c/1.json")));
        assert!(!router.will_cache_on_client(&Request::get("/legacy/x")));

        assert!(router.will_fetch_from_upstream(&Request::get("/legacy/a/b")));
        assert!(router.will_fetch_from_upstream(&Request::get("/proxied")));
        assert!(!router.will_fetch_from_upstream(&Request::get("/c/1")));

        assert!(router.will_navigate_to_upstream("/legacy/a/b"));
        assert!(!router.will_navigate_to_upstream("/proxied"));
        assert!(!router.will_navigate_to_upstream("/nowhere"));
    }
}
