//! Per-request response sink.
//!
//! # Responsibilities
//! - Hold status, headers, cache metadata and redirect for one request
//! - Enforce the cookie policy of edge-cached routes
//!
//! # Design Decisions
//! - Cloned handles share one sink; a sink never outlives its request
//! - The lock is never held across an await point

use std::sync::{Arc, Mutex, MutexGuard};

use http::header::{HeaderName, HeaderValue, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::cache::CacheDirective;
use crate::handlers::HandlerError;

/// Cache metadata destined for the edge layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCache {
    pub browser_max_age: u64,
    pub server_max_age: u64,
}

/// Which request cookies upstream fetches may forward.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CookiePolicy {
    #[default]
    Forward,
    Suppress,
    /// Only the cookies named in the route's edge cache key.
    Only(Vec<String>),
}

impl CookiePolicy {
    pub fn allows(&self, cookie: &str) -> bool {
        match self {
            CookiePolicy::Forward => true,
            CookiePolicy::Suppress => false,
            CookiePolicy::Only(names) => names.iter().any(|n| n == cookie),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
    pub status: StatusCode,
}

/// Snapshot of the response state.
#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub cache: Option<ResponseCache>,
    pub cookies: CookiePolicy,
    pub cache_on_client: bool,
    pub redirect: Option<Redirect>,
}

/// Shared mutable response handle for a single request.
#[derive(Debug, Clone, Default)]
pub struct Response {
    inner: Arc<Mutex<ResponseParts>>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResponseParts> {
        self.inner.lock().expect("response mutex poisoned")
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.lock().status = status;
    }

    /// Set a response header.
    ///
    /// `set-cookie` on an edge-cached response is dropped with a warning.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), HandlerError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        let mut parts = self.lock();

        if name == SET_COOKIE && parts.cache.is_some() {
            tracing::warn!(header = %name, "Cannot set cookies on cached route");
            return Ok(());
        }

        parts.headers.insert(name, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn cache(&self) -> Option<ResponseCache> {
        self.lock().cache
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        self.lock().cookies.clone()
    }

    pub fn cache_on_client(&self) -> bool {
        self.lock().cache_on_client
    }

    pub fn redirect(&self, location: impl Into<String>, status: StatusCode) {
        let location = location.into();
        let mut parts = self.lock();
        parts.status = status;
        parts.redirect = Some(Redirect { location, status });
    }

    pub fn redirect_location(&self) -> Option<String> {
        self.lock().redirect.as_ref().map(|r| r.location.clone())
    }

    /// Apply a route's cache directive before its chain runs.
    pub fn apply_cache_directive(&self, directive: &CacheDirective) {
        let mut parts = self.lock();
        if directive.client == Some(true) {
            parts.cache_on_client = true;
        }
        if let Some(edge) = &directive.edge {
            parts.cache = Some(ResponseCache {
                browser_max_age: 0,
                server_max_age: edge.max_age_seconds,
            });
            parts.cookies = match edge.key.as_ref().map(|k| k.cookie_names()) {
                Some(names) if !names.is_empty() => CookiePolicy::Only(names),
                _ => CookiePolicy::Suppress,
            };
            // Drop any cookie a previous step already set.
            parts.headers.remove(SET_COOKIE);
        }
    }

    pub fn snapshot(&self) -> ResponseParts {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{create_custom_cache_key, CacheDirective};

    #[test]
    fn test_edge_cache_metadata() {
        let response = Response::new();
        response.apply_cache_directive(&CacheDirective::edge(300));
        assert_eq!(
            response.cache(),
            Some(ResponseCache {
                browser_max_age: 0,
                server_max_age: 300
            })
        );
        assert_eq!(response.cookie_policy(), CookiePolicy::Suppress);
        assert!(!response.cache_on_client());
    }

    #[test]
    fn test_key_cookies_are_whitelisted() {
        let key = create_custom_cache_key()
            .add_cookie("currency")
            .build()
            .unwrap();
        let response = Response::new();
        response.apply_cache_directive(&CacheDirective::edge(60).with_key(key));

        let policy = response.cookie_policy();
        assert!(policy.allows("currency"));
        assert!(!policy.allows("session"));
    }

    #[test]
    fn test_set_cookie_dropped_on_cached_route() {
        let response = Response::new();
        response.apply_cache_directive(&CacheDirective::edge(300));
        response.set_header("set-cookie", "foo=bar").unwrap();
        assert!(response.header("set-cookie").is_none());

        response.set_header("x-test", "1").unwrap();
        assert_eq!(response.header("x-test").as_deref(), Some("1"));
    }

    #[test]
    fn test_set_cookie_kept_without_edge_cache() {
        let response = Response::new();
        response.apply_cache_directive(&CacheDirective::client(true));
        response.set_header("set-cookie", "foo=bar").unwrap();
        assert_eq!(response.header("set-cookie").as_deref(), Some("foo=bar"));
        assert!(response.cache_on_client());
    }

    #[test]
    fn test_redirect_sets_status() {
        let response = Response::new();
        response.redirect("/bar", StatusCode::FOUND);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.redirect_location().as_deref(), Some("/bar"));
    }
}
