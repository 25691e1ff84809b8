//! Inbound request model.
//!
//! # Responsibilities
//! - Split a path-and-query into pathname, search and parsed query
//! - Carry params and format once the router has matched
//! - Decide whether the request is a data-only fetch
//! - Strip cookies an edge-cached route must not forward upstream

use std::collections::BTreeMap;

use http::header::{HeaderValue, COOKIE};
use http::{HeaderMap, Method};
use serde_json::{json, Map, Value};

use crate::navigation::Location;
use crate::routing::matcher::Params;
use crate::routing::response::CookiePolicy;

/// An HTTP-like request entering the dispatcher.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    /// Raw query string including the leading `?`, or empty.
    pub search: String,
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub hostname: String,
    pub port: String,
    pub protocol: String,
    /// Set when the client asks for server-side rendering of a data route.
    pub ssr: bool,
    /// Path params captured by the matched route.
    pub params: Params,
    /// Data format taken from the path suffix or a `:format` param.
    pub format: Option<String>,
}

impl Request {
    /// Build a request from a method and a path with optional query string.
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, search) = split_uri(uri);
        let query = parse_query(&search);
        Self {
            method,
            path,
            search,
            query,
            headers: HeaderMap::new(),
            hostname: "localhost".to_string(),
            port: String::new(),
            protocol: "http".to_string(),
            ssr: false,
            params: Params::new(),
            format: None,
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn from_location(location: &Location) -> Self {
        Self::get(&format!("{}{}", location.pathname, location.search))
    }

    pub fn with_ssr(mut self, ssr: bool) -> Self {
        self.ssr = ssr;
        self
    }

    pub fn with_host(mut self, hostname: &str, port: &str, protocol: &str) -> Self {
        self.hostname = hostname.to_string();
        self.port = port.to_string();
        self.protocol = protocol.to_string();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Path followed by the search string.
    pub fn path_and_query(&self) -> String {
        format!("{}{}", self.path, self.search)
    }

    /// True for `.json`/`.amp` requests without the SSR flag.
    pub fn is_data_request(&self) -> bool {
        matches!(self.format.as_deref(), Some("json") | Some("amp")) && !self.ssr
    }

    /// The location object seeded into client state.
    pub fn location_json(&self) -> Value {
        json!({
            "pathname": self.path,
            "search": self.search,
            "hostname": self.hostname,
            "port": self.port,
            "protocol": self.protocol,
        })
    }

    /// Params handed to handlers: query, then path params, then format.
    pub fn handler_params(&self) -> Params {
        let mut params = Params::new();
        for (k, v) in &self.query {
            params.insert(k.clone(), Some(v.clone()));
        }
        params.extend(&self.params);
        if let Some(format) = &self.format {
            params.insert("format", Some(format.clone()));
        }
        params
    }

    /// Query as a JSON object.
    pub fn query_json(&self) -> Map<String, Value> {
        self.query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }

    /// Copy of the request whose `cookie` header keeps only what `policy` allows.
    pub fn forwarded(&self, policy: &CookiePolicy) -> Request {
        let mut request = self.clone();
        match policy {
            CookiePolicy::Forward => {}
            CookiePolicy::Suppress => {
                request.headers.remove(COOKIE);
            }
            CookiePolicy::Only(_) => {
                let kept: Vec<&str> = self
                    .headers
                    .get_all(COOKIE)
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .flat_map(|v| v.split(';'))
                    .map(str::trim)
                    .filter(|pair| {
                        pair.split_once('=')
                            .is_some_and(|(name, _)| policy.allows(name.trim()))
                    })
                    .collect();

                request.headers.remove(COOKIE);
                if !kept.is_empty() {
                    match HeaderValue::from_str(&kept.join("; ")) {
                        Ok(value) => {
                            request.headers.insert(COOKIE, value);
                        }
                        Err(e) => tracing::warn!(error = %e, "Dropping unforwardable cookie header"),
                    }
                }
            }
        }
        request
    }
}

fn split_uri(uri: &str) -> (String, String) {
    match uri.split_once('?') {
        Some((path, query)) if !query.is_empty() => (normalize_path(path), format!("?{}", query)),
        Some((path, _)) => (normalize_path(path), String::new()),
        None => (normalize_path(uri), String::new()),
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn parse_query(search: &str) -> BTreeMap<String, String> {
    let raw = search.strip_prefix('?').unwrap_or(search);
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_query() {
        let req = Request::get("/foo?x=1&y=2");
        assert_eq!(req.path, "/foo");
        assert_eq!(req.search, "?x=1&y=2");
        assert_eq!(req.query.get("x").map(String::as_str), Some("1"));
        assert_eq!(req.query.get("y").map(String::as_str), Some("2"));

        let req = Request::get("/foo");
        assert_eq!(req.search, "");
        assert!(req.query.is_empty());

        let req = Request::get("");
        assert_eq!(req.path, "/");
    }

    #[test]
    fn test_data_request() {
        let mut req = Request::get("/c/1.json");
        req.format = Some("json".into());
        assert!(req.is_data_request());
        assert!(!req.clone().with_ssr(true).is_data_request());

        req.format = Some("html".into());
        assert!(!req.is_data_request());
    }

    #[test]
    fn test_handler_params_merge_query() {
        let mut req = Request::get("/c/1?q=hello");
        req.params.insert("id", Some("1".into()));
        let params = req.handler_params();
        assert_eq!(params.get("q"), Some("hello"));
        assert_eq!(params.get("id"), Some("1"));
        assert_eq!(params.get("format"), None);
    }

    fn with_cookie(value: &str) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        Request::get("/foo").with_headers(headers)
    }

    #[test]
    fn test_forwarded_cookies_follow_policy() {
        let req = with_cookie("session=secret; currency=USD; location=us");

        let all = req.forwarded(&CookiePolicy::Forward);
        assert_eq!(
            all.headers.get(COOKIE).unwrap(),
            "session=secret; currency=USD; location=us"
        );

        assert!(req.forwarded(&CookiePolicy::Suppress).headers.get(COOKIE).is_none());

        let only = req.forwarded(&CookiePolicy::Only(vec!["currency".into(), "location".into()]));
        assert_eq!(only.headers.get(COOKIE).unwrap(), "currency=USD; location=us");

        let none = req.forwarded(&CookiePolicy::Only(vec!["missing".into()]));
        assert!(none.headers.get(COOKIE).is_none());
    }
}
