//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::{json, Value};

use edge_router::handlers::{from_server, HandlerFuture, HandlerSpec, Upstream, UpstreamRequest};
use edge_router::routing::{Environment, Request, Response, Router, RunOptions};
use edge_router::State;

pub fn server_router() -> Router {
    Router::new().environment(Environment::Server)
}

pub fn client_router() -> Router {
    Router::new().environment(Environment::Client)
}

/// Drain `run` into a vector of states.
pub async fn collect(router: &Router, request: Request, response: Response) -> Vec<Value> {
    router
        .run(request, response, RunOptions::default())
        .map(Value::Object)
        .collect::<Vec<_>>()
        .await
}

pub async fn run_all(router: &Router, request: Request) -> (Value, Response) {
    let response = Response::new();
    let state = router
        .run_all(request, response.clone(), RunOptions::default())
        .await;
    (Value::Object(state), response)
}

pub fn state(value: Value) -> State {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// A `from_server` handler returning `value` and counting its calls.
pub fn counted(value: Value) -> (HandlerSpec, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let spec = from_server(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move { Ok(value) }
    });
    (spec, calls)
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Upstream capability that echoes what it was asked to fetch.
#[derive(Clone, Default)]
pub struct MockUpstream {
    requests: Arc<Mutex<Vec<UpstreamRequest>>>,
    cookies: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The `cookie` header of each forwarded request, in fetch order.
    pub fn cookies(&self) -> Vec<Option<String>> {
        self.cookies.lock().unwrap().clone()
    }
}

impl Upstream for MockUpstream {
    fn fetch(&self, upstream: UpstreamRequest, request: &Request) -> HandlerFuture {
        self.requests.lock().unwrap().push(upstream.clone());
        let cookie = request
            .headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.cookies.lock().unwrap().push(cookie);
        Box::pin(async move {
            Ok(json!({
                "backend": upstream.backend,
                "upstream_path": upstream.path,
            }))
        })
    }
}
