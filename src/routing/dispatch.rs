//! Handler chain execution.
//!
//! # Responsibilities
//! - Execute the selected chain as a lazy stream of merged states
//! - Gate handlers by environment and phase
//! - Recover handler errors through the error handler
//! - Apply cache directives, redirects and upstream capabilities
//!
//! # Design Decisions
//! - `stream::unfold` over an explicit phase machine; a poll runs at most
//!   until the next yielded state, so dropping the stream stops the chain
//! - Merges build a new map; caller state is never mutated
//! - Handler errors never escape `run`/`run_all`

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, Stream, StreamExt};
use http::StatusCode;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::handlers::spec::{BoxedErrorHandler, HandlerContext, HandlerKind, HandlerSpec, State};
use crate::handlers::{HandlerError, UpstreamRequest};
use crate::navigation::Location;
use crate::observability::metrics;
use crate::routing::environment::Environment;
use crate::routing::request::Request;
use crate::routing::response::{CookiePolicy, Response};
use crate::routing::router::{Router, Selection};

/// Lazily produced states of one run.
pub type StateStream<'a> = Pin<Box<dyn Stream<Item = State> + Send + 'a>>;

/// Inputs of a run besides the request.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// State to merge into. Never mutated.
    pub initial_state: State,
    /// State stored with the history entry being navigated to.
    pub history_state: Option<Value>,
    /// Skip the client loading seed and cached-response lookups.
    pub fresh: bool,
}

impl RunOptions {
    pub fn with_initial_state(mut self, state: State) -> Self {
        self.initial_state = state;
        self
    }

    pub fn with_history_state(mut self, state: Value) -> Self {
        self.history_state = Some(state);
        self
    }

    pub fn fresh(mut self) -> Self {
        self.fresh = true;
        self
    }
}

enum Phase {
    Seed,
    Chain(usize),
    Error(HandlerError),
    After(usize),
    Done,
}

enum Chain<'a> {
    Handlers {
        handlers: &'a [HandlerSpec],
        route_error: Option<&'a BoxedErrorHandler>,
    },
    NotFound,
}

struct Run<'a> {
    router: &'a Router,
    chain: Chain<'a>,
    request: Arc<Request>,
    response: Response,
    state: State,
    history_state: Option<Value>,
    fresh: bool,
    caches_on_client: bool,
    phase: Phase,
    outcome: &'static str,
    started: Instant,
}

impl Router {
    /// Run the chain for `request`, yielding the merged state after each step.
    pub fn run(&self, mut request: Request, response: Response, options: RunOptions) -> StateStream<'_> {
        let selection = self.select(&request);
        let chain = match &selection {
            Selection::NotFound => Chain::NotFound,
            _ => Chain::Handlers {
                handlers: selection.handlers(),
                route_error: selection.error_handler(),
            },
        };

        if let Selection::Route(_, m) = &selection {
            request.params = m.params.clone();
            request.format = m.format.clone();
        }

        let caches_on_client = selection
            .handlers()
            .iter()
            .filter_map(HandlerSpec::cache_directive)
            .any(|d| d.caches_on_client());

        let run_id = Uuid::new_v4();
        let span = tracing::debug_span!(
            "dispatch",
            run_id = %run_id,
            method = %request.method,
            path = %request.path,
            route = %selection.label(),
            environment = %self.environment,
        );

        let run = Run {
            router: self,
            chain,
            request: Arc::new(request),
            response,
            state: options.initial_state,
            history_state: options.history_state,
            fresh: options.fresh,
            caches_on_client,
            phase: Phase::Seed,
            outcome: "ok",
            started: Instant::now(),
        };

        Box::pin(stream::unfold(run, move |run| {
            let span = span.clone();
            async move { run.step().await }.instrument(span)
        }))
    }

    /// Drain `run` and return the last state, or the initial state if nothing was yielded.
    pub async fn run_all(&self, request: Request, response: Response, options: RunOptions) -> State {
        let initial = options.initial_state.clone();
        let mut states = self.run(request, response, options);
        let mut last = None;
        while let Some(state) = states.next().await {
            last = Some(state);
        }
        last.unwrap_or(initial)
    }

    /// Run `location` to completion, bypassing the loading seed and cached responses.
    pub async fn fetch_fresh_state(&self, location: &Location) -> State {
        let request = Request::from_location(location);
        self.run_all(request, Response::new(), RunOptions::default().fresh())
            .await
    }
}

impl<'a> Run<'a> {
    fn environment(&self) -> Environment {
        self.router.environment
    }

    fn context(&self) -> HandlerContext {
        HandlerContext {
            params: self.request.handler_params(),
            request: self.request.clone(),
            response: self.response.clone(),
            state: self.state.clone(),
            environment: self.environment(),
            upstream: None,
        }
    }

    /// Merge `patch` into a new state.
    fn merge(&mut self, patch: serde_json::Map<String, Value>) {
        let mut next = self.state.clone();
        next.extend(patch);
        self.state = next;
    }

    /// Advance to the next yielded state.
    async fn step(mut self) -> Option<(State, Self)> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Seed => {
                    self.phase = Phase::Chain(0);
                    if let Some(seed) = self.seed() {
                        return Some((seed, self));
                    }
                }
                Phase::Chain(from) => {
                    let handlers = match &self.chain {
                        Chain::Handlers { handlers, .. } => *handlers,
                        Chain::NotFound => {
                            self.outcome = "not_found";
                            self.response.set_status(StatusCode::NOT_FOUND);
                            let mut patch = serde_json::Map::new();
                            patch.insert("page".into(), Value::String("404".into()));
                            self.merge(patch);
                            tracing::debug!("No route matched");
                            self.finish();
                            return Some((self.state.clone(), self));
                        }
                    };

                    let env = self.environment();
                    let data_only = self.request.is_data_request();
                    let next = handlers.iter().enumerate().skip(from).find(|(_, h)| {
                        !h.run_on.after
                            && h.run_on.allows(env)
                            && !matches!(h.kind, HandlerKind::Cache(_))
                            && !(matches!(h.kind, HandlerKind::FromClient) && data_only)
                    });

                    let Some((index, spec)) = next else {
                        self.phase = Phase::After(0);
                        continue;
                    };
                    self.phase = Phase::Chain(index + 1);

                    match self.execute(spec).await {
                        Ok(value) => {
                            if self.absorb(spec, value) {
                                return Some((self.state.clone(), self));
                            }
                        }
                        Err(e) => self.phase = Phase::Error(e),
                    }
                }
                Phase::Error(error) => {
                    self.phase = Phase::After(0);
                    self.outcome = "error";
                    self.recover(error).await;
                    return Some((self.state.clone(), self));
                }
                Phase::After(from) => {
                    let handlers = match &self.chain {
                        Chain::Handlers { handlers, .. } => *handlers,
                        Chain::NotFound => &[],
                    };
                    let env = self.environment();
                    let next = handlers.iter().enumerate().skip(from).find(|(_, h)| {
                        h.run_on.after && h.run_on.allows(env) && !matches!(h.kind, HandlerKind::Cache(_))
                    });

                    let Some((index, spec)) = next else {
                        self.finish();
                        return None;
                    };
                    self.phase = Phase::After(index + 1);

                    match self.execute(spec).await {
                        Ok(value) => {
                            if self.absorb(spec, value) {
                                return Some((self.state.clone(), self));
                            }
                        }
                        Err(e) => {
                            metrics::record_handler_error(e.kind());
                            tracing::warn!(adapter = spec.kind.name(), error = %e, "After handler failed");
                        }
                    }
                }
                Phase::Done => return None,
            }
        }
    }

    /// Apply cache directives and build the client loading seed.
    fn seed(&mut self) -> Option<State> {
        if let Chain::Handlers { handlers, .. } = &self.chain {
            for directive in handlers.iter().filter_map(HandlerSpec::cache_directive) {
                self.response.apply_cache_directive(directive);
            }
        }

        let mut patch = serde_json::Map::new();
        let client_seed = self.environment().is_client() && !self.fresh;
        if client_seed {
            patch.insert("loading".into(), Value::Bool(true));
            patch.insert("location".into(), self.request.location_json());
        }
        if let Some(Value::Object(history)) = self.history_state.take() {
            patch.extend(history);
        }

        if patch.is_empty() {
            return None;
        }
        self.merge(patch);
        client_seed.then(|| self.state.clone())
    }

    /// Merge a handler result. Returns whether a new state should be yielded.
    fn absorb(&mut self, spec: &HandlerSpec, value: Value) -> bool {
        let from_server_on_client =
            matches!(spec.kind, HandlerKind::FromServer { .. }) && self.environment().is_client();

        let mut patch = match value {
            Value::Object(map) => map,
            Value::Null if from_server_on_client => serde_json::Map::new(),
            Value::Null => return false,
            other => {
                tracing::debug!(adapter = spec.kind.name(), value = %other, "Ignoring non-object handler result");
                return false;
            }
        };
        if from_server_on_client {
            patch.insert("loading".into(), Value::Bool(false));
        }
        self.merge(patch);
        true
    }

    async fn execute(&self, spec: &HandlerSpec) -> Result<Value, HandlerError> {
        match &spec.kind {
            HandlerKind::FromClient | HandlerKind::Raw => self.call(spec, self.context()).await,
            HandlerKind::FromServer { .. } => self.from_server(spec).await,
            HandlerKind::FromOrigin { backend, .. } => {
                let upstream = self.router.upstream.as_ref().ok_or(HandlerError::Capability {
                    adapter: "from_origin",
                })?;
                let path = match spec.bound_template() {
                    Some(template) => format!("{}{}", template.render(&self.request.params), self.request.search),
                    None => self.request.path_and_query(),
                };
                tracing::debug!(backend = %backend, path = %path, "Fetching from origin");
                let target = UpstreamRequest {
                    backend: Some(backend.clone()),
                    path,
                };
                upstream.fetch(target, &self.forwarded_request()).await
            }
            HandlerKind::ProxyUpstream => {
                let upstream = self.router.upstream.as_ref().ok_or(HandlerError::Capability {
                    adapter: "proxy_upstream",
                })?;
                let target = UpstreamRequest {
                    backend: None,
                    path: self.request.path_and_query(),
                };
                let fetched = upstream.fetch(target, &self.forwarded_request()).await?;
                match &spec.handler {
                    Some(transform) => {
                        let mut cx = self.context();
                        cx.upstream = Some(fetched);
                        transform(cx).await
                    }
                    None => Ok(fetched),
                }
            }
            HandlerKind::Redirect { status, .. } => {
                let location = spec
                    .bound_template()
                    .map(|t| t.render(&self.request.params))
                    .ok_or(HandlerError::Unbound("redirect_to"))?;
                tracing::debug!(location = %location, status = status.as_u16(), "Redirecting");
                self.response.redirect(location, *status);
                Ok(Value::Null)
            }
            HandlerKind::Cache(_) => Ok(Value::Null),
        }
    }

    /// The request as upstream may see it, under the response's cookie policy.
    fn forwarded_request(&self) -> Request {
        let policy = self.response.cookie_policy();
        if policy != CookiePolicy::Forward {
            tracing::debug!(policy = ?policy, "Filtering cookies forwarded upstream");
        }
        self.request.forwarded(&policy)
    }

    async fn call(&self, spec: &HandlerSpec, cx: HandlerContext) -> Result<Value, HandlerError> {
        match &spec.handler {
            Some(f) => f(cx).await,
            None => Err(HandlerError::Unbound(spec.kind.name())),
        }
    }

    async fn from_server(&self, spec: &HandlerSpec) -> Result<Value, HandlerError> {
        if self.caches_on_client && !self.fresh {
            if let Some(cached) = &spec.cached {
                let hit = cached
                    .cached_response(&self.request)
                    .await
                    .filter(|v| !v.is_null());
                if let Some(value) = hit {
                    tracing::debug!("Serving cached response");
                    return Ok(value);
                }
            }
        }

        let value = self.call(spec, self.context()).await?;

        if self.caches_on_client && self.environment().is_client() {
            if let Some(cache) = &self.router.client_cache {
                cache.cache(&self.request.path_and_query(), Some(&value));
            }
        }
        Ok(value)
    }

    /// Run the error handler and merge its result, or the default error shape.
    async fn recover(&mut self, error: HandlerError) {
        metrics::record_handler_error(error.kind());
        if error.is_capability() {
            tracing::error!(error = %error, "Upstream capability missing");
        } else {
            tracing::warn!(error = %error, "Handler failed");
        }

        let message = error.to_string();
        let stack = error.stack();
        let capability = error.is_capability();

        let handler = match &self.chain {
            Chain::Handlers { route_error, .. } => route_error.or(self.router.error_handler.as_ref()),
            Chain::NotFound => None,
        };

        let custom = match handler {
            Some(handler) => match handler(error, self.context()).await {
                Ok(Value::Object(patch)) => Some(patch),
                Ok(_) => Some(serde_json::Map::new()),
                Err(e) => {
                    tracing::error!(error = %e, "Error handler failed");
                    None
                }
            },
            None => None,
        };

        match custom {
            Some(patch) => self.merge(patch),
            None => self.merge(self.default_error(message, stack)),
        }

        if capability {
            self.response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    fn default_error(&self, message: String, stack: String) -> serde_json::Map<String, Value> {
        let mut patch = serde_json::Map::new();
        patch.insert("error".into(), Value::String(message));
        patch.insert("stack".into(), Value::String(stack));
        if self.environment() == Environment::Server {
            patch.insert("loading".into(), Value::Bool(false));
            patch.insert("page".into(), Value::String("Error".into()));
            self.response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        patch
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        metrics::record_dispatch(self.request.method.as_str(), self.outcome, self.started);
        tracing::debug!(
            outcome = self.outcome,
            status = self.response.status().as_u16(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Run finished"
        );
    }
}

impl Drop for Run<'_> {
    fn drop(&mut self) {
        if matches!(self.phase, Phase::Done) {
            return;
        }
        metrics::record_dispatch(self.request.method.as_str(), "cancelled", self.started);
        tracing::debug!(path = %self.request.path, "Run dropped before completion");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ::metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};

    use super::*;

    /// Keeps the `outcome` label of every dispatch counter registration.
    #[derive(Default)]
    struct Outcomes(Mutex<Vec<String>>);

    impl Outcomes {
        fn seen(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Recorder for Outcomes {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            if key.name() == metrics::DISPATCH_TOTAL {
                if let Some(label) = key.labels().find(|l| l.key() == "outcome") {
                    self.0.lock().unwrap().push(label.value().to_string());
                }
            }
            Counter::noop()
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_dropped_run_counts_as_cancelled() {
        let recorder = Outcomes::default();
        let router = Router::new();

        ::metrics::with_local_recorder(&recorder, || {
            let states = router.run(Request::get("/nowhere"), Response::new(), RunOptions::default());
            drop(states);
        });

        assert_eq!(recorder.seen(), vec!["cancelled".to_string()]);
    }

    #[test]
    fn test_finished_run_is_not_cancelled() {
        let recorder = Outcomes::default();
        let router = Router::new();
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        ::metrics::with_local_recorder(&recorder, || {
            runtime.block_on(router.run_all(Request::get("/nowhere"), Response::new(), RunOptions::default()));
        });

        assert_eq!(recorder.seen(), vec!["not_found".to_string()]);
    }
}
