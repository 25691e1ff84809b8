//! Handler specifications and type-erased handler functions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use serde_json::{Map, Value};

use crate::cache::CacheDirective;
use crate::handlers::capability::CachedResponse;
use crate::handlers::error::HandlerError;
use crate::handlers::template::{BoundTemplate, PathTemplate, TemplateError};
use crate::routing::environment::Environment;
use crate::routing::matcher::Params;
use crate::routing::request::Request;
use crate::routing::response::Response;

/// Accumulated state of a run.
pub type State = Map<String, Value>;

pub type HandlerResult = Result<Value, HandlerError>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Boxed handler for type erasure
pub type BoxedHandler = Arc<dyn Fn(HandlerContext) -> HandlerFuture + Send + Sync>;

/// Boxed error handler
pub type BoxedErrorHandler = Arc<dyn Fn(HandlerError, HandlerContext) -> HandlerFuture + Send + Sync>;

/// Everything a handler can see.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Query params, path params and format.
    pub params: Params,
    pub request: Arc<Request>,
    pub response: Response,
    /// Snapshot of the merged state before this handler.
    pub state: State,
    pub environment: Environment,
    /// Result fetched by the upstream capability, for `proxy_upstream_with`.
    pub upstream: Option<Value>,
}

/// Environment gates of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOn {
    pub server: bool,
    pub client: bool,
    /// Run after the rest of the chain, even when it failed.
    pub after: bool,
}

impl RunOn {
    pub const BOTH: RunOn = RunOn {
        server: true,
        client: true,
        after: false,
    };
    pub const CLIENT: RunOn = RunOn {
        server: false,
        client: true,
        after: false,
    };
    pub const SERVER: RunOn = RunOn {
        server: true,
        client: false,
        after: false,
    };

    pub fn allows(&self, environment: Environment) -> bool {
        match environment {
            Environment::Server => self.server,
            Environment::Client => self.client,
        }
    }
}

/// What an adapter is, as seen by the dispatcher and the edge compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    FromClient,
    FromServer {
        /// Handler module reference for declaratively configured routes.
        module: Option<String>,
    },
    FromOrigin {
        backend: String,
        transform_path: Option<PathTemplate>,
    },
    ProxyUpstream,
    Cache(CacheDirective),
    Redirect {
        template: PathTemplate,
        status: StatusCode,
    },
    Raw,
}

impl HandlerKind {
    pub fn name(&self) -> &'static str {
        match self {
            HandlerKind::FromClient => "from_client",
            HandlerKind::FromServer { .. } => "from_server",
            HandlerKind::FromOrigin { .. } => "from_origin",
            HandlerKind::ProxyUpstream => "proxy_upstream",
            HandlerKind::Cache(_) => "cache",
            HandlerKind::Redirect { .. } => "redirect_to",
            HandlerKind::Raw => "handler",
        }
    }
}

/// One entry of a route's handler chain.
#[derive(Clone)]
pub struct HandlerSpec {
    pub(crate) kind: HandlerKind,
    pub(crate) run_on: RunOn,
    pub(crate) handler: Option<BoxedHandler>,
    pub(crate) cached: Option<Arc<dyn CachedResponse>>,
    /// Path template bound to the owning route's params.
    pub(crate) bound: Option<BoundTemplate>,
}

impl std::fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("kind", &self.kind)
            .field("run_on", &self.run_on)
            .field("has_handler", &self.handler.is_some())
            .field("has_cached_response", &self.cached.is_some())
            .finish()
    }
}

impl HandlerSpec {
    pub(crate) fn new(kind: HandlerKind, run_on: RunOn, handler: Option<BoxedHandler>) -> Self {
        Self {
            kind,
            run_on,
            handler,
            cached: None,
            bound: None,
        }
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    pub fn gates(&self) -> RunOn {
        self.run_on
    }

    /// Override the environment gates.
    pub fn run_on(mut self, run_on: RunOn) -> Self {
        self.run_on = run_on;
        self
    }

    /// Mark as an after handler, keeping the environment gates.
    pub fn after(mut self) -> Self {
        self.run_on.after = true;
        self
    }

    /// Attach a cached-response lookup, consulted when the route caches on the client.
    pub fn with_cached_response<C>(mut self, cached: C) -> Self
    where
        C: CachedResponse + 'static,
    {
        self.cached = Some(Arc::new(cached));
        self
    }

    /// Rewrite target of a `from_origin` adapter.
    pub fn transform_path(mut self, template: impl Into<String>) -> Self {
        if let HandlerKind::FromOrigin { transform_path, .. } = &mut self.kind {
            *transform_path = Some(PathTemplate::new(template));
        } else {
            tracing::warn!(adapter = self.kind.name(), "transform_path only applies to from_origin");
        }
        self
    }

    /// Status of a `redirect_to` adapter.
    pub fn with_status(mut self, code: StatusCode) -> Self {
        if let HandlerKind::Redirect { status, .. } = &mut self.kind {
            *status = code;
        } else {
            tracing::warn!(adapter = self.kind.name(), "with_status only applies to redirect_to");
        }
        self
    }

    pub fn cache_directive(&self) -> Option<&CacheDirective> {
        match &self.kind {
            HandlerKind::Cache(directive) => Some(directive),
            _ => None,
        }
    }

    pub fn bound_template(&self) -> Option<&BoundTemplate> {
        self.bound.as_ref()
    }

    /// Resolve path templates against the params of the owning route.
    pub(crate) fn bind(mut self, params: &[String]) -> Result<Self, TemplateError> {
        let template = match &self.kind {
            HandlerKind::FromOrigin {
                transform_path: Some(t),
                ..
            } => Some(t),
            HandlerKind::Redirect { template, .. } => Some(template),
            _ => None,
        };
        self.bound = template.map(|t| t.bind(params)).transpose()?;
        Ok(self)
    }
}

/// Box a closure as a handler.
pub(crate) fn boxed<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |cx: HandlerContext| -> HandlerFuture { Box::pin(f(cx)) })
}
