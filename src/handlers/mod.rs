//! Handler adapters.
//!
//! # Data Flow
//! ```text
//! from_client / from_server / from_origin / proxy_upstream / cache / redirect_to / handler
//!     → HandlerSpec { kind, run_on, fn, metadata }
//!     → Router registration (templates bound to the route's params)
//!     → dispatch (runtime) or edge compiler (metadata only)
//! ```
//!
//! # Design Decisions
//! - Handler functions are type-erased async closures over `HandlerContext`
//! - Kinds carry the metadata the edge compiler needs; it never calls them
//! - Environment gates are data (`RunOn`), not separate code paths

pub mod adapters;
pub mod capability;
pub mod error;
pub mod spec;
pub mod template;

pub use adapters::{
    cache, from_client, from_client_state, from_origin, from_origin_default, from_server,
    from_server_module, handler, proxy_upstream, proxy_upstream_with, redirect_to,
    DEFAULT_ORIGIN_BACKEND,
};
pub use capability::{CachedResponse, Upstream, UpstreamRequest};
pub use error::HandlerError;
pub use spec::{
    BoxedErrorHandler, HandlerContext, HandlerFuture, HandlerKind, HandlerResult, HandlerSpec,
    RunOn, State,
};
pub use template::{BoundTemplate, PathTemplate, TemplateError};
