//! Isomorphic request router with an edge configuration compiler.
//!
//! Routes are registered once, then either executed (server or client runs,
//! streamed as merged state) or compiled into a declarative configuration for
//! an edge/CDN proxy.

// Core subsystems
pub mod cache;
pub mod edge;
pub mod handlers;
pub mod routing;

// Client side
pub mod client_cache;
pub mod navigation;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use cache::{create_custom_cache_key, CacheDirective, CacheKey, CacheKeyBuilder};
pub use edge::{EdgeCompiler, EdgeConfig};
pub use handlers::{HandlerContext, HandlerError, HandlerSpec, State};
pub use routing::{Environment, Request, Response, RouteError, Router, RunOptions};
