//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, query)
//!     → router.rs (MATCH: first route in registration order, else fallback, else 404)
//!     → matcher.rs (pattern, optional groups, splats, data suffix)
//!     → dispatch.rs (EXECUTE_CHAIN → ERROR → AFTER → DONE)
//!     → Stream of merged states, Response sink mutated in place
//!
//! Route Registration:
//!     pattern + HandlerSpec[]
//!     → Compile pattern once
//!     → Bind path templates to the pattern's params
//!     → Append (mounted routers are flattened)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable at runtime
//! - Deterministic: same input always matches the same route
//! - First match wins (registration order)
//! - Handler failures are recovered inside the run, never surfaced as `Err`

pub mod dispatch;
pub mod environment;
pub mod matcher;
pub mod request;
pub mod response;
pub mod router;

pub use dispatch::{RunOptions, StateStream};
pub use environment::Environment;
pub use matcher::{Params, PatternError, PatternMatch, RoutePattern};
pub use request::Request;
pub use response::{CookiePolicy, Redirect, Response, ResponseCache};
pub use router::{Route, RouteError, Router, Selection, APP_SHELL_PATH};
