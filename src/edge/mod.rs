//! Edge configuration compiler.
//!
//! # Data Flow
//! ```text
//! Router (route table, no live request)
//!     → compiler.rs
//!         bootstrap rules (/.powerlinks.js variants → platform backend)
//!         per route × suffix: path rule, cache key entry, TTL rule for origins
//!         fallback rule (path_regex ".")
//!     → types.rs (EdgeConfig, serialized with stable field order)
//!     → JSON artifact for the edge/CDN proxy
//! ```
//!
//! # Design Decisions
//! - Deterministic: same route table always produces the same artifact
//! - `custom_cache_keys` mirrors `router` entry for entry

pub mod compiler;
pub mod types;

pub use compiler::{EdgeCompiler, EdgeOptions, EDGE_SUFFIXES};
pub use types::{
    BackendRules, CacheKeyRule, EdgeConfig, OrderedMap, PathRule, ProxyTarget, RedirectTarget, TtlRule,
};
