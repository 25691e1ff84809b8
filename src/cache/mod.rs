//! Cache policy subsystem.
//!
//! # Data Flow
//! ```text
//! create_custom_cache_key() → CacheKeyBuilder → build() → CacheKey
//!     → CacheDirective::edge(ttl).with_key(key)
//!     → cache(directive) adapter on a route
//!
//! At request time:  directive → Response (cache metadata, cookie policy)
//! At compile time:  directive → edge custom_cache_keys + backend TTL rules
//! ```

pub mod directive;
pub mod key;

pub use directive::{CacheDirective, EdgeCache};
pub use key::{
    create_custom_cache_key, CacheKey, CacheKeyBuilder, CacheKeyError, CookiePartition,
    CookiePartitioner, CookieRule, QueryMode,
};
