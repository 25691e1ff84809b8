//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! route table file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → routes.rs (register routes on a Router)
//!     → edge compiler
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → routes.rs rebuilds the router, edge compiler recompiles
//!     → new EdgeConfig sent to the consumer
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod routes;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheKeyConfig, CookieConfig, EdgeCacheConfig, EdgeSettings, HandlerConfig, ObservabilityConfig,
    PartitionConfig, RouteConfig, RouterConfig,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
