//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber for the CLI
//! - Resolve the filter from `RUST_LOG`, then the configured level
//!
//! # Design Decisions
//! - Library code only emits events; installing a subscriber is the binary's job
//! - Human-readable `fmt` layer; level configurable via config and environment

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "edge_router=info";

/// Build the filter: `RUST_LOG` wins, then `level` (e.g. `debug` or a full directive).
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) if !level.contains('=') => EnvFilter::new(format!("edge_router={}", level)),
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::new(DEFAULT_FILTER),
    })
}

/// Install the global subscriber. Errors if one is already set.
pub fn init_logging(level: Option<&str>) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
