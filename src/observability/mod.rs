//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch / edge compiler / config watcher produce:
//!     → tracing events (structured fields, one span per run with its run_id)
//!     → metrics.rs (counters, histogram)
//!
//! The binary consumes:
//!     → logging.rs (subscriber with EnvFilter)
//! ```
//!
//! # Design Decisions
//! - Run ID (UUID v4) flows through every event of a dispatch
//! - Metrics are recorded through the facade and cost nothing without a recorder

pub mod logging;
pub mod metrics;
