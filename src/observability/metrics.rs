//! Router metrics.
//!
//! # Metrics
//! - `router_dispatch_total` (counter): finished and dropped runs by method, outcome
//! - `router_dispatch_duration_seconds` (histogram): run duration, seed to done
//! - `router_handler_errors_total` (counter): handler failures by error kind
//! - `edge_rules_compiled_total` (counter): path rules emitted by the edge compiler
//!
//! # Design Decisions
//! - `metrics` facade only; recording is a no-op until the host installs a recorder
//! - Outcome labels are a closed set: `ok`, `error`, `not_found`, `cancelled`
//!   (a run stream dropped before it finished)

use std::time::Instant;

use metrics::{counter, histogram};

pub const DISPATCH_TOTAL: &str = "router_dispatch_total";
pub const DISPATCH_DURATION: &str = "router_dispatch_duration_seconds";
pub const HANDLER_ERRORS_TOTAL: &str = "router_handler_errors_total";
pub const EDGE_RULES_TOTAL: &str = "edge_rules_compiled_total";

/// Record a finished run.
pub fn record_dispatch(method: &str, outcome: &'static str, started: Instant) {
    counter!(DISPATCH_TOTAL, "method" => method.to_string(), "outcome" => outcome).increment(1);
    histogram!(DISPATCH_DURATION).record(started.elapsed().as_secs_f64());
}

pub fn record_handler_error(kind: &'static str) {
    counter!(HANDLER_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_edge_rules(count: usize) {
    counter!(EDGE_RULES_TOTAL).increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_dispatch("GET", "ok", Instant::now());
        record_handler_error("handler");
        record_edge_rules(3);
    }
}
