//! Route table to edge configuration.
//!
//! # Responsibilities
//! - Emit bootstrap, per-route and fallback path rules
//! - Mirror every path rule with a custom cache key entry
//! - Collect TTL rules per origin backend
//!
//! # Design Decisions
//! - Pure function of the route table; handler bodies never run
//! - Suffix variants are emitted data formats first, bare path last,
//!   so the edge matches `.json` before the bare pattern swallows it

use crate::cache::{CacheDirective, CacheKey, QueryMode};
use crate::edge::types::{
    BackendRules, CacheKeyRule, EdgeConfig, OrderedMap, PathRule, ProxyTarget, RedirectTarget, TtlRule,
};
use crate::handlers::spec::{HandlerKind, HandlerSpec};
use crate::observability::metrics;
use crate::routing::matcher::escape_edge_literal;
use crate::routing::router::Router;

/// Suffix variants emitted for every route, in order.
pub const EDGE_SUFFIXES: [&str; 3] = [".json", ".amp", ""];

/// Path always proxied to the platform backend.
pub const BOOTSTRAP_PATH: &str = "/.powerlinks.js";

pub const DEFAULT_PLATFORM_BACKEND: &str = "moov";
pub const DEFAULT_NOTES_PREFIX: &str = "rsf: ";
pub const DEFAULT_TTL_NOTES: &str = "autogenerated from rsf oem.json";

const FALLBACK_NOTES: &str = "__fallback__";
const FALLBACK_REGEX: &str = ".";

/// Compiler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeOptions {
    /// Backend serving everything that is not proxied to an origin.
    pub platform_backend: String,
    pub notes_prefix: String,
    pub ttl_notes: String,
    pub suffixes: Vec<String>,
}

impl Default for EdgeOptions {
    fn default() -> Self {
        Self {
            platform_backend: DEFAULT_PLATFORM_BACKEND.to_string(),
            notes_prefix: DEFAULT_NOTES_PREFIX.to_string(),
            ttl_notes: DEFAULT_TTL_NOTES.to_string(),
            suffixes: EDGE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Where a chain sends matching requests at the edge.
enum Target {
    Platform,
    Origin {
        backend: String,
        rewrite: Option<String>,
    },
    Redirect {
        status: u16,
        rewrite: String,
    },
}

impl Target {
    fn of(handlers: &[HandlerSpec]) -> Self {
        for spec in handlers {
            match &spec.kind {
                HandlerKind::FromOrigin { backend, .. } => {
                    return Target::Origin {
                        backend: backend.clone(),
                        rewrite: spec.bound_template().map(|t| t.to_rewrite()),
                    }
                }
                HandlerKind::Redirect { status, template } => {
                    let rewrite = match spec.bound_template() {
                        Some(bound) => bound.to_rewrite(),
                        None => template.source().to_string(),
                    };
                    return Target::Redirect {
                        status: status.as_u16(),
                        rewrite,
                    };
                }
                _ => {}
            }
        }
        Target::Platform
    }

    fn rule(&self, notes: String, path_regex: String, platform: &str) -> PathRule {
        let (proxy, redirect) = match self {
            Target::Platform => (
                Some(ProxyTarget {
                    backend: platform.to_string(),
                    rewrite_path_regex: None,
                }),
                None,
            ),
            Target::Origin { backend, rewrite } => (
                Some(ProxyTarget {
                    backend: backend.clone(),
                    rewrite_path_regex: rewrite.clone(),
                }),
                None,
            ),
            Target::Redirect { status, rewrite } => (
                None,
                Some(RedirectTarget {
                    status: *status,
                    rewrite_path_regex: rewrite.clone(),
                }),
            ),
        };
        PathRule {
            notes,
            path_regex,
            proxy,
            redirect,
        }
    }
}

/// Compiles a router's table into an [`EdgeConfig`].
pub struct EdgeCompiler<'a> {
    router: &'a Router,
    options: EdgeOptions,
}

impl<'a> EdgeCompiler<'a> {
    pub fn new(router: &'a Router) -> Self {
        Self {
            router,
            options: EdgeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EdgeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn compile(&self) -> EdgeConfig {
        let mut config = EdgeConfig::default();
        let platform = self.options.platform_backend.as_str();

        for suffix in &self.options.suffixes {
            let notes = format!("{}{}{}", self.options.notes_prefix, BOOTSTRAP_PATH, suffix);
            let regex = format!(
                "^{}{}",
                escape_edge_literal(&format!("{}{}", BOOTSTRAP_PATH, suffix)),
                crate::routing::matcher::EDGE_LOOKAHEAD
            );
            config.router.push(Target::Platform.rule(notes.clone(), regex.clone(), platform));
            config.custom_cache_keys.push(key_rule(notes, regex, None));
        }

        for route in self.router.routes() {
            let target = Target::of(route.handlers());
            let edge = edge_cache(route.handlers());

            for suffix in &self.options.suffixes {
                let notes = format!("{}{}{}", self.options.notes_prefix, route.pattern().source(), suffix);
                let regex = route.pattern().to_edge_regex(suffix);

                if let (Some((max_age, _)), Target::Origin { backend, .. }) = (edge, &target) {
                    config
                        .backends
                        .entry_or_insert_with(backend, BackendRules::default)
                        .response_router
                        .push(TtlRule {
                            notes: self.options.ttl_notes.clone(),
                            path_regex: regex.clone(),
                            ttl: format!("{}s", max_age),
                        });
                }

                config.router.push(target.rule(notes.clone(), regex.clone(), platform));
                config
                    .custom_cache_keys
                    .push(key_rule(notes, regex, edge.and_then(|(_, key)| key)));
            }
        }

        let fallback = self.router.fallback_handlers().unwrap_or(&[]);
        let notes = format!("{}{}", self.options.notes_prefix, FALLBACK_NOTES);
        config
            .router
            .push(Target::of(fallback).rule(notes.clone(), FALLBACK_REGEX.to_string(), platform));
        config.custom_cache_keys.push(key_rule(
            notes,
            FALLBACK_REGEX.to_string(),
            edge_cache(fallback).and_then(|(_, key)| key),
        ));

        metrics::record_edge_rules(config.router.len());
        tracing::info!(
            rules = config.router.len(),
            backends = config.backends.len(),
            "Compiled edge configuration"
        );
        config
    }
}

/// Edge TTL and key of the first `cache` directive with an edge policy.
fn edge_cache(handlers: &[HandlerSpec]) -> Option<(u64, Option<&CacheKey>)> {
    handlers
        .iter()
        .filter_map(HandlerSpec::cache_directive)
        .find_map(|d: &CacheDirective| d.edge.as_ref())
        .map(|edge| (edge.max_age_seconds, edge.key.as_ref()))
}

fn key_rule(notes: String, path_regex: String, key: Option<&CacheKey>) -> CacheKeyRule {
    let mut rule = CacheKeyRule {
        notes,
        path_regex,
        add_headers: None,
        add_cookies: None,
        query_parameters_mode: None,
        query_parameters_list: None,
    };
    let Some(key) = key else {
        return rule;
    };

    if !key.headers.is_empty() {
        rule.add_headers = Some(key.headers.clone());
    }
    if !key.cookies.is_empty() {
        let mut cookies = OrderedMap::new();
        for cookie in &key.cookies {
            cookies.insert(cookie.name.clone(), cookie.partitions.clone());
        }
        rule.add_cookies = Some(cookies);
    }
    if !key.query_parameters.is_empty() || key.query_mode == QueryMode::Whitelist {
        rule.query_parameters_mode = Some(key.query_mode);
        rule.query_parameters_list = Some(key.query_parameters.clone());
    }
    rule
}
