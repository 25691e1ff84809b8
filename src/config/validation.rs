//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile patterns, templates and cache keys once to surface their errors
//! - Validate value ranges (status codes, suffixes)
//! - Detect duplicate routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use http::{Method, StatusCode};
use thiserror::Error;

use crate::config::schema::{HandlerConfig, RouterConfig};
use crate::handlers::PathTemplate;
use crate::routing::RoutePattern;

/// A single semantic problem in the route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("edge.platform_backend must not be empty")]
    EmptyPlatformBackend,

    #[error("edge suffix `{0}` must be empty or start with '.'")]
    InvalidSuffix(String),

    #[error("route {index}: invalid method `{method}`")]
    InvalidMethod { index: usize, method: String },

    #[error("route {index}: {reason}")]
    InvalidPattern { index: usize, reason: String },

    #[error("route {index} ({method} {pattern}) duplicates an earlier route")]
    DuplicateRoute {
        index: usize,
        method: String,
        pattern: String,
    },

    #[error("{location}: invalid template `{template}`: {reason}")]
    InvalidTemplate {
        location: String,
        template: String,
        reason: String,
    },

    #[error("{location}: invalid redirect status {status}")]
    InvalidStatus { location: String, status: u16 },

    #[error("{location}: from_origin backend must not be empty")]
    EmptyBackend { location: String },

    #[error("{location}: invalid cache key: {reason}")]
    InvalidCacheKey { location: String, reason: String },

    #[error("{location}: from_server module must not be empty")]
    EmptyModule { location: String },
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.edge.platform_backend.trim().is_empty() {
        errors.push(ValidationError::EmptyPlatformBackend);
    }
    for suffix in &config.edge.suffixes {
        if !suffix.is_empty() && !suffix.starts_with('.') {
            errors.push(ValidationError::InvalidSuffix(suffix.clone()));
        }
    }

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        let method = route.method.to_ascii_uppercase();
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod {
                index,
                method: route.method.clone(),
            });
        }

        let params = match RoutePattern::parse(&route.pattern) {
            Ok(pattern) => pattern.param_names().to_vec(),
            Err(e) => {
                errors.push(ValidationError::InvalidPattern {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !seen.insert((method.clone(), route.pattern.clone())) {
            errors.push(ValidationError::DuplicateRoute {
                index,
                method,
                pattern: route.pattern.clone(),
            });
        }

        let location = format!("route {} ({})", index, route.pattern);
        validate_handlers(&route.handlers, &params, &location, &mut errors);
    }

    if let Some(fallback) = &config.fallback {
        validate_handlers(fallback, &[], "fallback", &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_handlers(
    handlers: &[HandlerConfig],
    params: &[String],
    location: &str,
    errors: &mut Vec<ValidationError>,
) {
    for handler in handlers {
        match handler {
            HandlerConfig::FromServer { module } if module.trim().is_empty() => {
                errors.push(ValidationError::EmptyModule {
                    location: location.to_string(),
                });
            }
            HandlerConfig::FromOrigin {
                backend,
                transform_path,
            } => {
                if backend.as_deref().is_some_and(|b| b.trim().is_empty()) {
                    errors.push(ValidationError::EmptyBackend {
                        location: location.to_string(),
                    });
                }
                if let Some(template) = transform_path {
                    check_template(template, params, location, errors);
                }
            }
            HandlerConfig::Redirect { to, status } => {
                check_template(to, params, location, errors);
                if let Some(status) = status {
                    if StatusCode::from_u16(*status).is_err() {
                        errors.push(ValidationError::InvalidStatus {
                            location: location.to_string(),
                            status: *status,
                        });
                    }
                }
            }
            HandlerConfig::Cache { edge: Some(edge), .. } => {
                if let Some(key) = &edge.key {
                    if let Err(e) = crate::config::routes::build_cache_key(key) {
                        errors.push(ValidationError::InvalidCacheKey {
                            location: location.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
}

fn check_template(template: &str, params: &[String], location: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = PathTemplate::new(template).bind(params) {
        errors.push(ValidationError::InvalidTemplate {
            location: location.to_string(),
            template: template.to_string(),
            reason: e.to_string(),
        });
    }
}
