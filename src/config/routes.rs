//! Route table construction from configuration.

use http::{Method, StatusCode};

use crate::cache::{create_custom_cache_key, CacheDirective, CacheKey, CacheKeyError};
use crate::config::loader::ConfigError;
use crate::config::schema::{CacheKeyConfig, HandlerConfig, RouterConfig};
use crate::edge::EdgeOptions;
use crate::handlers::{
    cache, from_client_state, from_origin, from_origin_default, from_server_module, proxy_upstream,
    redirect_to, HandlerSpec,
};
use crate::routing::Router;

impl RouterConfig {
    /// Register every configured route, in order, on a new router.
    pub fn build_router(&self) -> Result<Router, ConfigError> {
        self.build_into(Router::new())
    }

    /// Register the configured routes and fallback on `router`.
    pub fn build_into(&self, mut router: Router) -> Result<Router, ConfigError> {
        for route in &self.routes {
            let method = Method::from_bytes(route.method.to_ascii_uppercase().as_bytes())
                .map_err(|_| ConfigError::InvalidMethod(route.method.clone()))?;
            let handlers = route
                .handlers
                .iter()
                .map(handler_spec)
                .collect::<Result<Vec<_>, _>>()?;
            router = router.route(method, &route.pattern, handlers)?;
        }

        if let Some(fallback) = &self.fallback {
            let handlers = fallback.iter().map(handler_spec).collect::<Result<Vec<_>, _>>()?;
            router = router.fallback(handlers)?;
        }
        Ok(router)
    }

    /// Edge compiler settings from the `[edge]` section.
    pub fn edge_options(&self) -> EdgeOptions {
        EdgeOptions {
            platform_backend: self.edge.platform_backend.clone(),
            suffixes: self.edge.suffixes.clone(),
            ..Default::default()
        }
    }
}

fn handler_spec(config: &HandlerConfig) -> Result<HandlerSpec, ConfigError> {
    let spec = match config {
        HandlerConfig::FromClient { state } => from_client_state(state.clone()),
        HandlerConfig::FromServer { module } => from_server_module(module.clone()),
        HandlerConfig::FromOrigin {
            backend,
            transform_path,
        } => {
            let spec = match backend {
                Some(backend) => from_origin(backend.clone()),
                None => from_origin_default(),
            };
            match transform_path {
                Some(template) => spec.transform_path(template.clone()),
                None => spec,
            }
        }
        HandlerConfig::ProxyUpstream => proxy_upstream(),
        HandlerConfig::Cache { client, edge } => {
            let mut directive = CacheDirective {
                client: *client,
                edge: None,
            };
            if let Some(edge) = edge {
                directive.edge = CacheDirective::edge(edge.max_age_seconds).edge;
                if let Some(key) = &edge.key {
                    directive = directive.with_key(build_cache_key(key)?);
                }
            }
            cache(directive)
        }
        HandlerConfig::Redirect { to, status } => {
            let spec = redirect_to(to.clone());
            match status {
                Some(code) => spec.with_status(
                    StatusCode::from_u16(*code).map_err(|_| ConfigError::InvalidStatus(*code))?,
                ),
                None => spec,
            }
        }
    };
    Ok(spec)
}

/// Build a cache key from its declarative form.
pub fn build_cache_key(config: &CacheKeyConfig) -> Result<CacheKey, CacheKeyError> {
    let mut builder = create_custom_cache_key();
    for header in &config.headers {
        builder = builder.add_header(header.clone());
    }
    for cookie in &config.cookies {
        builder = match &cookie.partitions {
            None => builder.add_cookie(cookie.name.clone()),
            Some(partitions) => builder.add_cookie_partitioned(cookie.name.clone(), |c| {
                for p in partitions {
                    let slot = c.partition(p.partition.clone());
                    if let Some(pattern) = &p.pattern {
                        slot.by_pattern(pattern.clone());
                    }
                }
            }),
        };
    }
    if let Some(names) = &config.include_query_parameters {
        builder = builder.include_query_parameters(names.iter().cloned());
    }
    if let Some(names) = &config.exclude_query_parameters {
        builder = builder.exclude_query_parameters(names.iter().cloned());
    }
    builder.build()
}
