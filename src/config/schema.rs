//! Configuration schema definitions.
//!
//! This module defines the declarative route table read by the CLI.
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration: edge settings plus the route table.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Edge compiler settings.
    pub edge: EdgeSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Routes in registration order.
    pub routes: Vec<RouteConfig>,

    /// Chain run when no route matches.
    pub fallback: Option<Vec<HandlerConfig>>,
}

/// Edge compiler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeSettings {
    /// Backend serving everything not proxied to an origin.
    pub platform_backend: String,

    /// Suffix variants emitted per route, in order.
    pub suffixes: Vec<String>,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            platform_backend: crate::edge::compiler::DEFAULT_PLATFORM_BACKEND.to_string(),
            suffixes: crate::edge::EDGE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive; `RUST_LOG` takes precedence.
    pub log_level: Option<String>,
}

/// One route of the table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Route pattern, e.g. `/p/:id(.:format)`.
    pub pattern: String,

    /// Handler chain in order.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// A handler of a declarative chain.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Static client state.
    FromClient { state: Value },

    /// Server handler bound by module path outside this process.
    FromServer { module: String },

    FromOrigin {
        #[serde(default)]
        backend: Option<String>,
        #[serde(default)]
        transform_path: Option<String>,
    },

    ProxyUpstream,

    Cache {
        #[serde(default)]
        client: Option<bool>,
        #[serde(default)]
        edge: Option<EdgeCacheConfig>,
    },

    Redirect {
        to: String,
        /// Default: 301.
        #[serde(default)]
        status: Option<u16>,
    },
}

/// Edge caching policy of a `cache` handler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EdgeCacheConfig {
    pub max_age_seconds: u64,

    #[serde(default)]
    pub key: Option<CacheKeyConfig>,
}

/// Custom cache key description.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CacheKeyConfig {
    pub headers: Vec<String>,
    pub cookies: Vec<CookieConfig>,
    pub include_query_parameters: Option<Vec<String>>,
    pub exclude_query_parameters: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CookieConfig {
    pub name: String,

    #[serde(default)]
    pub partitions: Option<Vec<PartitionConfig>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PartitionConfig {
    pub partition: String,

    /// Alternation fragment such as `us|ca`.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: RouterConfig = toml::from_str("").unwrap();
        assert!(config.routes.is_empty());
        assert_eq!(config.edge.platform_backend, "moov");
        assert_eq!(config.edge.suffixes, vec![".json", ".amp", ""]);
    }

    #[test]
    fn test_tagged_handlers() {
        let config: RouterConfig = toml::from_str(
            r#"
            [[routes]]
            pattern = "/p/:id"

            [[routes.handlers]]
            kind = "cache"
            client = true
            edge = { max_age_seconds = 300, key = { headers = ["user-agent"] } }

            [[routes.handlers]]
            kind = "from_server"
            module = "./product"

            [[routes.handlers]]
            kind = "redirect"
            to = "/products/{id}"
            status = 302
            "#,
        )
        .unwrap();

        let route = &config.routes[0];
        assert_eq!(route.method, "GET");
        assert_eq!(route.handlers.len(), 3);
        assert_eq!(
            route.handlers[2],
            HandlerConfig::Redirect {
                to: "/products/{id}".into(),
                status: Some(302)
            }
        );
        match &route.handlers[0] {
            HandlerConfig::Cache { client, edge } => {
                assert_eq!(*client, Some(true));
                let edge = edge.as_ref().unwrap();
                assert_eq!(edge.max_age_seconds, 300);
                assert_eq!(edge.key.as_ref().unwrap().headers, vec!["user-agent"]);
            }
            other => panic!("unexpected handler {:?}", other),
        }
    }
}
