//! Route cache directives.

use crate::cache::key::CacheKey;

/// Edge caching policy of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeCache {
    pub max_age_seconds: u64,
    pub key: Option<CacheKey>,
}

/// What `cache(...)` attaches to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirective {
    /// Cache responses in the client (service worker) cache.
    pub client: Option<bool>,
    pub edge: Option<EdgeCache>,
}

impl CacheDirective {
    pub fn client(enabled: bool) -> Self {
        Self {
            client: Some(enabled),
            edge: None,
        }
    }

    pub fn edge(max_age_seconds: u64) -> Self {
        Self {
            client: None,
            edge: Some(EdgeCache {
                max_age_seconds,
                key: None,
            }),
        }
    }

    /// Attach a custom key. Creates an edge policy with a zero TTL if absent.
    pub fn with_key(mut self, key: CacheKey) -> Self {
        self.edge
            .get_or_insert(EdgeCache {
                max_age_seconds: 0,
                key: None,
            })
            .key = Some(key);
        self
    }

    pub fn with_client(mut self, enabled: bool) -> Self {
        self.client = Some(enabled);
        self
    }

    pub fn caches_on_client(&self) -> bool {
        self.client == Some(true)
    }

    pub fn edge_key(&self) -> Option<&CacheKey> {
        self.edge.as_ref().and_then(|e| e.key.as_ref())
    }
}
