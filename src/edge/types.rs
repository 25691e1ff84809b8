//! Edge configuration artifact.
//!
//! Field order of every struct is the serialized order.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::cache::{CookiePartition, QueryMode};

/// String-keyed map that serializes in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Value for `key`, inserting `default()` at the end if absent.
    pub fn entry_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> V) -> &mut V {
        let index = match self.entries.iter().position(|(k, _)| k == key) {
            Some(i) => i,
            None => {
                self.entries.push((key.to_string(), default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Declarative edge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct EdgeConfig {
    pub router: Vec<PathRule>,
    pub backends: OrderedMap<BackendRules>,
    pub custom_cache_keys: Vec<CacheKeyRule>,
}

/// One request routing rule.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PathRule {
    pub notes: String,
    pub path_regex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProxyTarget {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_path_regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RedirectTarget {
    pub status: u16,
    pub rewrite_path_regex: String,
}

/// Cache key fields for the rule with the same `path_regex`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheKeyRule {
    pub notes: String,
    pub path_regex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_headers: Option<Vec<String>>,
    /// Cookie name to `null` or its partitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_cookies: Option<OrderedMap<Option<Vec<CookiePartition>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_parameters_mode: Option<QueryMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_parameters_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct BackendRules {
    pub response_router: Vec<TtlRule>,
}

/// Edge TTL for responses of an origin backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TtlRule {
    pub notes: String,
    pub path_regex: String,
    pub ttl: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_map_keeps_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("zeta", 3);
        *map.entry_or_insert_with("mid", || 0) += 5;

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"zeta":3,"alpha":2,"mid":5}"#);
    }

    #[test]
    fn test_path_rule_field_order() {
        let rule = PathRule {
            notes: "rsf: /foo".into(),
            path_regex: "^/foo(?=\\?|$)".into(),
            proxy: Some(ProxyTarget {
                backend: "desktop".into(),
                rewrite_path_regex: None,
            }),
            redirect: None,
        };
        assert_eq!(
            serde_json::to_string(&rule).unwrap(),
            r#"{"notes":"rsf: /foo","path_regex":"^/foo(?=\\?|$)","proxy":{"backend":"desktop"}}"#
        );
    }
}
