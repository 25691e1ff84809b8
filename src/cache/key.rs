//! Custom edge cache key builder.
//!
//! # Responsibilities
//! - Accumulate headers, cookies (optionally partitioned) and a query policy
//! - Normalize into a `CacheKey` consumed by the edge compiler
//!
//! # Design Decisions
//! - Pure policy description, never touches live requests
//! - All names keep insertion order; repeats collapse to the first position
//! - Invalid combinations surface from `build()`, not mid-request

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported when normalizing a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheKeyError {
    #[error("cache key mixes included and excluded query parameters")]
    MixedQueryModes,

    #[error("cookie `{cookie}` partition `{partition}` has no pattern")]
    MissingPattern { cookie: String, partition: String },

    #[error("cookie `{cookie}` declares partition `{partition}` more than once")]
    DuplicatePartition { cookie: String, partition: String },

    #[error("cookie `{cookie}` has a partition with an empty name")]
    EmptyPartitionName { cookie: String },

    #[error("cookie `{cookie}` partition `{partition}` has an invalid pattern: {reason}")]
    InvalidPattern {
        cookie: String,
        partition: String,
        reason: String,
    },
}

/// Whether listed query parameters are kept or dropped from the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Whitelist,
    Blacklist,
}

/// One named bucket of cookie values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePartition {
    pub partition: String,
    /// Unanchored alternation fragment, stored verbatim.
    #[serde(rename = "partitioning_regex")]
    pub pattern: String,
}

/// Cookie entry of a key. `None` means the raw value is part of the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRule {
    pub name: String,
    pub partitions: Option<Vec<CookiePartition>>,
}

/// Normalized cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub headers: Vec<String>,
    pub cookies: Vec<CookieRule>,
    pub query_mode: QueryMode,
    pub query_parameters: Vec<String>,
}

impl CacheKey {
    /// Names of the cookies that take part in the key.
    pub fn cookie_names(&self) -> Vec<String> {
        self.cookies.iter().map(|c| c.name.clone()).collect()
    }
}

/// Start a new cache key description.
pub fn create_custom_cache_key() -> CacheKeyBuilder {
    CacheKeyBuilder::default()
}

#[derive(Debug, Clone)]
struct PendingPartition {
    name: String,
    pattern: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingCookie {
    name: String,
    partitions: Option<Vec<PendingPartition>>,
}

/// Fluent builder for a [`CacheKey`].
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    headers: Vec<String>,
    cookies: Vec<PendingCookie>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

impl CacheKeyBuilder {
    pub fn add_header(mut self, name: impl Into<String>) -> Self {
        self.headers.push(name.into());
        self
    }

    /// Include the cookie value verbatim.
    pub fn add_cookie(mut self, name: impl Into<String>) -> Self {
        self.cookies.push(PendingCookie {
            name: name.into(),
            partitions: None,
        });
        self
    }

    /// Include the cookie, bucketed by the partitions declared in `partition`.
    pub fn add_cookie_partitioned<F>(mut self, name: impl Into<String>, partition: F) -> Self
    where
        F: FnOnce(&mut CookiePartitioner),
    {
        let mut partitioner = CookiePartitioner::default();
        partition(&mut partitioner);
        self.cookies.push(PendingCookie {
            name: name.into(),
            partitions: Some(partitioner.partitions),
        });
        self
    }

    pub fn exclude_query_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn include_query_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Normalize and validate.
    pub fn build(self) -> Result<CacheKey, CacheKeyError> {
        let (query_mode, query_parameters) = match (self.include, self.exclude) {
            (Some(_), Some(_)) => return Err(CacheKeyError::MixedQueryModes),
            (Some(names), None) => (QueryMode::Whitelist, dedup(names)),
            (None, Some(names)) => (QueryMode::Blacklist, dedup(names)),
            (None, None) => (QueryMode::Blacklist, Vec::new()),
        };

        let mut cookies: Vec<CookieRule> = Vec::new();
        for cookie in self.cookies {
            if cookies.iter().any(|c| c.name == cookie.name) {
                continue;
            }
            let partitions = match cookie.partitions {
                Some(pending) => Some(resolve_partitions(&cookie.name, pending)?),
                None => None,
            };
            cookies.push(CookieRule {
                name: cookie.name,
                partitions,
            });
        }

        Ok(CacheKey {
            headers: dedup(self.headers),
            cookies,
            query_mode,
            query_parameters,
        })
    }
}

/// Collects the partitions of one cookie.
#[derive(Debug, Default)]
pub struct CookiePartitioner {
    partitions: Vec<PendingPartition>,
}

impl CookiePartitioner {
    /// Declare a partition; give it a pattern with [`PartitionSlot::by_pattern`].
    pub fn partition(&mut self, name: impl Into<String>) -> PartitionSlot<'_> {
        self.partitions.push(PendingPartition {
            name: name.into(),
            pattern: None,
        });
        let index = self.partitions.len() - 1;
        PartitionSlot {
            slot: &mut self.partitions[index],
        }
    }
}

/// A partition awaiting its pattern.
pub struct PartitionSlot<'a> {
    slot: &'a mut PendingPartition,
}

impl PartitionSlot<'_> {
    pub fn by_pattern(self, pattern: impl Into<String>) {
        self.slot.pattern = Some(pattern.into());
    }
}

fn resolve_partitions(
    cookie: &str,
    pending: Vec<PendingPartition>,
) -> Result<Vec<CookiePartition>, CacheKeyError> {
    let mut out: Vec<CookiePartition> = Vec::with_capacity(pending.len());
    for p in pending {
        if p.name.is_empty() {
            return Err(CacheKeyError::EmptyPartitionName {
                cookie: cookie.to_string(),
            });
        }
        if out.iter().any(|existing| existing.partition == p.name) {
            return Err(CacheKeyError::DuplicatePartition {
                cookie: cookie.to_string(),
                partition: p.name,
            });
        }
        let pattern = match p.pattern {
            Some(pattern) if !pattern.is_empty() => pattern,
            _ => {
                return Err(CacheKeyError::MissingPattern {
                    cookie: cookie.to_string(),
                    partition: p.name,
                })
            }
        };
        if let Err(e) = Regex::new(&pattern) {
            return Err(CacheKeyError::InvalidPattern {
                cookie: cookie.to_string(),
                partition: p.name,
                reason: e.to_string(),
            });
        }
        out.push(CookiePartition {
            partition: p.name,
            pattern,
        });
    }
    Ok(out)
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_normalized_key() {
        let key = create_custom_cache_key()
            .add_header("user-agent")
            .add_header("host")
            .add_header("user-agent")
            .exclude_query_parameters(["uid", "gclid"])
            .add_cookie("currency")
            .add_cookie_partitioned("location", |cookie| {
                cookie.partition("na").by_pattern("us|ca");
                cookie.partition("eur").by_pattern("de|fr|ee");
            })
            .build()
            .unwrap();

        assert_eq!(key.headers, ["user-agent", "host"]);
        assert_eq!(key.query_mode, QueryMode::Blacklist);
        assert_eq!(key.query_parameters, ["uid", "gclid"]);
        assert_eq!(key.cookies.len(), 2);
        assert_eq!(key.cookies[0].partitions, None);

        let partitions = key.cookies[1].partitions.as_ref().unwrap();
        assert_eq!(partitions[0].partition, "na");
        assert_eq!(partitions[0].pattern, "us|ca");
        assert_eq!(partitions[1].partition, "eur");
        assert_eq!(key.cookie_names(), ["currency", "location"]);
    }

    #[test]
    fn test_whitelist_mode() {
        let key = create_custom_cache_key()
            .include_query_parameters(["page"])
            .build()
            .unwrap();
        assert_eq!(key.query_mode, QueryMode::Whitelist);
        assert_eq!(key.query_parameters, ["page"]);
    }

    #[test]
    fn test_mixed_query_modes_rejected() {
        let err = create_custom_cache_key()
            .include_query_parameters(["a"])
            .exclude_query_parameters(["b"])
            .build()
            .unwrap_err();
        assert_eq!(err, CacheKeyError::MixedQueryModes);
    }

    #[test]
    fn test_ambiguous_partitions_rejected() {
        let err = create_custom_cache_key()
            .add_cookie_partitioned("loc", |cookie| {
                cookie.partition("na").by_pattern("us");
                cookie.partition("na").by_pattern("ca");
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheKeyError::DuplicatePartition { .. }));

        let err = create_custom_cache_key()
            .add_cookie_partitioned("loc", |cookie| {
                cookie.partition("na");
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheKeyError::MissingPattern { .. }));

        let err = create_custom_cache_key()
            .add_cookie_partitioned("loc", |cookie| {
                cookie.partition("na").by_pattern("us(");
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheKeyError::InvalidPattern { .. }));
    }
}
