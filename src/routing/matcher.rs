//! Route pattern compilation and matching.
//!
//! # Responsibilities
//! - Parse the pattern DSL (`:name`, `*splat`, `(optional)`, literals)
//! - Match request paths and extract params plus the format suffix
//! - Render the same pattern as an edge path regex
//!
//! # Design Decisions
//! - Patterns are compiled once at registration, immutable afterwards
//! - Matching is anchored over the whole path, never the query string
//! - Registered data suffixes (`.json`, `.amp`) are tried stripped first, so
//!   `/p/:id` on `/p/1.json` yields `id=1` rather than `id=1.json`

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use thiserror::Error;

/// Formats recognized as request suffixes, in edge emission order.
pub const DATA_FORMATS: [&str; 2] = ["json", "amp"];

/// Name given to a bare `*` splat.
const DEFAULT_SPLAT: &str = "splat";

/// Errors raised while compiling a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern `{0}` must start with `/`")]
    MissingLeadingSlash(String),

    #[error("pattern `{pattern}` has an unclosed optional group opened at byte {position}")]
    UnclosedGroup { pattern: String, position: usize },

    #[error("pattern `{pattern}` closes an optional group at byte {position} that was never opened")]
    UnopenedGroup { pattern: String, position: usize },

    #[error("pattern `{pattern}` declares parameter `{name}` more than once")]
    DuplicateParam { pattern: String, name: String },

    #[error("pattern `{pattern}` has an unnamed parameter at byte {position}")]
    EmptyParamName { pattern: String, position: usize },

    #[error("pattern `{pattern}` failed to compile: {reason}")]
    Compile { pattern: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Literal(String),
    Param(String),
    Splat(String),
    Optional(Vec<Node>),
}

/// Parameters captured from a path. Absent optional params are kept as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, Option<String>>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a param, `None` when absent or unmatched.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_deref())
    }

    /// True when the param is declared, even if it did not match.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.0.insert(name.into(), value);
    }

    pub fn extend(&mut self, other: &Params) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Object view of the params. Absent values are omitted.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), serde_json::Value::String(v.clone()))))
            .collect()
    }
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub params: Params,
    pub format: Option<String>,
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    nodes: Vec<Node>,
    params: Vec<String>,
    regex: Regex,
}

impl RoutePattern {
    /// Compile a pattern string.
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        if !source.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(source.to_string()));
        }

        let mut parser = Parser {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        };
        let nodes = parser.parse_sequence(None)?;

        let mut params = Vec::new();
        collect_params(&nodes, &mut params);
        for (i, name) in params.iter().enumerate() {
            if params[..i].contains(name) {
                return Err(PatternError::DuplicateParam {
                    pattern: source.to_string(),
                    name: name.clone(),
                });
            }
        }

        let mut expr = String::from("^");
        write_match_regex(&nodes, &mut expr);
        expr.push('$');
        let regex = Regex::new(&expr).map_err(|e| PatternError::Compile {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: source.to_string(),
            nodes,
            params,
            regex,
        })
    }

    /// The pattern as written at registration.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names in order of first appearance.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Match a request path (no query string).
    pub fn matches(&self, path: &str) -> Option<PatternMatch> {
        let suffix = data_format(path);

        if let Some(format) = suffix {
            let stripped = &path[..path.len() - format.len() - 1];
            if let Some(params) = self.capture(stripped) {
                return Some(PatternMatch {
                    params,
                    format: Some(format.to_string()),
                });
            }
        }

        let params = self.capture(path)?;
        let format = params
            .get("format")
            .map(str::to_string)
            .or_else(|| suffix.map(str::to_string));
        Some(PatternMatch { params, format })
    }

    /// Render as an anchored edge regex with `suffix` appended (e.g. `.json`).
    ///
    /// Named params become `([^/\?]+)`, splats `([^?]*?)`, and the expression
    /// ends in a lookahead for `?` or end of input.
    pub fn to_edge_regex(&self, suffix: &str) -> String {
        let mut out = String::from("^");
        write_edge_regex(&self.nodes, &mut out);
        out.push_str(&escape_edge_literal(suffix));
        out.push_str(EDGE_LOOKAHEAD);
        out
    }

    fn capture(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let mut params = Params::new();
        for (i, name) in self.params.iter().enumerate() {
            params.insert(name.clone(), caps.get(i + 1).map(|m| m.as_str().to_string()));
        }
        Some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Lookahead closing every edge path regex.
pub const EDGE_LOOKAHEAD: &str = r"(?=\?|$)";

/// Escape a literal for the edge platform's regex dialect.
pub fn escape_edge_literal(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The registered data format a path ends with, if any.
pub fn data_format(path: &str) -> Option<&'static str> {
    DATA_FORMATS.iter().copied().find(|format| {
        path.len() > format.len() + 1
            && path.ends_with(format)
            && path.as_bytes()[path.len() - format.len() - 1] == b'.'
    })
}

struct Parser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    /// Parse until end of input, or until the `)` closing a group opened at `open`.
    fn parse_sequence(&mut self, open: Option<usize>) -> Result<Vec<Node>, PatternError> {
        let mut nodes = Vec::new();
        let mut literal = String::new();

        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'(' => {
                    flush(&mut literal, &mut nodes);
                    let start = self.pos;
                    self.pos += 1;
                    let inner = self.parse_sequence(Some(start))?;
                    nodes.push(Node::Optional(inner));
                }
                b')' => {
                    if open.is_none() {
                        return Err(PatternError::UnopenedGroup {
                            pattern: self.source.to_string(),
                            position: self.pos,
                        });
                    }
                    flush(&mut literal, &mut nodes);
                    self.pos += 1;
                    return Ok(nodes);
                }
                b':' => {
                    flush(&mut literal, &mut nodes);
                    let start = self.pos;
                    self.pos += 1;
                    let name = self.read_name();
                    if name.is_empty() {
                        return Err(PatternError::EmptyParamName {
                            pattern: self.source.to_string(),
                            position: start,
                        });
                    }
                    nodes.push(Node::Param(name));
                }
                b'*' => {
                    flush(&mut literal, &mut nodes);
                    self.pos += 1;
                    let name = self.read_name();
                    let name = if name.is_empty() { DEFAULT_SPLAT.to_string() } else { name };
                    nodes.push(Node::Splat(name));
                }
                _ => {
                    // Patterns are `&str`, so step a whole char at a time.
                    let c = self.source[self.pos..].chars().next().unwrap_or_default();
                    literal.push(c);
                    self.pos += c.len_utf8().max(1);
                }
            }
        }

        if let Some(position) = open {
            return Err(PatternError::UnclosedGroup {
                pattern: self.source.to_string(),
                position,
            });
        }
        flush(&mut literal, &mut nodes);
        Ok(nodes)
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        self.source[start..self.pos].to_string()
    }
}

fn flush(literal: &mut String, nodes: &mut Vec<Node>) {
    if !literal.is_empty() {
        nodes.push(Node::Literal(std::mem::take(literal)));
    }
}

fn collect_params(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Param(name) | Node::Splat(name) => out.push(name.clone()),
            Node::Optional(inner) => collect_params(inner, out),
            Node::Literal(_) => {}
        }
    }
}

fn write_match_regex(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Literal(text) => out.push_str(&regex::escape(text)),
            Node::Param(_) => out.push_str("([^/]+)"),
            Node::Splat(_) => out.push_str("(.*?)"),
            Node::Optional(inner) => {
                out.push_str("(?:");
                write_match_regex(inner, out);
                out.push_str(")?");
            }
        }
    }
}

fn write_edge_regex(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Literal(text) => out.push_str(&escape_edge_literal(text)),
            Node::Param(_) => out.push_str(r"([^/\?]+)"),
            Node::Splat(_) => out.push_str("([^?]*?)"),
            Node::Optional(inner) => {
                out.push_str("(?:");
                write_edge_regex(inner, out);
                out.push_str(")?");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matched(pattern: &str, path: &str) -> Option<PatternMatch> {
        RoutePattern::parse(pattern).unwrap().matches(path)
    }

    #[test]
    fn test_named_params() {
        let m = matched("/c/:id", "/c/1").unwrap();
        assert_eq!(m.params.get("id"), Some("1"));
        assert_eq!(m.format, None);
        assert!(matched("/c/:id", "/c/1/2").is_none());
        assert!(matched("/c/:id", "/c/").is_none());
    }

    #[test]
    fn test_optional_splat() {
        let m = matched("/products/:id(/*seoText)", "/products/1/foo").unwrap();
        assert_eq!(m.params.get("id"), Some("1"));
        assert_eq!(m.params.get("seoText"), Some("foo"));

        let m = matched("/products/:id(/*seoText)", "/products/1").unwrap();
        assert_eq!(m.params.get("id"), Some("1"));
        assert!(m.params.contains("seoText"));
        assert_eq!(m.params.get("seoText"), None);
    }

    #[test]
    fn test_splat_spans_slashes() {
        let m = matched("/foo/*path", "/foo/a/b/c").unwrap();
        assert_eq!(m.params.get("path"), Some("a/b/c"));
    }

    #[test]
    fn test_optional_literal_and_param() {
        assert!(matched("/products/:id(/foo)", "/products/1/foo").is_some());
        assert!(matched("/products/:id(/foo)", "/products/1").is_some());

        let m = matched("/products/:id(/:foo)", "/products/1/2").unwrap();
        assert_eq!(m.params.get("foo"), Some("2"));
    }

    #[test]
    fn test_format_capture() {
        let m = matched("/users/:id.:format", "/users/1.json").unwrap();
        assert_eq!(m.params.get("id"), Some("1"));
        assert_eq!(m.format.as_deref(), Some("json"));

        let m = matched("/users/:id.:format", "/users/1.html").unwrap();
        assert_eq!(m.format.as_deref(), Some("html"));
    }

    #[test]
    fn test_registered_suffix_is_stripped() {
        let m = matched("/p/:id", "/p/foo.json").unwrap();
        assert_eq!(m.params.get("id"), Some("foo"));
        assert_eq!(m.format.as_deref(), Some("json"));

        let m = matched("/p/:id", "/p/foo.amp").unwrap();
        assert_eq!(m.format.as_deref(), Some("amp"));

        let m = matched("/p/:id", "/p/hello.world").unwrap();
        assert_eq!(m.params.get("id"), Some("hello.world"));
        assert_eq!(m.format, None);
    }

    #[test]
    fn test_literal_suffix_route() {
        let m = matched("/users/:id.json", "/users/1.json").unwrap();
        assert_eq!(m.params.get("id"), Some("1"));
        assert_eq!(m.format.as_deref(), Some("json"));
        assert!(matched("/users/:id.html", "/users/1.json").is_none());
    }

    #[test]
    fn test_malformed_patterns() {
        assert!(matches!(
            RoutePattern::parse("/a(/b"),
            Err(PatternError::UnclosedGroup { .. })
        ));
        assert!(matches!(
            RoutePattern::parse("/a/b)"),
            Err(PatternError::UnopenedGroup { .. })
        ));
        assert!(matches!(
            RoutePattern::parse("/a/:id/:id"),
            Err(PatternError::DuplicateParam { .. })
        ));
        assert!(matches!(
            RoutePattern::parse("/a/:/b"),
            Err(PatternError::EmptyParamName { .. })
        ));
        assert!(matches!(
            RoutePattern::parse("a/b"),
            Err(PatternError::MissingLeadingSlash(_))
        ));
    }

    #[test]
    fn test_edge_regex() {
        let p = RoutePattern::parse("/p/:id").unwrap();
        assert_eq!(p.to_edge_regex(".json"), r"^/p/([^/\?]+)\.json(?=\?|$)");
        assert_eq!(p.to_edge_regex(""), r"^/p/([^/\?]+)(?=\?|$)");

        let p = RoutePattern::parse("/foo/*path").unwrap();
        assert_eq!(p.to_edge_regex(""), r"^/foo/([^?]*?)(?=\?|$)");

        let p = RoutePattern::parse("/").unwrap();
        assert_eq!(p.to_edge_regex(".amp"), r"^/\.amp(?=\?|$)");

        let p = RoutePattern::parse("/products/:id(/*seo)").unwrap();
        assert_eq!(
            p.to_edge_regex(""),
            r"^/products/([^/\?]+)(?:/([^?]*?))?(?=\?|$)"
        );
    }

    #[test]
    fn test_param_order() {
        let p = RoutePattern::parse("/foo/:cat(/:id)/*rest").unwrap();
        assert_eq!(p.param_names(), ["cat", "id", "rest"]);
    }

    proptest! {
        #[test]
        fn named_params_never_span_segments(a in "[a-z0-9.]{1,8}", b in "[a-z0-9]{1,8}") {
            let pattern = RoutePattern::parse("/x/:id").unwrap();
            let joined = format!("/x/{}/{}", a, b);
            prop_assert!(pattern.matches(&joined).is_none());
        }
    }
}
