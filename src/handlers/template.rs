//! Path templates for `transform_path` and `redirect_to`.
//!
//! A template such as `/bar/{cat}/\{raw}` is tokenized into literals,
//! placeholders and escaped braces. Binding it to a route pattern resolves
//! each placeholder to the 1-based position of that param's first appearance.

use thiserror::Error;

use crate::routing::matcher::Params;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{template}` has an unterminated placeholder at byte {position}")]
    Unterminated { template: String, position: usize },

    #[error("template `{template}` has an empty placeholder at byte {position}")]
    EmptyPlaceholder { template: String, position: usize },

    #[error("template `{template}` references `{name}`, which the route pattern does not capture")]
    UnknownParam { template: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Placeholder(String),
    /// `\{`, kept verbatim in edge output and rendered as `{` at runtime.
    EscapedBrace,
}

/// An unbound template, as written by the route author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
}

impl PathTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokenize(&self) -> Result<Vec<Token>, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = self.source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::EscapedBrace);
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::Unterminated {
                            template: self.source.clone(),
                            position: pos,
                        });
                    }
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder {
                            template: self.source.clone(),
                            position: pos,
                        });
                    }
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Placeholder(name));
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(tokens)
    }

    /// Resolve placeholders against the params of a pattern.
    pub fn bind(&self, params: &[String]) -> Result<BoundTemplate, TemplateError> {
        let parts = self
            .tokenize()?
            .into_iter()
            .map(|token| match token {
                Token::Literal(text) => Ok(BoundPart::Literal(text)),
                Token::EscapedBrace => Ok(BoundPart::EscapedBrace),
                Token::Placeholder(name) => match params.iter().position(|p| *p == name) {
                    Some(i) => Ok(BoundPart::Param { name, index: i + 1 }),
                    None => Err(TemplateError::UnknownParam {
                        template: self.source.clone(),
                        name,
                    }),
                },
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BoundTemplate {
            template: self.clone(),
            parts,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundPart {
    Literal(String),
    Param { name: String, index: usize },
    EscapedBrace,
}

/// A template resolved against a concrete route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundTemplate {
    template: PathTemplate,
    parts: Vec<BoundPart>,
}

impl BoundTemplate {
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Edge rewrite expression: placeholders become `\N` back-references.
    pub fn to_rewrite(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                BoundPart::Literal(text) => out.push_str(text),
                BoundPart::Param { index, .. } => {
                    out.push('\\');
                    out.push_str(&index.to_string());
                }
                BoundPart::EscapedBrace => out.push_str("\\{"),
            }
        }
        out
    }

    /// Substitute captured params. Missing params render as empty.
    pub fn render(&self, params: &Params) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                BoundPart::Literal(text) => out.push_str(text),
                BoundPart::Param { name, .. } => out.push_str(params.get(name).unwrap_or_default()),
                BoundPart::EscapedBrace => out.push('{'),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenize() {
        let tokens = PathTemplate::new(r"/bar/\{x}/{x}").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Literal("/bar/".into()),
                Token::EscapedBrace,
                Token::Literal("x}/".into()),
                Token::Placeholder("x".into()),
            ]
        );
    }

    #[test]
    fn test_rewrite_uses_first_appearance() {
        let bound = PathTemplate::new("/bar/{x}/{y}/{x}")
            .bind(&names(&["x", "y"]))
            .unwrap();
        assert_eq!(bound.to_rewrite(), r"/bar/\1/\2/\1");

        let bound = PathTemplate::new("{x}/bar").bind(&names(&["x"])).unwrap();
        assert_eq!(bound.to_rewrite(), r"\1/bar");

        let bound = PathTemplate::new("/bar{x}").bind(&names(&["x"])).unwrap();
        assert_eq!(bound.to_rewrite(), r"/bar\1");
    }

    #[test]
    fn test_escaped_brace_kept_verbatim() {
        let bound = PathTemplate::new(r"/bar/\{x}/{x}")
            .bind(&names(&["x"]))
            .unwrap();
        assert_eq!(bound.to_rewrite(), r"/bar/\{x}/\1");

        let mut params = Params::new();
        params.insert("x", Some("a".into()));
        assert_eq!(bound.render(&params), "/bar/{x}/a");
    }

    #[test]
    fn test_render() {
        let bound = PathTemplate::new("/bar/{x}/x-{y}/{x}")
            .bind(&names(&["x", "y"]))
            .unwrap();
        let mut params = Params::new();
        params.insert("x", Some("1".into()));
        params.insert("y", Some("2".into()));
        assert_eq!(bound.render(&params), "/bar/1/x-2/1");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            PathTemplate::new("/bar/{x").tokenize(),
            Err(TemplateError::Unterminated { .. })
        ));
        assert!(matches!(
            PathTemplate::new("/bar/{}").tokenize(),
            Err(TemplateError::EmptyPlaceholder { .. })
        ));
        assert!(matches!(
            PathTemplate::new("/bar/{z}").bind(&names(&["x"])),
            Err(TemplateError::UnknownParam { .. })
        ));
    }
}
