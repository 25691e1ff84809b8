//! Errors raised by handler functions.

use std::error::Error as StdError;
use std::fmt::Write as _;

use thiserror::Error;

/// Failure of a single handler. Always recovered at the chain boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),

    #[error("{message}")]
    Source {
        message: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// An origin/upstream adapter ran without a proxy capability.
    #[error("{adapter} cannot run outside the edge without an upstream capability")]
    Capability { adapter: &'static str },

    #[error("{0} adapter has no handler function bound")]
    Unbound(&'static str),

    #[error("invalid response header: {0}")]
    Header(String),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Message(message.into())
    }

    /// Wrap any error, keeping it as the source.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        HandlerError::Source {
            message: error.to_string(),
            source: Box::new(error),
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::Message(_) | HandlerError::Source { .. } => "handler",
            HandlerError::Capability { .. } => "capability",
            HandlerError::Unbound(_) => "unbound",
            HandlerError::Header(_) => "header",
        }
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, HandlerError::Capability { .. })
    }

    /// The error followed by its source chain, one cause per line.
    pub fn stack(&self) -> String {
        let mut out = format!("HandlerError: {}", self);
        let mut source = self.source();
        while let Some(cause) = source {
            let _ = write!(out, "\n    caused by: {}", cause);
            source = cause.source();
        }
        out
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::new(e)
    }
}

impl From<http::header::InvalidHeaderName> for HandlerError {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        HandlerError::Header(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for HandlerError {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        HandlerError::Header(e.to_string())
    }
}
