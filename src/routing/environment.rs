//! Runtime environment gate.

use std::fmt;

/// Environment variable selecting the runtime mode.
pub const RUNTIME_ENV_VAR: &str = "EDGE_ROUTER_RUNTIME";

/// Where a dispatch is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Server,
    Client,
}

impl Environment {
    /// Read the runtime mode from `EDGE_ROUTER_RUNTIME` (`client` or `server`).
    pub fn from_env() -> Self {
        match std::env::var(RUNTIME_ENV_VAR) {
            Ok(value) if value.eq_ignore_ascii_case("client") => Environment::Client,
            _ => Environment::Server,
        }
    }

    pub fn is_client(self) -> bool {
        self == Environment::Client
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Server => "server",
            Environment::Client => "client",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
