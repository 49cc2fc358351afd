//! Caller-visible error shape.
//!
//! Every failure that reaches a tool response is flattened into an
//! [`ErrorDescriptor`]: `{"error": "<kind>", "message": "...", "server": "..."}`.
//! Backend layers keep their own `thiserror` enums and convert at the edge.

use serde::Serialize;

/// Error categories surfaced to MCP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown server name, router or Dozzle disabled, empty fleet.
    ConfigError,
    /// Missing or ill-typed tool argument.
    InvalidArgument,
    /// Network failure, timeout or non-2xx from a Netdata agent or Dozzle.
    BackendUnreachable,
    /// Upstream answered with a shape we could not normalize.
    MalformedResponse,
    RouterUnreachable,
    RouterAuthFailed,
    RouterCommandError,
}

/// Structured error returned in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDescriptor {
    pub error: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl ErrorDescriptor {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: kind,
            message: message.into(),
            server: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigError, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Attribute the error to a server.
    pub fn for_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.server {
            Some(server) => write!(f, "{:?} on {}: {}", self.error, server, self.message),
            None => write!(f, "{:?}: {}", self.error, self.message),
        }
    }
}
