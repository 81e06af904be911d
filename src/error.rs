//! Error types.
//!
//! Transport and mutation failures are never returned to the view layer as
//! `Err`; they are folded into [`ErrorInfo`] on the relevant fetch state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::poller::Resource;

/// Failure talking to the game server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request never produced a response (connection refused, timeout, ...)
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with GraphQL errors
    #[error("query failed: {0}")]
    Query(String),

    /// Response did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Invalid session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    InvalidVar { var: &'static str, message: String },

    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

/// Session-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Server refused to start the game (already started, not enough players, ...)
    #[error("start game rejected: {kind}")]
    MutationRejected { kind: String },

    /// A poll result from a cancelled subscription.
    #[error("stale {resource} result from generation {generation} (current {current})")]
    StaleWrite {
        resource: Resource,
        generation: u64,
        current: u64,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The session event loop is no longer running.
    #[error("session closed")]
    Closed,
}

/// Error category shown to the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    MutationRejected,
}

/// Error carried inside a fetch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    /// Start-game rejection, `kind` is the server's error type.
    pub fn rejected(kind: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MutationRejected,
            message: kind.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}

impl From<TransportError> for ErrorInfo {
    fn from(err: TransportError) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Transport => write!(f, "{}", self.message),
            ErrorKind::MutationRejected => write!(f, "start game rejected: {}", self.message),
        }
    }
}
