//! Error types for tool registration, sessions and invocation

use thiserror::Error;

use crate::oauth::TokenStoreError;
use crate::types::SessionState;

/// One session that failed to close during registry teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCloseFailure {
    pub server_id: String,
    pub message: String,
}

impl std::fmt::Display for SessionCloseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.server_id, self.message)
    }
}

/// Errors surfaced by the registry, the protocol sessions and the transports
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error [{server_id}]: {message}")]
    Transport { server_id: String, message: String },

    #[error("Handshake failed [{server_id}]: {message}")]
    Handshake { server_id: String, message: String },

    /// The remote server answered the call with `isError: true`
    #[error("Tool {tool} returned an error: {message}")]
    Protocol { tool: String, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Session {server_id} is {state}, expected {expected}")]
    InvalidState {
        server_id: String,
        state: SessionState,
        expected: SessionState,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Tool {tool} failed: {message}")]
    Handler { tool: String, message: String },

    #[error("Failed to close {} session(s): {}", .0.len(), join_failures(.0))]
    CloseFailed(Vec<SessionCloseFailure>),

    #[error("Token store error: {0}")]
    TokenStore(#[from] TokenStoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transport(server_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            server_id: server_id.into(),
            message: message.to_string(),
        }
    }

    pub fn handshake(server_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Handshake {
            server_id: server_id.into(),
            message: message.to_string(),
        }
    }

    pub fn handler(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Handler {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error means the underlying connection is unusable
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

fn join_failures(failures: &[SessionCloseFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
