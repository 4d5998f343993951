//! Error taxonomy shared by the client, the audio pipelines and the facade.

use crate::ConnectionStatus;
use thiserror::Error;

/// Result type for live session operations.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Failures surfaced by the live session stack.
///
/// Errors are cloneable so they can travel inside [`crate::LiveEvent`]s and
/// observable error state as well as being returned to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    /// The microphone exists but access was refused.
    #[error("Microphone permission denied: {0}")]
    Permission(String),

    /// No capture/playback device or API is available.
    #[error("Audio device not supported: {0}")]
    Unsupported(String),

    /// Socket-level failure (handshake, transport or close).
    #[error("Connection error: {0}")]
    Connection(String),

    /// An inbound frame could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The operation is not valid in the current connection state.
    #[error("Cannot {operation} while {status}")]
    State {
        operation: &'static str,
        status: ConnectionStatus,
    },
}

impl LiveError {
    pub fn permission<S: Into<String>>(msg: S) -> Self {
        Self::Permission(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<base64::DecodeError> for LiveError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Protocol(format!("invalid base64 payload: {err}"))
    }
}
