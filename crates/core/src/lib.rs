//! Shared vocabulary for the live session stack.
//!
//! Everything that crosses a crate boundary lives here: the JSON frames
//! exchanged with the realtime gateway, the typed events a client emits,
//! the observational log entries and the error taxonomy.

pub mod error;
pub mod events;
pub mod protocol;

pub use error::{LiveError, Result};
pub use events::{ClientContentLog, LiveEvent, LogMessage, StreamingLog};
pub use protocol::{ContentPart, InboundFrame, MediaChunk, OutboundFrame, ServerEvent};

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Lifecycle of the single socket owned by a live client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// What the caller intends to exchange over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Audio,
    Text,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Audio => write!(f, "audio"),
            Modality::Text => write!(f, "text"),
        }
    }
}

impl FromStr for Modality {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(Modality::Audio),
            "text" => Ok(Modality::Text),
            other => Err(LiveError::protocol(format!("unknown modality '{other}'"))),
        }
    }
}
