use crate::{ContentPart, LiveError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed notifications emitted by a live client, in socket order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Open,
    Close { reason: Option<String> },
    Error(LiveError),
    /// Decoded PCM16 bytes from an inbound media frame.
    Audio(Bytes),
    Content(Value),
    TurnComplete,
    SetupComplete,
    Interrupted,
    Log(StreamingLog),
}

impl LiveEvent {
    /// Short name used when logging an event.
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Open => "open",
            LiveEvent::Close { .. } => "close",
            LiveEvent::Error(_) => "error",
            LiveEvent::Audio(_) => "audio",
            LiveEvent::Content(_) => "content",
            LiveEvent::TurnComplete => "turncomplete",
            LiveEvent::SetupComplete => "setupcomplete",
            LiveEvent::Interrupted => "interrupted",
            LiveEvent::Log(_) => "log",
        }
    }
}

/// A timestamped observational record of client/server activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingLog {
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: LogMessage,
}

impl StreamingLog {
    pub fn new(kind: impl Into<String>, message: impl Into<LogMessage>) -> Self {
        Self {
            date: Utc::now(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogMessage {
    Text(String),
    Content(ClientContentLog),
}

impl From<String> for LogMessage {
    fn from(text: String) -> Self {
        LogMessage::Text(text)
    }
}

impl From<&str> for LogMessage {
    fn from(text: &str) -> Self {
        LogMessage::Text(text.to_string())
    }
}

impl From<ClientContentLog> for LogMessage {
    fn from(content: ClientContentLog) -> Self {
        LogMessage::Content(content)
    }
}

/// Copy of a content turn as it was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentLog {
    pub turns: Vec<ContentPart>,
    pub turn_complete: bool,
}
