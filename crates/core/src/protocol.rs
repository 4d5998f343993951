//! Defines the JSON frame protocol between a live client and the realtime gateway.

use crate::{LiveError, Result};
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of the `event` tag carried by every outbound media frame.
pub const MEDIA_EVENT: &str = "media";

/// A base64 encoded realtime chunk (`audio/pcm;rate=16000`, `image/jpeg`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub payload: String,
}

impl MediaChunk {
    pub fn new(mime_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            payload: payload.into(),
        }
    }

    /// Wraps little-endian PCM16 bytes captured at `sample_rate`.
    pub fn pcm16(sample_rate: u32, pcm: &[u8]) -> Self {
        Self::new(
            format!("audio/pcm;rate={sample_rate}"),
            base64::engine::general_purpose::STANDARD.encode(pcm),
        )
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.contains("audio")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.contains("image")
    }

    /// Sample rate advertised by a `audio/pcm;rate=N` mime type.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }

    /// Decodes the base64 payload into the raw binary buffer.
    pub fn decode_payload(&self) -> Result<Bytes> {
        let raw = base64::engine::general_purpose::STANDARD.decode(self.payload.as_bytes())?;
        Ok(Bytes::from(raw))
    }
}

/// One part of a content turn.
///
/// Text and inline media have typed fields. Any other part shape, such as a
/// `functionResponse`, travels through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaChunk>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn inline_data(chunk: MediaChunk) -> Self {
        Self {
            inline_data: Some(chunk),
            ..Default::default()
        }
    }

    /// A part carrying a single arbitrary field, e.g. `functionResponse`.
    pub fn field(name: impl Into<String>, value: Value) -> Self {
        let mut part = Self::default();
        part.extra.insert(name.into(), value);
        part
    }
}

/// Frames sent from the client to the gateway.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// A realtime audio/image chunk correlated with the session stream.
    Media {
        media: MediaChunk,
        event: &'static str,
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    /// A content turn.
    Turns {
        turns: Vec<ContentPart>,
        #[serde(rename = "turnComplete")]
        turn_complete: bool,
    },
}

impl OutboundFrame {
    pub fn media(media: MediaChunk, stream_sid: impl Into<String>) -> Self {
        OutboundFrame::Media {
            media,
            event: MEDIA_EVENT,
            stream_sid: stream_sid.into(),
        }
    }

    pub fn turns(turns: Vec<ContentPart>, turn_complete: bool) -> Self {
        OutboundFrame::Turns {
            turns,
            turn_complete,
        }
    }

    /// Serializes the frame into the text payload of a WebSocket message.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Discrete server signals carried in the `event` tag of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    TurnComplete,
    SetupComplete,
    Interrupted,
    /// Any tag this client does not act on.
    Other(String),
}

impl From<&str> for ServerEvent {
    fn from(tag: &str) -> Self {
        match tag {
            "turn_complete" => ServerEvent::TurnComplete,
            "setup_complete" => ServerEvent::SetupComplete,
            "interrupted" => ServerEvent::Interrupted,
            other => ServerEvent::Other(other.to_string()),
        }
    }
}

/// Frames received from the gateway. Every field is optional.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InboundFrame {
    #[serde(default)]
    pub media: Option<MediaChunk>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub event: Option<String>,
}

impl InboundFrame {
    /// Parses the text payload of one inbound WebSocket message.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LiveError::protocol(format!("malformed frame: {e}")))
    }

    pub fn server_event(&self) -> Option<ServerEvent> {
        self.event.as_deref().map(ServerEvent::from)
    }

    /// The `content` field, if it carries anything.
    pub fn content(&self) -> Option<&Value> {
        match &self.content {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(value) => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_frame_wire_shape() {
        let frame = OutboundFrame::media(MediaChunk::new("audio/pcm;rate=16000", "AAAA"), "chat-1");
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "media": {"mimeType": "audio/pcm;rate=16000", "payload": "AAAA"},
                "event": "media",
                "streamSid": "chat-1"
            })
        );
    }

    #[test]
    fn test_turns_frame_wire_shape() {
        let frame = OutboundFrame::turns(vec![ContentPart::text("hello")], true);
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"turns": [{"text": "hello"}], "turnComplete": true})
        );
    }

    #[test]
    fn test_turns_frame_carries_arbitrary_parts() {
        let response = json!({"name": "lookup", "response": {"result": 42}});
        let frame = OutboundFrame::turns(
            vec![
                ContentPart::field("functionResponse", response.clone()),
                ContentPart::text("done"),
            ],
            false,
        );
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "turns": [{"functionResponse": response}, {"text": "done"}],
                "turnComplete": false
            })
        );

        let parsed: ContentPart = serde_json::from_value(value["turns"][0].clone()).unwrap();
        assert_eq!(parsed, ContentPart::field("functionResponse", response));
        assert!(parsed.text.is_none());
    }

    #[test]
    fn test_pcm16_chunk_encodes_payload() {
        let chunk = MediaChunk::pcm16(16000, &[0x00, 0x40, 0xff, 0x7f]);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(chunk.sample_rate(), Some(16000));
        assert!(chunk.is_audio());
        assert!(!chunk.is_image());
        assert_eq!(
            chunk.decode_payload().unwrap().as_ref(),
            &[0x00, 0x40, 0xff, 0x7f]
        );
    }

    #[test]
    fn test_invalid_base64_is_a_protocol_error() {
        let chunk = MediaChunk::new("audio/pcm;rate=24000", "not base64!");
        assert!(matches!(chunk.decode_payload(), Err(LiveError::Protocol(_))));
    }

    #[test]
    fn test_inbound_frame_fields_are_optional() {
        let frame = InboundFrame::parse("{}").unwrap();
        assert_eq!(frame, InboundFrame::default());
        assert!(frame.server_event().is_none());

        let frame = InboundFrame::parse(r#"{"event":"interrupted","content":""}"#).unwrap();
        assert_eq!(frame.server_event(), Some(ServerEvent::Interrupted));
        assert!(frame.content().is_none());
    }

    #[test]
    fn test_unknown_event_tags_are_preserved() {
        let frame = InboundFrame::parse(r#"{"event":"mark"}"#).unwrap();
        assert_eq!(
            frame.server_event(),
            Some(ServerEvent::Other("mark".to_string()))
        );
    }

    #[test]
    fn test_malformed_inbound_frame() {
        assert!(matches!(
            InboundFrame::parse("{\"event\":"),
            Err(LiveError::Protocol(_))
        ));
    }
}
