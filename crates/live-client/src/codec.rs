//! Turns inbound gateway messages into typed [`LiveEvent`]s.

use bytes::Bytes;
use live_core::{InboundFrame, LiveEvent, Result, ServerEvent};
use tracing::debug;

/// Decodes one inbound text message.
///
/// Events come out in the order audio, content, server signal. Any decode
/// failure rejects the whole message so no partial set of events escapes.
pub(crate) fn decode_text_frame(text: &str) -> Result<Vec<LiveEvent>> {
    let frame = InboundFrame::parse(text)?;
    let mut events = Vec::with_capacity(3);

    if let Some(media) = &frame.media {
        events.push(LiveEvent::Audio(media.decode_payload()?));
    }
    if let Some(content) = frame.content() {
        events.push(LiveEvent::Content(content.clone()));
    }
    match frame.server_event() {
        Some(ServerEvent::TurnComplete) => events.push(LiveEvent::TurnComplete),
        Some(ServerEvent::SetupComplete) => events.push(LiveEvent::SetupComplete),
        Some(ServerEvent::Interrupted) => events.push(LiveEvent::Interrupted),
        Some(ServerEvent::Other(tag)) => debug!(event = %tag, "Ignoring unknown server event"),
        None => {}
    }

    Ok(events)
}

/// Binary frames carry raw PCM16 audio.
pub(crate) fn decode_binary_frame(data: impl Into<Bytes>) -> LiveEvent {
    LiveEvent::Audio(data.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use live_core::LiveError;
    use serde_json::json;

    #[test]
    fn test_media_frame_decodes_to_single_audio_event() {
        let pcm = [1u8, 2, 3, 4, 5, 6];
        let payload = base64::engine::general_purpose::STANDARD.encode(pcm);
        let text = json!({"media": {"mimeType": "audio/pcm;rate=24000", "payload": payload}})
            .to_string();

        let events = decode_text_frame(&text).unwrap();
        assert_eq!(events, vec![LiveEvent::Audio(Bytes::copy_from_slice(&pcm))]);
    }

    #[test]
    fn test_content_and_event_ordering() {
        let text = json!({"content": "hello", "event": "turn_complete"}).to_string();
        let events = decode_text_frame(&text).unwrap();
        assert_eq!(
            events,
            vec![LiveEvent::Content(json!("hello")), LiveEvent::TurnComplete]
        );
    }

    #[test]
    fn test_named_events() {
        assert_eq!(
            decode_text_frame(r#"{"event":"setup_complete"}"#).unwrap(),
            vec![LiveEvent::SetupComplete]
        );
        assert_eq!(
            decode_text_frame(r#"{"event":"interrupted"}"#).unwrap(),
            vec![LiveEvent::Interrupted]
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert!(decode_text_frame(r#"{"event":"mark"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_messages_fail_with_protocol_error() {
        assert!(matches!(
            decode_text_frame("not json"),
            Err(LiveError::Protocol(_))
        ));
        assert!(matches!(
            decode_text_frame(r#"{"media":{"mimeType":"audio/pcm","payload":"%%%"},"content":"x"}"#),
            Err(LiveError::Protocol(_))
        ));
    }

    #[test]
    fn test_binary_frame_is_audio() {
        assert_eq!(
            decode_binary_frame(vec![0u8, 1]),
            LiveEvent::Audio(Bytes::from_static(&[0, 1]))
        );
    }
}
