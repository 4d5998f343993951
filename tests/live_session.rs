//! End-to-end runs of the client and the session facade against an
//! in-process gateway.

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use live_session::{
    AudioContextManager, ConnectionStatus, FakeBackend, LiveClient, LiveClientOptions, LiveError,
    LiveEvent, Modality, SessionOptions, VoiceSession,
    audio::pcm,
    types::{ContentPart, MediaChunk},
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

const WAIT: Duration = Duration::from_secs(2);

/// One accepted gateway connection and the path it was opened on.
struct Peer {
    path: String,
    socket: WebSocketStream<TcpStream>,
}

impl Peer {
    async fn send_json(&mut self, frame: Value) {
        self.socket
            .send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    async fn recv_json(&mut self) -> Value {
        loop {
            let message = timeout(WAIT, self.socket.next())
                .await
                .expect("no frame from client")
                .expect("socket ended")
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }
}

struct Gateway {
    url: String,
    peers: mpsc::UnboundedReceiver<Peer>,
}

impl Gateway {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, peers) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut path = String::new();
                    let record_path = |request: &Request, response: Response| {
                        path = request.uri().path().to_string();
                        Ok(response)
                    };
                    if let Ok(socket) = accept_hdr_async(stream, record_path).await {
                        let _ = tx.send(Peer { path, socket });
                    }
                });
            }
        });
        Self { url, peers }
    }

    async fn accept(&mut self) -> Peer {
        timeout(WAIT, self.peers.recv())
            .await
            .expect("client never connected")
            .unwrap()
    }
}

/// Next event that is not a `Log`.
async fn next_event(events: &mut mpsc::UnboundedReceiver<LiveEvent>) -> LiveEvent {
    loop {
        match timeout(WAIT, events.recv()).await.expect("no event").unwrap() {
            LiveEvent::Log(_) => continue,
            event => return event,
        }
    }
}

fn audio_frame(samples: &[f32]) -> Value {
    json!({
        "media": {
            "mimeType": "audio/pcm;rate=24000",
            "payload": base64::engine::general_purpose::STANDARD.encode(pcm::f32_to_pcm16(samples)),
        }
    })
}

#[tokio::test]
async fn test_connect_opens_user_endpoint() {
    let mut gateway = Gateway::start().await;
    let (client, mut events) = LiveClient::new(LiveClientOptions::new(&gateway.url));

    assert!(client.connect("chat-1", Modality::Audio).await.unwrap());
    let peer = gateway.accept().await;

    assert_eq!(peer.path, "/user");
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.stream_sid().as_deref(), Some("chat-1"));
    match events.recv().await {
        Some(LiveEvent::Log(log)) => assert_eq!(log.kind, "client.open"),
        other => panic!("expected the open log, got {other:?}"),
    }
    assert!(matches!(events.recv().await, Some(LiveEvent::Open)));
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let mut gateway = Gateway::start().await;
    let (client, _events) = LiveClient::new(LiveClientOptions::new(&gateway.url));

    assert!(client.connect("chat-1", Modality::Audio).await.unwrap());
    let _peer = gateway.accept().await;

    assert!(!client.connect("chat-2", Modality::Text).await.unwrap());
    assert_eq!(client.stream_sid().as_deref(), Some("chat-1"));
    assert_eq!(client.modality(), Modality::Audio);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_outbound_frame_shapes() {
    let mut gateway = Gateway::start().await;
    let (client, _events) = LiveClient::new(LiveClientOptions::new(&gateway.url));
    client.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;

    client.send_realtime_input(vec![live_session::types::MediaChunk::pcm16(
        16000,
        &[1, 0, 2, 0],
    )]);
    assert_eq!(
        peer.recv_json().await,
        json!({
            "media": { "mimeType": "audio/pcm;rate=16000", "payload": "AQACAA==" },
            "event": "media",
            "streamSid": "chat-1"
        })
    );

    client.send(vec![live_session::types::ContentPart::text("hi")], true);
    assert_eq!(
        peer.recv_json().await,
        json!({ "turns": [{ "text": "hi" }], "turnComplete": true })
    );
}

#[tokio::test]
async fn test_inbound_frames_become_events() {
    let mut gateway = Gateway::start().await;
    let (client, mut events) = LiveClient::new(LiveClientOptions::new(&gateway.url));
    client.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Open));

    let samples = [0.5f32; 32];
    peer.send_json(audio_frame(&samples)).await;
    match next_event(&mut events).await {
        LiveEvent::Audio(data) => assert_eq!(data.as_ref(), pcm::f32_to_pcm16(&samples).as_slice()),
        other => panic!("expected audio, got {other:?}"),
    }

    // Malformed input is reported and the connection stays up.
    peer.socket
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        LiveEvent::Error(LiveError::Protocol(_))
    ));

    peer.send_json(json!({ "content": "hello" })).await;
    assert!(matches!(
        next_event(&mut events).await,
        LiveEvent::Content(Value::String(text)) if text == "hello"
    ));

    peer.send_json(json!({ "event": "interrupted" })).await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Interrupted));
    peer.send_json(json!({ "event": "turn_complete" })).await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::TurnComplete));
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_server_close_is_reported() {
    let mut gateway = Gateway::start().await;
    let (client, mut events) = LiveClient::new(LiveClientOptions::new(&gateway.url));
    client.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Open));

    peer.socket
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

    match next_event(&mut events).await {
        LiveEvent::Close { reason } => assert_eq!(reason.as_deref(), Some("bye")),
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(!client.disconnect());
}

#[tokio::test]
async fn test_disconnect_closes_socket_once() {
    let mut gateway = Gateway::start().await;
    let (client, mut events) = LiveClient::new(LiveClientOptions::new(&gateway.url));
    client.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Open));

    assert!(client.disconnect());
    assert!(!client.disconnect());
    assert!(matches!(
        next_event(&mut events).await,
        LiveEvent::Close { reason: None }
    ));

    let closed = timeout(WAIT, async {
        while let Some(Ok(message)) = peer.socket.next().await {
            if message.is_close() {
                return true;
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);

    // Nothing else arrives for the closed socket.
    assert!(
        timeout(Duration::from_millis(200), next_event(&mut events))
            .await
            .is_err()
    );
    assert!(client.connect("chat-2", Modality::Text).await.unwrap());
}

#[tokio::test]
async fn test_outbound_frames_keep_call_order() {
    let mut gateway = Gateway::start().await;
    let (client, _events) = LiveClient::new(LiveClientOptions::new(&gateway.url));
    client.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;

    let tool_result = json!({ "name": "lookup", "response": { "result": 42 } });
    client.send_realtime_input(vec![
        MediaChunk::pcm16(16000, &[1, 0]),
        MediaChunk::pcm16(16000, &[2, 0]),
    ]);
    client.send(vec![ContentPart::text("first")], false);
    client.send_realtime_input(vec![MediaChunk::new("image/jpeg", "/9j/")]);
    client.send(
        vec![ContentPart::field("functionResponse", tool_result.clone())],
        true,
    );

    assert_eq!(peer.recv_json().await["media"]["payload"], "AQA=");
    assert_eq!(peer.recv_json().await["media"]["payload"], "AgA=");
    assert_eq!(
        peer.recv_json().await,
        json!({ "turns": [{ "text": "first" }], "turnComplete": false })
    );
    assert_eq!(peer.recv_json().await["media"]["mimeType"], "image/jpeg");
    assert_eq!(
        peer.recv_json().await,
        json!({ "turns": [{ "functionResponse": tool_result }], "turnComplete": true })
    );
}

#[tokio::test]
async fn test_no_inbound_events_after_disconnect() {
    let mut gateway = Gateway::start().await;
    let (client, mut events) = LiveClient::new(LiveClientOptions::new(&gateway.url));

    for round in 0..10 {
        client.connect("chat-1", Modality::Audio).await.unwrap();
        let mut peer = gateway.accept().await;
        assert!(matches!(next_event(&mut events).await, LiveEvent::Open));

        let burst = tokio::spawn(async move {
            for _ in 0..200 {
                let frame = audio_frame(&[0.5; 64]).to_string();
                if peer.socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            peer
        });

        assert!(matches!(next_event(&mut events).await, LiveEvent::Audio(_)));
        assert!(client.disconnect());
        loop {
            match next_event(&mut events).await {
                LiveEvent::Close { reason } => {
                    assert_eq!(reason, None);
                    break;
                }
                LiveEvent::Audio(_) => {}
                other => panic!("unexpected event before close: {other:?}"),
            }
        }

        let late = timeout(Duration::from_millis(100), next_event(&mut events)).await;
        assert!(late.is_err(), "round {round}: event after close: {late:?}");
        drop(burst.await.unwrap());
    }
}

#[tokio::test]
async fn test_dropping_client_closes_socket() {
    let mut gateway = Gateway::start().await;
    let (client, events) = LiveClient::new(LiveClientOptions::new(&gateway.url));
    client.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;

    let clone = client.clone();
    drop(client);
    drop(events);
    // Another handle still drives the socket.
    clone.send(vec![ContentPart::text("still here")], true);
    assert_eq!(peer.recv_json().await["turns"][0]["text"], "still here");

    drop(clone);
    let closed = timeout(Duration::from_secs(1), async {
        while let Some(Ok(message)) = peer.socket.next().await {
            if message.is_close() {
                return;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket stayed open after the last client was dropped");
}

fn voice_session(
    url: &str,
    backend: &FakeBackend,
) -> (VoiceSession, mpsc::UnboundedReceiver<LiveEvent>) {
    let audio = Arc::new(AudioContextManager::new(Arc::new(backend.clone())));
    let options = SessionOptions {
        client: LiveClientOptions::new(url),
        ..SessionOptions::default()
    };
    VoiceSession::new(options, audio)
}

#[tokio::test]
async fn test_session_plays_audio_and_flushes_on_interrupt() {
    let mut gateway = Gateway::start().await;
    let backend = FakeBackend::new();
    let (session, mut events) = voice_session(&gateway.url, &backend);

    assert!(session.connect("chat-1", Modality::Audio).await.unwrap());
    let mut peer = gateway.accept().await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Open));
    assert!(session.connected());

    peer.send_json(audio_frame(&[0.5; 4800])).await;
    assert!(
        backend
            .wait_until(|b| b.render(16).iter().any(|&s| s > 0.4))
            .await
    );
    assert!(session.volume() > 0.0);

    peer.send_json(json!({ "event": "interrupted" })).await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Interrupted));
    assert!(backend.render(256).iter().all(|&s| s == 0.0));

    session.shutdown();
    assert!(backend.wait_until(|b| b.active_outputs() == 0).await);
}

#[tokio::test]
async fn test_session_disconnect_discards_queued_audio() {
    let mut gateway = Gateway::start().await;
    let backend = FakeBackend::new();
    let (session, mut events) = voice_session(&gateway.url, &backend);

    session.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Open));

    peer.send_json(audio_frame(&[0.5; 2400])).await;
    assert!(
        backend
            .wait_until(|b| b.render(16).iter().any(|&s| s > 0.4))
            .await
    );
    for _ in 0..50 {
        peer.send_json(audio_frame(&[0.5; 2400])).await;
    }

    assert!(session.disconnect());
    loop {
        if let LiveEvent::Close { .. } = next_event(&mut events).await {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(backend.render(4800).iter().all(|&s| s == 0.0));
    assert!(!session.connected());
}

#[tokio::test]
async fn test_dropping_session_closes_socket() {
    let mut gateway = Gateway::start().await;
    let backend = FakeBackend::new();
    let (session, _events) = voice_session(&gateway.url, &backend);

    session.connect("chat-1", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;

    drop(session);
    let closed = timeout(Duration::from_secs(1), async {
        while let Some(Ok(message)) = peer.socket.next().await {
            if message.is_close() {
                return;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_session_streams_microphone_frames() {
    let mut gateway = Gateway::start().await;
    let backend = FakeBackend::new();
    let (session, mut events) = voice_session(&gateway.url, &backend);

    session.connect("chat-7", Modality::Audio).await.unwrap();
    let mut peer = gateway.accept().await;
    assert!(matches!(next_event(&mut events).await, LiveEvent::Open));

    session.start_capture().await.unwrap();
    assert_eq!(backend.speak(&[0.25; live_session::audio::worklet::FRAME_SAMPLES]), 1);

    let frame = peer.recv_json().await;
    assert_eq!(frame["event"], "media");
    assert_eq!(frame["streamSid"], "chat-7");
    assert_eq!(frame["media"]["mimeType"], "audio/pcm;rate=16000");
    let payload = base64::engine::general_purpose::STANDARD
        .decode(frame["media"]["payload"].as_str().unwrap())
        .unwrap();
    assert_eq!(payload.len(), live_session::audio::worklet::FRAME_SAMPLES * 2);

    assert!(session.disconnect());
    assert!(!session.is_capturing());
    assert!(!session.connected());
    assert!(backend.wait_until(|b| b.active_inputs() == 0).await);
}
