//! Realtime live-session client.
//!
//! Microphone capture, gapless playback, the gateway WebSocket client and
//! the session facade that wires them together. Each part lives in its own
//! workspace crate and is re-exported here.

pub use live_audio as audio;
pub use live_client as client;
pub use live_core as types;
pub use live_voice as session;

pub use live_audio::{AudioContextManager, FakeBackend};
pub use live_client::{LiveClient, LiveClientOptions};
pub use live_core::{ConnectionStatus, LiveError, LiveEvent, Modality};
pub use live_voice::{SessionOptions, VoiceSession};
