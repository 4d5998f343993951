//! Voice client for live sessions.
//!
//! [`VoiceSession`] is the facade a caller drives: it owns a
//! [`live_client::LiveClient`], streams microphone frames into it while
//! capture runs, and plays every inbound audio chunk through a lazily opened
//! playback pipeline. Connection state, volumes and the last error are
//! published on `tokio::sync::watch` channels.

pub mod config;
pub mod session;

pub use session::{CAPTURE_CONTEXT, PLAYBACK_CONTEXT, SessionOptions, VoiceSession};
