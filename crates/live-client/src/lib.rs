//! WebSocket client for realtime live sessions.
//!
//! A [`LiveClient`] owns at most one socket to `<url>/user`. Outbound
//! realtime chunks and content turns are framed as JSON text messages and
//! inbound messages are decoded into [`LiveEvent`]s delivered on a single
//! channel, in arrival order.

mod client;
mod codec;
mod connection;

pub use client::{DEFAULT_URL, LiveClient, LiveClientOptions};
pub use live_core::{ConnectionStatus, LiveEvent, Modality};
