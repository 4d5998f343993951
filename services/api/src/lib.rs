//! Live API Library Crate
//!
//! The HTTP side of the live-session stack: ephemeral token minting, Twilio
//! call control and the chat registry. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod router;
pub mod state;
pub mod store;
