//! Shared Application State
//!
//! Holds the clonable resources every handler needs: the chat store, the
//! upstream provider clients and the loaded configuration.

use crate::{
    config::Config,
    providers::{CallControl, TokenProvider},
    store::ChatStore,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub chats: Arc<ChatStore>,
    pub tokens: Arc<dyn TokenProvider>,
    pub calls: Arc<dyn CallControl>,
    pub config: Arc<Config>,
}
