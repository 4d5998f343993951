//! Main Entrypoint for the Live API Service
//!
//! Loads configuration, builds the provider clients and the chat store,
//! then serves the router until Ctrl+C.

use anyhow::Context;
use live_api::{
    config::Config,
    providers::{GenAiTokenProvider, TwilioCalls},
    router::create_router,
    state::AppState,
    store::ChatStore,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Upstream Clients ---
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let tokens = Arc::new(GenAiTokenProvider::new(
        http.clone(),
        config.genai_base_url.clone(),
        config.gemini_api_key.clone(),
    ));
    let calls = Arc::new(TwilioCalls::new(http, config.twilio.clone()));

    let app_state = Arc::new(AppState {
        chats: Arc::new(ChatStore::new()),
        tokens,
        calls,
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        bind_address = %config.bind_address,
        public_base_url = %config.public_base_url,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
