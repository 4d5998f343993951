//! Terminal voice client.
//!
//! Connects to the live gateway for one chat, streams the default microphone
//! into the session and plays the replies on the default output device.
//! Text content from the server is printed to stdout.

use anyhow::{Context, bail};
use clap::Parser;
use live_audio::{AudioContextManager, CpalBackend};
use live_client::LiveClientOptions;
use live_core::{LiveEvent, Modality};
use live_voice::{SessionOptions, VoiceSession, config::Config};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Talk to a live session from the terminal")]
struct Args {
    /// Gateway base URL, overrides LIVE_WS_URL.
    #[arg(long)]
    url: Option<String>,

    /// Chat id used as the session stream id.
    #[arg(long)]
    chat_id: String,

    #[arg(long, default_value = "audio")]
    modality: Modality,

    /// Text turn to send right after connecting.
    #[arg(long)]
    text: Option<String>,

    /// Do not open the microphone.
    #[arg(long)]
    no_mic: bool,
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let mut options = SessionOptions::from(&config);
    if let Some(url) = args.url {
        options.client = LiveClientOptions::new(url);
    }
    info!(url = %options.client.url, chat_id = %args.chat_id, modality = %args.modality, "Starting voice session...");

    let audio = Arc::new(AudioContextManager::new(Arc::new(CpalBackend::new())));
    let (session, mut events) = VoiceSession::new(options, audio);

    if !session
        .connect(&args.chat_id, args.modality)
        .await
        .context("Failed to connect to the live gateway")?
    {
        bail!("Session was not opened");
    }

    if let Some(text) = &args.text {
        session.send_text(text);
    }
    if args.modality == Modality::Audio && !args.no_mic {
        session
            .start_capture()
            .await
            .context("Failed to start the microphone")?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal. Closing session...");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(LiveEvent::Content(content)) => println!("{}", content_text(&content)),
                    Some(LiveEvent::TurnComplete) => info!("Turn complete."),
                    Some(LiveEvent::SetupComplete) => info!("Setup complete."),
                    Some(LiveEvent::Interrupted) => info!("Interrupted, playback flushed."),
                    Some(LiveEvent::Error(e)) => warn!("Session error: {}", e),
                    Some(LiveEvent::Close { reason }) => {
                        info!(?reason, "Session closed by server.");
                        break;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    session.shutdown();
    Ok(())
}
