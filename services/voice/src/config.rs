use live_audio::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
use live_client::DEFAULT_URL;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings of the voice client, loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub ws_url: String,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let ws_url = std::env::var("LIVE_WS_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(
                "LIVE_WS_URL".to_string(),
                format!("'{ws_url}' is not a ws:// or wss:// URL"),
            ));
        }

        let capture_sample_rate = sample_rate("CAPTURE_SAMPLE_RATE", CAPTURE_SAMPLE_RATE)?;
        let playback_sample_rate = sample_rate("PLAYBACK_SAMPLE_RATE", PLAYBACK_SAMPLE_RATE)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            ws_url,
            capture_sample_rate,
            playback_sample_rate,
            log_level,
        })
    }
}

fn sample_rate(var: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => match value.parse::<u32>() {
            Ok(rate) if rate > 0 => Ok(rate),
            _ => Err(ConfigError::InvalidValue(
                var.to_string(),
                format!("'{value}' is not a positive sample rate"),
            )),
        },
    }
}
