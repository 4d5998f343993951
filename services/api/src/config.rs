use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Greeting spoken to the callee when no `TWIML_GREETING` is configured.
pub const DEFAULT_GREETING: &str = "你好，我是 AI 助手，很高兴为你服务。";

/// Credentials and caller id of the Twilio account placing calls.
#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    pub api_base: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub genai_base_url: String,
    pub twilio: TwilioConfig,
    /// Externally reachable origin of this service, used for Twilio webhooks.
    pub public_base_url: String,
    pub greeting: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = required("GEMINI_API_KEY")?;
        let genai_base_url = std::env::var("GENAI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());

        let twilio = TwilioConfig {
            account_sid: required("TWILIO_ACCOUNT_SID")?,
            auth_token: required("TWILIO_AUTH_TOKEN")?,
            phone_number: required("TWILIO_PHONE_NUMBER")?,
            api_base: std::env::var("TWILIO_API_BASE")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
        };

        // A Vercel deployment URL wins over the explicit base URL.
        let public_base_url = match std::env::var("VERCEL_URL") {
            Ok(host) if !host.is_empty() => format!("https://{host}"),
            _ => std::env::var("PUBLIC_BASE_URL")
                .ok()
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    ConfigError::MissingVar(
                        "Either VERCEL_URL or PUBLIC_BASE_URL must be set".to_string(),
                    )
                })?,
        };
        let public_base_url = public_base_url.trim_end_matches('/').to_string();

        let greeting =
            std::env::var("TWIML_GREETING").unwrap_or_else(|_| DEFAULT_GREETING.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            genai_base_url,
            twilio,
            public_base_url,
            greeting,
            log_level,
        })
    }

    /// URL Twilio fetches call instructions from.
    pub fn voice_url(&self) -> String {
        format!("{}/api/twilio/voice", self.public_base_url)
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
}
