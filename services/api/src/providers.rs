//! Outbound calls to the services the API fronts: ephemeral live-session
//! tokens from Google GenAI and call control through Twilio.

use crate::config::TwilioConfig;
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Parameters of one ephemeral token.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub uses: u32,
    pub expire_time: DateTime<Utc>,
    pub new_session_expire_time: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Mints a token and returns its name.
    async fn create_token(&self, grant: &TokenGrant) -> anyhow::Result<String>;
}

/// A call as reported by the telephony provider.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CallInfo {
    pub sid: String,
    pub status: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Dials `to`; the provider fetches call instructions from `voice_url`.
    async fn place_call(&self, to: &str, voice_url: &str) -> anyhow::Result<CallInfo>;
    async fn cancel_call(&self, call_sid: &str) -> anyhow::Result<CallInfo>;
}

#[derive(Deserialize)]
struct AuthToken {
    name: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamError {
    message: Option<String>,
    error: Option<UpstreamErrorBody>,
}

#[derive(Deserialize)]
struct UpstreamErrorBody {
    message: Option<String>,
}

/// Extracts a readable message from a failed upstream response.
async fn upstream_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<UpstreamError>(&body)
        .ok()
        .and_then(|e| e.message.or_else(|| e.error.and_then(|inner| inner.message)))
        .unwrap_or(body);
    anyhow!("{} ({})", message, status)
}

/// Mints tokens through the GenAI `v1alpha/auth_tokens` endpoint.
pub struct GenAiTokenProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GenAiTokenProvider {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for GenAiTokenProvider {
    #[instrument(skip_all, fields(uses = grant.uses))]
    async fn create_token(&self, grant: &TokenGrant) -> anyhow::Result<String> {
        let response = self
            .http
            .post(format!("{}/v1alpha/auth_tokens", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(grant)
            .send()
            .await
            .context("Failed to reach the GenAI API")?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }
        let token: AuthToken = response
            .json()
            .await
            .context("Invalid auth token response")?;
        debug!("Auth token created.");
        Ok(token.name.unwrap_or_default())
    }
}

/// Places and cancels calls through the Twilio REST API.
pub struct TwilioCalls {
    http: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioCalls {
    pub fn new(http: reqwest::Client, config: TwilioConfig) -> Self {
        Self { http, config }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    async fn post(&self, url: String, form: &[(&str, &str)]) -> anyhow::Result<CallInfo> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await
            .context("Failed to reach the Twilio API")?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }
        response.json().await.context("Invalid Twilio call response")
    }
}

#[async_trait]
impl CallControl for TwilioCalls {
    #[instrument(skip(self))]
    async fn place_call(&self, to: &str, voice_url: &str) -> anyhow::Result<CallInfo> {
        let url = format!("{}.json", self.calls_url());
        self.post(
            url,
            &[
                ("To", to),
                ("From", self.config.phone_number.as_str()),
                ("Url", voice_url),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn cancel_call(&self, call_sid: &str) -> anyhow::Result<CallInfo> {
        let url = format!("{}/{}.json", self.calls_url(), call_sid);
        self.post(url, &[("Status", "canceled")]).await
    }
}
