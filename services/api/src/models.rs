//! Request and response bodies of the HTTP API, with `utoipa` schemas for
//! the generated OpenAPI document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Model and voice a chat's live session is configured with.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct ChatState {
    #[schema(example = "gemini-2.0-flash-live-001")]
    pub model: String,
    #[schema(example = "Puck")]
    pub voice: String,
}

/// A conversation; its id doubles as the live session's stream id.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub describe: String,
    pub created_at: DateTime<Utc>,
    pub state: ChatState,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatResult {
    pub result: Chat,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatsResult {
    pub result: Vec<Chat>,
}

/// Ephemeral token parameters. Every field is optional.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[schema(value_type = Option<u32>, example = 1)]
    pub uses: Option<Value>,
    #[schema(value_type = Option<f64>, example = 30)]
    pub expire_time_minutes: Option<Value>,
    #[schema(value_type = Option<f64>, example = 1)]
    pub new_session_expire_time_minutes: Option<Value>,
}

/// A validation failure of one request field.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub path: Vec<String>,
    pub message: String,
}

/// Token parameters after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenParams {
    pub uses: u32,
    pub expire_time_minutes: f64,
    pub new_session_expire_time_minutes: f64,
}

impl Default for TokenParams {
    fn default() -> Self {
        Self {
            uses: 1,
            expire_time_minutes: 30.0,
            new_session_expire_time_minutes: 1.0,
        }
    }
}

impl TokenRequest {
    /// Applies defaults and checks each field, collecting every issue.
    pub fn validate(&self) -> Result<TokenParams, Vec<FieldIssue>> {
        let defaults = TokenParams::default();
        let mut issues = Vec::new();

        let uses = match &self.uses {
            None | Some(Value::Null) => defaults.uses,
            Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) if n > 0 => n,
                _ => {
                    issues.push(issue("uses", "Expected a positive integer"));
                    defaults.uses
                }
            },
        };
        let expire_time_minutes = minutes(
            "expireTimeMinutes",
            &self.expire_time_minutes,
            defaults.expire_time_minutes,
            &mut issues,
        );
        let new_session_expire_time_minutes = minutes(
            "newSessionExpireTimeMinutes",
            &self.new_session_expire_time_minutes,
            defaults.new_session_expire_time_minutes,
            &mut issues,
        );

        if !issues.is_empty() {
            return Err(issues);
        }
        Ok(TokenParams {
            uses,
            expire_time_minutes,
            new_session_expire_time_minutes,
        })
    }
}

fn minutes(field: &str, value: &Option<Value>, default: f64, issues: &mut Vec<FieldIssue>) -> f64 {
    match value {
        None | Some(Value::Null) => default,
        Some(value) => match value.as_f64() {
            Some(n) if n > 0.0 && n.is_finite() => n,
            _ => {
                issues.push(issue(field, "Expected a positive number"));
                default
            }
        },
    }
}

fn issue(field: &str, message: &str) -> FieldIssue {
    FieldIssue {
        path: vec![field.to_string()],
        message: message.to_string(),
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CallRequest {
    #[serde(default)]
    #[schema(example = "+8613800000000")]
    pub to: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub call_sid: String,
    pub status: String,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub call_sid: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct CancelResponse {
    pub success: bool,
    pub status: String,
}

/// Form body Twilio posts to the status callback.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "PascalCase")]
pub struct StatusCallback {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub recording_url: Option<String>,
    pub call_duration: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub call_sid: String,
    pub status: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldIssue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            timestamp: None,
        }
    }
}
