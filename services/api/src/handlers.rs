//! Axum Handlers for the REST API
//!
//! Token minting, Twilio call control and chat CRUD. Each handler carries a
//! `utoipa` path annotation feeding the generated OpenAPI document.

use axum::{
    Form,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        CallRequest, CallResponse, CancelRequest, CancelResponse, Chat, ChatResult, ChatsResult,
        ErrorResponse, FieldIssue, StatusCallback, StatusResponse, TokenRequest, TokenResponse,
    },
    providers::TokenGrant,
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    InvalidRequest(Vec<FieldIssue>),
    NotFound(String),
    /// An upstream provider failed; the message is shown to the caller.
    Upstream(String),
    /// A webhook could not be processed; answered with a timestamp.
    Callback(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::InvalidRequest(details) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    details: Some(details),
                    ..ErrorResponse::new("Invalid request data")
                }),
            )
                .into_response(),
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::Upstream(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(message)),
            )
                .into_response(),
            ApiError::Callback(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    timestamp: Some(Utc::now()),
                    ..ErrorResponse::new(message)
                }),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.";
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(message)),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn expires_in(now: DateTime<Utc>, minutes: f64) -> Option<DateTime<Utc>> {
    TimeDelta::try_milliseconds((minutes * 60_000.0) as i64)
        .and_then(|delta| now.checked_add_signed(delta))
}

/// Mint an ephemeral token for a client-side live session.
#[utoipa::path(
    post,
    path = "/api/auth-token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token created", body = TokenResponse),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
        (status = 500, description = "Token provider failed", body = ErrorResponse)
    )
)]
pub async fn create_auth_token(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = body.map_err(bad_json)?;
    let params = request.validate().map_err(ApiError::InvalidRequest)?;

    let now = Utc::now();
    let expiry = |field: &str, minutes: f64| {
        expires_in(now, minutes).ok_or_else(|| {
            ApiError::InvalidRequest(vec![FieldIssue {
                path: vec![field.to_string()],
                message: "Expiry is out of range".to_string(),
            }])
        })
    };
    let grant = TokenGrant {
        uses: params.uses,
        expire_time: expiry("expireTimeMinutes", params.expire_time_minutes)?,
        new_session_expire_time: expiry(
            "newSessionExpireTimeMinutes",
            params.new_session_expire_time_minutes,
        )?,
    };

    let token = state.tokens.create_token(&grant).await.map_err(|e| {
        error!("Error creating auth token: {:?}", e);
        ApiError::Upstream("Failed to create auth token".to_string())
    })?;
    Ok(Json(TokenResponse { token }))
}

/// Place an outbound phone call.
#[utoipa::path(
    post,
    path = "/api/twilio",
    request_body = CallRequest,
    responses(
        (status = 200, description = "Call placed", body = CallResponse),
        (status = 400, description = "Missing phone number", body = ErrorResponse),
        (status = 500, description = "Twilio rejected the call", body = ErrorResponse)
    )
)]
pub async fn place_call(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CallRequest>, JsonRejection>,
) -> Result<Json<CallResponse>, ApiError> {
    let Json(request) = body.map_err(bad_json)?;
    let to = request.to.trim();
    if to.is_empty() {
        return Err(ApiError::BadRequest("Phone number is required".to_string()));
    }

    let call = state
        .calls
        .place_call(to, &state.config.voice_url())
        .await
        .map_err(|e| {
            error!("Twilio call error: {:?}", e);
            ApiError::Upstream(e.to_string())
        })?;
    info!(call_sid = %call.sid, status = %call.status, "Call placed.");
    Ok(Json(CallResponse {
        call_sid: call.sid,
        status: call.status,
    }))
}

/// Cancel a call that has not been answered yet.
#[utoipa::path(
    post,
    path = "/api/twilio/cancel",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Call canceled", body = CancelResponse),
        (status = 400, description = "Missing call id", body = ErrorResponse),
        (status = 500, description = "Twilio rejected the update", body = ErrorResponse)
    )
)]
pub async fn cancel_call(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<CancelResponse>, ApiError> {
    let Json(request) = body.map_err(bad_json)?;
    if request.call_sid.is_empty() {
        return Err(ApiError::BadRequest("Call id is required".to_string()));
    }

    let call = state
        .calls
        .cancel_call(&request.call_sid)
        .await
        .map_err(|e| {
            error!("Twilio cancel error: {:?}", e);
            ApiError::Upstream(e.to_string())
        })?;
    Ok(Json(CancelResponse {
        success: true,
        status: call.status,
    }))
}

/// Twilio call status webhook.
#[utoipa::path(
    post,
    path = "/api/twilio/status",
    request_body(content = StatusCallback, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Status recorded", body = StatusResponse),
        (status = 500, description = "Status update failed", body = ErrorResponse)
    )
)]
pub async fn call_status(
    form: Result<Form<StatusCallback>, axum::extract::rejection::FormRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let failed = |reason: &str| {
        warn!(reason, "Status callback error.");
        ApiError::Callback("Status update failed".to_string())
    };
    let Form(callback) = form.map_err(|e| failed(&e.body_text()))?;
    let call_sid = callback
        .call_sid
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| failed("CallSid is required"))?;

    let has_recording = callback.recording_url.is_some();
    let has_error = callback.error_code.is_some() || callback.error_message.is_some();
    info!(
        call_sid = %call_sid,
        call_status = ?callback.call_status,
        recording_url = ?callback.recording_url,
        duration = ?callback.call_duration,
        error_code = ?callback.error_code,
        error_message = ?callback.error_message,
        has_recording,
        has_error,
        "Call status update."
    );

    Ok(Json(StatusResponse {
        success: true,
        timestamp: Utc::now(),
        call_sid,
        status: callback.call_status,
    }))
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// TwiML document that greets the callee.
pub fn greeting_twiml(greeting: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say voice="alice" language="zh-CN">{}</Say></Response>"#,
        escape_xml(greeting)
    )
}

/// Call instructions Twilio fetches once the callee answers.
#[utoipa::path(
    post,
    path = "/api/twilio/voice",
    responses(
        (status = 200, description = "TwiML greeting", content_type = "text/xml", body = String)
    )
)]
pub async fn voice(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/xml")],
        greeting_twiml(&state.config.greeting),
    )
}

/// List all chats, newest first.
#[utoipa::path(
    get,
    path = "/api/chats",
    responses(
        (status = 200, description = "List of chats", body = ChatsResult)
    )
)]
pub async fn list_chats(State(state): State<Arc<AppState>>) -> Json<ChatsResult> {
    Json(ChatsResult {
        result: state.chats.list().await,
    })
}

/// Get a chat by its id.
#[utoipa::path(
    get,
    path = "/api/chats/{id}",
    responses(
        (status = 200, description = "Chat details", body = ChatResult),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Chat ID")
    )
)]
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChatResult>, ApiError> {
    let chat = state
        .chats
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Chat with id '{}' not found", id)))?;
    Ok(Json(ChatResult { result: chat }))
}

/// Create a chat, or replace the one with the same id. A chat posted
/// without an id is assigned a fresh one.
#[utoipa::path(
    post,
    path = "/api/chats",
    request_body = Chat,
    responses(
        (status = 200, description = "Chat saved", body = ChatResult),
        (status = 400, description = "Bad request", body = ErrorResponse)
    )
)]
pub async fn upsert_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Chat>, JsonRejection>,
) -> Result<Json<ChatResult>, ApiError> {
    let Json(mut chat) = body.map_err(bad_json)?;
    if chat.id.is_empty() {
        chat.id = Uuid::new_v4().to_string();
    }
    Ok(Json(ChatResult {
        result: state.chats.upsert(chat).await,
    }))
}

/// Delete a chat.
#[utoipa::path(
    delete,
    path = "/api/chats/{id}",
    responses(
        (status = 200, description = "Chat deleted", body = ChatResult),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Chat ID")
    )
)]
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChatResult>, ApiError> {
    let chat = state
        .chats
        .delete(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Chat with id '{}' not found", id)))?;
    Ok(Json(ChatResult { result: chat }))
}
