//! Axum Router Configuration
//!
//! HTTP routing for the service: the `/api` routes and the OpenAPI
//! documentation with its Swagger UI.

use crate::{
    handlers,
    models::{
        CallRequest, CallResponse, CancelRequest, CancelResponse, Chat, ChatResult, ChatState,
        ChatsResult, ErrorResponse, FieldIssue, StatusCallback, StatusResponse, TokenRequest,
        TokenResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_auth_token,
        handlers::place_call,
        handlers::cancel_call,
        handlers::call_status,
        handlers::voice,
        handlers::list_chats,
        handlers::get_chat,
        handlers::upsert_chat,
        handlers::delete_chat,
    ),
    components(
        schemas(Chat, ChatState, ChatResult, ChatsResult, TokenRequest, TokenResponse, FieldIssue, CallRequest, CallResponse, CancelRequest, CancelResponse, StatusCallback, StatusResponse, ErrorResponse)
    ),
    tags(
        (name = "Live API", description = "Session tokens, phone calls and chats for live voice sessions")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/auth-token", post(handlers::create_auth_token))
        .route("/twilio", post(handlers::place_call))
        .route("/twilio/cancel", post(handlers::cancel_call))
        .route("/twilio/status", post(handlers::call_status))
        .route("/twilio/voice", post(handlers::voice))
        .route(
            "/chats",
            get(handlers::list_chats).post(handlers::upsert_chat),
        )
        .route(
            "/chats/{id}",
            get(handlers::get_chat).delete(handlers::delete_chat),
        )
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_router)
}
