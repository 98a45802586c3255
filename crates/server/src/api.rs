//! JSON API routes.
//!
//! - `POST /api/chat`        - chat turn, or `?export=1` for the public-only prompt
//! - `POST /api/create-sp`   - build a System Prompt Instance from questionnaire answers
//! - `GET  /health`          - readiness of the config document

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use miled_agent::spi::{CreateSpRequest, CreateSpResponse};
use miled_agent::{AgentRuntime, ChatOutcome, ChatRequest};
use miled_core::{ApplicationError, InterfaceError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub export: Option<String>,
}

impl ChatQuery {
    pub fn is_export(&self) -> bool {
        self.export
            .as_deref()
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/create-sp", post(create_sp))
        .route("/health", get(health::health))
        .layer(cors)
        .with_state(AppState { runtime })
}

pub async fn chat(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    body: String,
) -> ApiResult<ChatOutcome> {
    let correlation_id = Uuid::new_v4().to_string();
    let export = query.is_export();

    let request: ChatRequest = parse_body(&body).map_err(|error| reject(error, &correlation_id))?;
    let bot_type = request.bot_type.clone().unwrap_or_default();

    let outcome = state
        .runtime
        .handle(request, export, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    info!(
        event_name = "chat.request.completed",
        correlation_id = %correlation_id,
        bot_type = %bot_type,
        export,
        "chat request completed"
    );
    Ok(Json(outcome))
}

pub async fn create_sp(State(state): State<AppState>, body: String) -> ApiResult<CreateSpResponse> {
    let correlation_id = Uuid::new_v4().to_string();

    let request: CreateSpRequest =
        parse_body(&body).map_err(|error| reject(error, &correlation_id))?;
    let response = state
        .runtime
        .create_system_prompt(request)
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok(Json(response))
}

/// An empty body reads as `{}`.
fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApplicationError> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body)
        .map_err(|error| ApplicationError::InvalidInput(format!("invalid JSON body: {error}")))
}

fn reject(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let status = status_for(&interface);

    warn!(
        event_name = "api.request.rejected",
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %interface,
        "request rejected"
    );

    (status, Json(ApiError { error: interface.user_message().to_string() }))
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
