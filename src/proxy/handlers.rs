//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};

use super::openapi;
use super::server::AppState;
use super::stream::outbound_sse;
use super::types::{ChatRequest, ChatResponse, ErrorResponse};
use crate::error::Error;

/// Unwrap the JSON body and enforce the non-empty conversation invariant.
fn validate(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, Error> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected malformed request body");
        Error::Validation(rejection.body_text())
    })?;

    if request.messages.is_empty() {
        tracing::warn!("Rejected request with empty conversation");
        return Err(Error::Validation(
            "No messages provided: at least one message is required".to_string(),
        ));
    }

    Ok(request)
}

fn log_failure(endpoint: &str, err: &Error) {
    if err.status_code().is_server_error() {
        tracing::error!(endpoint, error = %err, "Chat completion failed");
    } else {
        tracing::warn!(endpoint, error = %err, "Chat completion rejected");
    }
}

/// Handle POST {prefix}/chat
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Completed chat response", body = ChatResponse),
        (status = 400, description = "Invalid request or missing API key", body = ErrorResponse),
        (status = 500, description = "Provider or server failure", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, Error> {
    let request = validate(payload).inspect_err(|e| log_failure("chat", e))?;

    tracing::info!(
        model = ?request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "Received chat completion request"
    );

    // The stream flag is accepted but this endpoint always answers in one piece
    let response = state
        .client
        .complete(
            &request.messages,
            request.model.as_deref(),
            request.temperature,
            request.max_tokens,
        )
        .await
        .inspect_err(|e| log_failure("chat", e))?;

    Ok(Json(response))
}

/// Handle POST {prefix}/chat/stream
#[utoipa::path(
    post,
    path = "/chat/stream",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "`data: <chunk json>` events ending with `data: [DONE]`",
            content_type = "text/event-stream", body = String),
        (status = 400, description = "Invalid request or missing API key", body = ErrorResponse),
        (status = 500, description = "Provider or server failure", body = ErrorResponse)
    )
)]
pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let mut request = validate(payload).inspect_err(|e| log_failure("chat_stream", e))?;
    request.stream = true;

    tracing::info!(
        model = ?request.model,
        messages = request.messages.len(),
        "Received streaming chat completion request"
    );

    let chunks = state
        .client
        .stream_complete(
            &request.messages,
            request.model.as_deref(),
            request.temperature,
            request.max_tokens,
        )
        .await
        .inspect_err(|e| log_failure("chat_stream", e))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(outbound_sse(chunks)))
        .map_err(|e| Error::Internal(e.to_string()))
}

/// Handle GET {prefix}/health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up, body is `{\"status\":\"ok\"}`"))
)]
pub async fn health() -> impl IntoResponse {
    tracing::debug!("Health check");
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handle GET {prefix}/openapi.json
pub async fn openapi_json(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("Serving OpenAPI document");
    Json(openapi::api_doc(&state.config))
}

/// Handle GET {prefix}/docs
pub async fn docs(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("Serving API docs page");
    Html(openapi::docs_page(&state.config))
}

/// Handle GET / - service metadata
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("Service metadata requested");
    Json(serde_json::json!({
        "message": format!("Welcome to the {}", state.config.api.project_name),
        "docs_url": format!("{}/docs", state.config.api.prefix),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
