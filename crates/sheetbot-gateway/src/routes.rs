//! HTTP surface: health check, Telegram webhook and a synchronous message API.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sheetbot_core::CommandProcessor;

use crate::telegram::{TelegramClient, Update, SECRET_HEADER};

/// Chat id used for API messages that do not name one.
const API_CHAT_ID: i64 = 0;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<CommandProcessor>,
    pub telegram: Option<Arc<TelegramClient>>,
    pub webhook_secret: Option<String>,
}

#[derive(Deserialize)]
struct MessageRequest {
    message: String,
    #[serde(default)]
    chat_id: Option<i64>,
}

#[derive(Serialize)]
struct MessageResponse {
    status: &'static str,
    message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/api/v1/messages", post(messages))
        .with_state(Arc::new(state))
        .layer(axum::middleware::from_fn(log_requests))
}

async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

async fn health() -> &'static str {
    "OK"
}

/// Acknowledges at once; the message is processed and answered on its own task
/// so a slow build never holds the webhook call open.
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if let Some(expected) = &state.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            tracing::warn!(update_id = update.update_id, "webhook secret mismatch");
            return Err((StatusCode::FORBIDDEN, "invalid secret token".to_string()));
        }
    }
    let telegram = state.telegram.clone().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "telegram is not configured".to_string(),
    ))?;

    let Some((chat_id, text)) = update.text_message() else {
        tracing::debug!(update_id = update.update_id, "update without text ignored");
        return Ok(Json(json!({})));
    };
    if let Some(message) = &update.message {
        tracing::info!(update_id = update.update_id, message_id = message.message_id, chat_id, "message received");
    }

    let processor = state.processor.clone();
    let text = text.to_string();
    tokio::spawn(async move {
        let reply = processor.process(chat_id, &text).await;
        if let Err(e) = telegram.send_message(chat_id, &reply).await {
            tracing::error!(chat_id, error = %e, "failed to deliver reply");
        }
    });

    Ok(Json(json!({})))
}

async fn messages(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let text = req.message.trim();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is empty".to_string()));
    }
    let reply = state
        .processor
        .process(req.chat_id.unwrap_or(API_CHAT_ID), text)
        .await;
    Ok(Json(MessageResponse {
        status: "success",
        message: reply,
    }))
}
