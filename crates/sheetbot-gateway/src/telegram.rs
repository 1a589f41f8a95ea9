//! Telegram Bot API: inbound update shapes and the outbound client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Header Telegram sets on webhook calls when a secret was registered.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Bot API limit for one message, in characters.
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Update {
    /// Chat id and text of a text message; `None` for every other update kind.
    pub fn text_message(&self) -> Option<(i64, &str)> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        Some((message.chat.id, text))
    }
}

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("telegram request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("telegram API error {status}: {description}")]
    Api { status: u16, description: String },
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self, TelegramError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<(), TelegramError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);
        let res = self.client.post(url).json(&body).send().await?;
        let status = res.status();
        let text = res.text().await?;
        let parsed: Option<ApiResponse> = serde_json::from_str(&text).ok();
        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(ApiResponse { description, .. }) => Err(TelegramError::Api {
                status: status.as_u16(),
                description: description.unwrap_or(text),
            }),
            None => Err(TelegramError::Api {
                status: status.as_u16(),
                description: text,
            }),
        }
    }

    /// Send `text`, split into several messages when it exceeds the Bot API limit.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.call("sendMessage", json!({ "chat_id": chat_id, "text": chunk }))
                .await?;
        }
        tracing::debug!(chat_id, chars = text.chars().count(), "reply sent");
        Ok(())
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TelegramError> {
        let mut body = json!({ "url": url, "allowed_updates": ["message"] });
        if let Some(secret) = secret {
            body["secret_token"] = json!(secret);
        }
        self.call("setWebhook", body).await?;
        tracing::info!(url = %url, "telegram webhook registered");
        Ok(())
    }
}

fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
