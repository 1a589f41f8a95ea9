//! LLM collaborators: project extraction and the free-form chat assistant, both
//! over an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::builder::ProjectRequest;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::session::{ChatRole, ChatTurn};

const EXTRACT_SYSTEM_PROMPT: &str = "Ты помощник, который извлекает структурированную информацию из текста. \
Найди в сообщении название проекта и список разделов. \
Верни только JSON вида {\"project_name\": \"название проекта\", \"sections\": [\"раздел1\", \"раздел2\"]}. \
Сохраняй порядок разделов как в тексте. Если разделов нет, верни пустой список. \
Пример: \"Создай таблицу для проекта Фестиваль с разделами аренда, звук\" -> \
{\"project_name\": \"Фестиваль\", \"sections\": [\"аренда\", \"звук\"]}";

const CHAT_SYSTEM_PROMPT: &str = "Ты помощник в телеграм боте, который может отвечать на вопросы \
и помогать с различными задачами. Отвечай кратко и по существу.";

/// Turns free text into a project request. `Ok(None)` means the text did not
/// contain a usable request.
#[async_trait]
pub trait ProjectExtractor: Send + Sync {
    async fn extract_project_info(&self, text: &str) -> Result<Option<ProjectRequest>, LlmError>;
}

/// Free-form assistant reply given the chat history, newest turn last.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn reply(&self, history: &[ChatTurn]) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<CompletionChoice>>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Validate the extractor's JSON. The name must be non-blank; `sections`, when
/// present, must be an array of strings, and blank entries are dropped.
pub fn parse_project_info(raw: &str) -> Option<ProjectRequest> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let project_name = value.get("project_name")?.as_str()?.trim();
    if project_name.is_empty() {
        return None;
    }
    let sections = match value.get("sections") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let s = item.as_str()?.trim();
                if !s.is_empty() {
                    out.push(s.to_string());
                }
            }
            out
        }
        Some(_) => return None,
    };
    Some(ProjectRequest {
        project_name: project_name.to_string(),
        sections,
    })
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        api_base: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(cfg: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(
            &cfg.api_base,
            &cfg.api_key,
            &cfg.model,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    async fn complete(&self, body: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let res = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api(status.as_u16(), text));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::Empty)
    }
}

#[async_trait]
impl ProjectExtractor for OpenAiClient {
    async fn extract_project_info(&self, text: &str) -> Result<Option<ProjectRequest>, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: EXTRACT_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let raw = self.complete(&body).await?;
        let parsed = parse_project_info(&raw);
        if parsed.is_none() {
            tracing::warn!(raw = %raw, "extractor returned no usable project");
        }
        Ok(parsed)
    }
}

#[async_trait]
impl ChatResponder for OpenAiClient {
    async fn reply(&self, history: &[ChatTurn]) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: CHAT_SYSTEM_PROMPT,
        });
        messages.extend(history.iter().map(|t| ChatMessage {
            role: match t.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: &t.content,
        }));
        let body = CompletionRequest {
            model: &self.model,
            messages,
            response_format: None,
        };
        self.complete(&body).await
    }
}
