//! Message routing: intent -> extraction -> build, help text, or assistant chat.
//! Every path returns the text to send back; failures become generic replies and
//! their details go to the log.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::backend::SpreadsheetBackend;
use crate::builder::{BuilderOptions, ProjectRequest, SheetBuilder, SheetLocator};
use crate::config::TemplateRefs;
use crate::error::BuildError;
use crate::extract::{ChatResponder, ProjectExtractor};
use crate::intent::{classify_intent, Intent};
use crate::retry::{with_retry, RetryPolicy};
use crate::session::{ChatTurn, SessionStore};

pub const WELCOME_TEXT: &str = "👋 Привет! Я бот для создания проектных листов в Google Sheets.

📝 Чтобы создать новый проект, напиши мне сообщение вроде:
Создай таблицу для проекта \"Ремонт офиса\" с разделами организация, материалы, работы

Также ты можешь задать мне любой вопрос, и я постараюсь на него ответить!";

pub const HELP_TEXT: &str = "Я могу создавать листы Google Sheets для ваших проектов и отвечать на вопросы.

Для создания листа напишите что-то вроде:
\"Создай таблицу для проекта X с разделами A, B, C\"

Для обычного общения просто задайте любой вопрос.";

pub const REPHRASE_TEXT: &str =
    "Не удалось извлечь информацию о проекте из сообщения. Пожалуйста, сформулируйте иначе.";

pub const BUILD_FAILED_TEXT: &str =
    "❌ Не удалось создать лист проекта. Пожалуйста, попробуйте позже.";

pub const CHAT_FAILED_TEXT: &str =
    "К сожалению, произошла ошибка при обработке вашего запроса. Пожалуйста, попробуйте позже.";

/// The Sheet Builder behind the Retry Wrapper. Each attempt starts from a fresh
/// builder state; artifacts of failed attempts are left in place.
pub struct SheetService {
    backend: Arc<dyn SpreadsheetBackend>,
    refs: TemplateRefs,
    options: BuilderOptions,
    retry: RetryPolicy,
    /// Per project name; only present with `serialize_builds`.
    name_locks: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl SheetService {
    pub fn new(
        backend: Arc<dyn SpreadsheetBackend>,
        refs: TemplateRefs,
        options: BuilderOptions,
        retry: RetryPolicy,
    ) -> Self {
        let name_locks = options.serialize_builds.then(DashMap::new);
        Self {
            backend,
            refs,
            options,
            retry,
            name_locks,
        }
    }

    /// Held for one attempt only, never across a retry sleep.
    async fn lock_name(&self, project_name: &str) -> Option<OwnedMutexGuard<()>> {
        let locks = self.name_locks.as_ref()?;
        let lock = locks
            .entry(project_name.trim().to_string())
            .or_default()
            .clone();
        Some(lock.lock_owned().await)
    }

    pub async fn create_project_sheet(
        &self,
        request: &ProjectRequest,
    ) -> Result<SheetLocator, BuildError> {
        let result = with_retry(&self.retry, || async move {
            let _guard = self.lock_name(&request.project_name).await;
            SheetBuilder::new(&*self.backend, &self.refs, &self.options)
                .build_project_sheet(request)
                .await
        })
        .await;
        if let Err(e) = &result {
            tracing::error!(
                project = %request.project_name,
                step = %e.step().map(|s| s.to_string()).unwrap_or_default(),
                error = %e,
                "project sheet build failed"
            );
        }
        result
    }
}

pub struct CommandProcessor {
    extractor: Arc<dyn ProjectExtractor>,
    responder: Arc<dyn ChatResponder>,
    sheets: SheetService,
    sessions: SessionStore,
}

impl CommandProcessor {
    pub fn new(
        extractor: Arc<dyn ProjectExtractor>,
        responder: Arc<dyn ChatResponder>,
        sheets: SheetService,
        sessions: SessionStore,
    ) -> Self {
        Self {
            extractor,
            responder,
            sheets,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn process(&self, chat_id: i64, text: &str) -> String {
        let text = text.trim();
        if text == "/start" {
            self.sessions.clear(chat_id);
            return WELCOME_TEXT.to_string();
        }
        let intent = classify_intent(text);
        tracing::info!(chat_id, intent = ?intent, "message routed");
        match intent {
            Intent::CreateSheet => self.create_sheet(text).await,
            Intent::Help => HELP_TEXT.to_string(),
            Intent::Chat => self.chat(chat_id, text).await,
        }
    }

    async fn create_sheet(&self, text: &str) -> String {
        let request = match self.extractor.extract_project_info(text).await {
            Ok(Some(request)) => request,
            Ok(None) => return REPHRASE_TEXT.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "project extraction failed");
                return REPHRASE_TEXT.to_string();
            }
        };
        match self.sheets.create_project_sheet(&request).await {
            Ok(locator) => success_text(&request, &locator),
            Err(_) => BUILD_FAILED_TEXT.to_string(),
        }
    }

    async fn chat(&self, chat_id: i64, text: &str) -> String {
        self.sessions.push(chat_id, ChatTurn::user(text));
        let history = self.sessions.history(chat_id);
        match self.responder.reply(&history).await {
            Ok(answer) => {
                self.sessions.push(chat_id, ChatTurn::assistant(answer.clone()));
                answer
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "assistant reply failed");
                CHAT_FAILED_TEXT.to_string()
            }
        }
    }
}

fn success_text(request: &ProjectRequest, locator: &SheetLocator) -> String {
    let sections = if request.sections.is_empty() {
        "нет".to_string()
    } else {
        request.sections.join(", ")
    };
    format!(
        "✅ Лист проекта успешно создан!\n\n📋 Название проекта: {}\n📑 Разделы: {}\n🔗 Ссылка: {}",
        request.project_name, sections, locator
    )
}
