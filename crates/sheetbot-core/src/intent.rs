//! Keyword intent routing for inbound chat text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CreateSheet,
    Help,
    Chat,
}

/// Requests to build a project sheet.
const CREATE_SHEET_PHRASES: &[&str] = &[
    "создай таблицу", "сделай таблицу", "новая таблица",
    "создать таблицу", "сделать таблицу", "создай лист", "сделай лист",
    "создай проект",
    "create sheet", "create a sheet", "create table", "create a table",
    "new sheet", "new table", "make a sheet", "make a table",
];

const HELP_PHRASES: &[&str] = &[
    "помощь", "справка", "как использовать", "что ты умеешь",
    "как работает", "команды", "инструкция",
    "help", "how to use", "what can you do", "commands",
];

/// Create phrases win over help phrases; anything else is chat.
pub fn classify_intent(text: &str) -> Intent {
    let lower = text.to_lowercase();
    if let Some(p) = CREATE_SHEET_PHRASES.iter().find(|p| lower.contains(*p)) {
        tracing::debug!(phrase = %p, "create-sheet intent");
        return Intent::CreateSheet;
    }
    if HELP_PHRASES.iter().any(|p| lower.contains(p)) {
        return Intent::Help;
    }
    Intent::Chat
}
