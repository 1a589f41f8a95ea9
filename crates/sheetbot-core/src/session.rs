//! Per-chat conversation history for the free-form assistant.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded history keyed by chat id. Only the newest `max_history` turns are kept.
pub struct SessionStore {
    histories: DashMap<i64, VecDeque<ChatTurn>>,
    max_history: usize,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            histories: DashMap::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn push(&self, chat_id: i64, turn: ChatTurn) {
        let mut entry = self.histories.entry(chat_id).or_default();
        entry.push_back(turn);
        while entry.len() > self.max_history {
            entry.pop_front();
        }
    }

    /// Snapshot of the chat's history, oldest first.
    pub fn history(&self, chat_id: i64) -> Vec<ChatTurn> {
        self.histories
            .get(&chat_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget the chat's history.
    pub fn clear(&self, chat_id: i64) {
        self.histories.remove(&chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_newest_turns() {
        let store = SessionStore::new(3);
        for i in 0..5 {
            store.push(7, ChatTurn::user(format!("m{}", i)));
        }
        let h = store.history(7);
        assert_eq!(
            h.iter().map(|t| t.content.as_str()).collect::<Vec<_>>(),
            vec!["m2", "m3", "m4"]
        );
    }

    #[test]
    fn chats_are_isolated() {
        let store = SessionStore::new(5);
        store.push(1, ChatTurn::user("hi"));
        store.push(2, ChatTurn::assistant("hello"));
        assert_eq!(store.history(1), vec![ChatTurn::user("hi")]);
        assert_eq!(store.history(2)[0].role, ChatRole::Assistant);
        assert!(store.history(3).is_empty());
        store.clear(1);
        assert!(store.history(1).is_empty());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatTurn::assistant("ok")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "ok"}));
    }
}
