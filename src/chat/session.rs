use std::collections::HashMap;

use super::message::{Message, Role};
use crate::llm::{ChatContext, GenerationConfig};

/// Continuity of one multi-turn exchange with the backend.
#[derive(Debug, Clone)]
pub struct ChatSession {
    context: ChatContext,
}

impl ChatSession {
    /// Build a session from prior history, about to send `pending_user_text`.
    ///
    /// A trailing user message equal to the pending text is left out so the
    /// backend never sees two consecutive user turns. Empty messages are
    /// dropped.
    pub fn new(
        system_instruction: Option<String>,
        config: GenerationConfig,
        history: &[Message],
        pending_user_text: &str,
    ) -> Self {
        let history = init_history(history, pending_user_text);
        Self {
            context: ChatContext {
                system_instruction,
                config,
                history,
            },
        }
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    pub fn history(&self) -> &[Message] {
        &self.context.history
    }

    /// Record a finished exchange. An empty reply records neither turn, so
    /// the history never holds two user turns in a row.
    pub fn record_exchange(&mut self, user_text: &str, reply: &str) {
        if reply.is_empty() {
            return;
        }
        self.context.history.push(Message::user(user_text));
        self.context
            .history
            .push(Message::model(super::message::new_message_id(), reply));
    }
}

pub(crate) fn init_history(history: &[Message], pending_user_text: &str) -> Vec<Message> {
    let history = match history.split_last() {
        Some((last, rest)) if last.role == Role::User && last.text == pending_user_text => rest,
        _ => history,
    };
    history
        .iter()
        .filter(|m| !m.text.is_empty())
        .cloned()
        .collect()
}

/// Chat sessions keyed by conversation id. Owned by whoever drives the chat.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, ChatSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ChatSession> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ChatSession> {
        self.sessions.get_mut(key)
    }

    /// Existing session for `key`, or one built by `init`.
    pub fn get_or_create<F>(&mut self, key: &str, init: F) -> &mut ChatSession
    where
        F: FnOnce() -> ChatSession,
    {
        self.sessions.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!("Creating chat session for {}", key);
            init()
        })
    }

    /// Drop the session so the next send rebuilds it from history.
    pub fn invalidate(&mut self, key: &str) -> bool {
        let removed = self.sessions.remove(key).is_some();
        if removed {
            tracing::debug!("Invalidated chat session for {}", key);
        }
        removed
    }

    pub fn reset(&mut self, key: &str) {
        self.invalidate(key);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
