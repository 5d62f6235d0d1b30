//! Conversation history for one session.

use crate::llm::{ChatMessage, Role};

/// Ordered chat history. The first message is always the system prompt.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing beyond the system prompt has been said.
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }

    /// Number of user turns so far.
    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// Drop everything after the first `len` messages (never the system prompt).
    pub(crate) fn truncate(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }

    /// Forget the history, keeping the system prompt.
    pub fn reset(&mut self) {
        self.truncate(1);
    }
}
