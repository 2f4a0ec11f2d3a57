//! Conversation state: an append-only transcript plus the session's document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// One transcript entry. Ordering is append order, not timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Persona that produced an assistant turn; `None` for user turns.
    pub persona: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
    document: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into(), None);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, persona: impl Into<String>) {
        self.push(Role::Assistant, content.into(), Some(persona.into()));
    }

    fn push(&mut self, role: Role, content: String, persona: Option<String>) {
        self.turns.push(ConversationTurn {
            role,
            content,
            persona,
            timestamp: Some(Utc::now()),
        });
    }

    /// The last `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// The last `limit` turns as model messages.
    pub fn history_for_model(&self, limit: usize) -> Vec<Message> {
        self.recent(limit)
            .iter()
            .map(ConversationTurn::to_message)
            .collect()
    }

    #[cfg(test)]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn set_document(&mut self, document: impl Into<String>) {
        self.document = Some(document.into());
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Drop every turn and the stored document.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.document = None;
    }
}
