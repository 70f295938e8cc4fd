//! Conversation history for one logical conversation.
//!
//! Append-only: turns are never removed, reordered, or edited. Only the
//! turn orchestrator holds a mutable reference.

use chrono::{DateTime, Local};
use std::fmt;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged message. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    role: Role,
    content: String,
    at: DateTime<Local>,
}

impl Turn {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn at(&self) -> DateTime<Local> {
        self.at
    }
}

#[derive(Debug, Default)]
pub struct ConversationSession {
    turns: Vec<Turn>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Content is trimmed; empty content is rejected.
    pub fn append(&mut self, role: Role, content: &str) -> Result<&Turn, SessionError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::InvalidTurn);
        }

        self.turns.push(Turn {
            role,
            content: content.to_string(),
            at: Local::now(),
        });
        Ok(&self.turns[self.turns.len() - 1])
    }

    /// Read-only view of all turns in insertion order.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
