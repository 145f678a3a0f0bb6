// Conversation memory
// Ordered, append-only log of the turns of one chat session


use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    #[inline]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    #[inline]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Turns of a single session, oldest first
///
/// Only the orchestrator appends; everything else gets read-only access.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
        });
    }

    /// Every turn in insertion order
    #[inline]
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, still oldest first
    #[inline]
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// At most the last `n` turns, starting on a user turn
    ///
    /// An assistant reply whose question fell outside the window is dropped.
    #[inline]
    pub fn recent_exchanges(&self, n: usize) -> &[Turn] {
        let recent = self.recent(n);
        match recent.split_first() {
            Some((first, rest)) if first.role == Role::Assistant => rest,
            _ => recent,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
