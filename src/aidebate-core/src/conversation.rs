//! Chat turns, per-speaker logs, and conversation history reconstruction.

use serde::{Deserialize, Serialize};

use crate::model::Side;

/// Role of a chat turn, as sent on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

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

/// The completed turns of one side, in speaking order.
///
/// Append-only for the lifetime of a debate. Failed turns are never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerLog {
    turns: Vec<ChatTurn>,
}

impl SpeakerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed turn.
    pub fn push(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::assistant(content));
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn content(&self, index: usize) -> Option<&str> {
        self.turns.get(index).map(|t| t.content.as_str())
    }
}

/// Build the conversation `side` sees from the two speaker logs.
///
/// For every index `k`, the opponent's k-th turn comes first as a `user`
/// message, followed by this side's own k-th turn as `assistant`. Indices
/// missing from either log are skipped, so the opponent's latest remark ends
/// the history whenever the opponent is one turn ahead.
pub fn build_conversation_history(
    affirmative: &SpeakerLog,
    opposition: &SpeakerLog,
    side: Side,
) -> Vec<ChatTurn> {
    let (own, other) = match side {
        Side::Affirmative => (affirmative, opposition),
        Side::Opposition => (opposition, affirmative),
    };

    let rounds = own.len().max(other.len());
    let mut history = Vec::with_capacity(own.len() + other.len());

    for k in 0..rounds {
        if let Some(remark) = other.content(k) {
            history.push(ChatTurn::user(remark));
        }
        if let Some(reply) = own.content(k) {
            history.push(ChatTurn::assistant(reply));
        }
    }

    history
}
