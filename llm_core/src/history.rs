//! Chat transcript retained for display, trimmed for the backend.

use serde::{Deserialize, Serialize};

use crate::ChatTurn;

/// Full in-memory transcript.
///
/// Every turn is retained for on-screen display until explicitly reset;
/// only the request sent upstream is bounded. Mutated exclusively by
/// the top-level controller, never by pipeline components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatLog {
    turns: Vec<ChatTurn>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
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

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// The most recent `limit` turns, oldest trimmed first.
    pub fn recent(&self, limit: usize) -> &[ChatTurn] {
        let skip = self.turns.len().saturating_sub(limit);
        &self.turns[skip..]
    }

    /// Replace the content of one displayed turn (user-issued edit).
    pub fn edit(&mut self, index: usize, content: String) {
        if let Some(turn) = self.turns.get_mut(index) {
            turn.content = content;
        }
    }
}
