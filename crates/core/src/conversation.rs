//! Conversation turns and the bounded sliding window of recent turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One completed user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The user's message.
    pub user: String,

    /// The model's answer.
    pub assistant: String,

    /// When the exchange completed.
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Most recent turns, oldest evicted first once `capacity` is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWindow {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationWindow {
    /// Create an empty window retaining at most `capacity` turns.
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a turn, evicting from the front while over capacity.
    pub fn push(&mut self, turn: ConversationTurn) {
        if self.capacity == 0 {
            return;
        }
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    /// Retained turns in chronological order (oldest first).
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl Default for ConversationWindow {
    fn default() -> Self {
        Self::new(5)
    }
}
