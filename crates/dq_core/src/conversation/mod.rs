use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::ConversationTurn;

/// How many turns a conversation keeps in memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep only the most recent `max_turns`; older turns are evicted first.
    Bounded { max_turns: usize },
    /// Keep every turn for the lifetime of the store.
    Unbounded,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Bounded { max_turns: 50 }
    }
}

/// Ordered, bounded history of exchange turns for one conversation session.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    turns: VecDeque<ConversationTurn>,
    retention: RetentionPolicy,
}

impl ConversationStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            turns: VecDeque::new(),
            retention,
        }
    }

    pub fn bounded(max_turns: usize) -> Self {
        Self::new(RetentionPolicy::Bounded { max_turns })
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        if let RetentionPolicy::Bounded { max_turns } = self.retention {
            while self.turns.len() > max_turns {
                self.turns.pop_front();
            }
        }
    }

    /// Up to the last `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Render turns as `Label: content` lines, one per turn.
pub fn render_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}
