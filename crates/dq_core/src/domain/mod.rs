use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Embedding vector. Every vector stored in one index has the same length.
pub type Vector = Vec<f32>;

/// A bounded contiguous span of a source text; the unit of retrieval.
///
/// Notes:
/// - `text` is non-empty and holds at most `chunk_size` whitespace-separated words.
/// - `source_index` identifies the ingested document the chunk came from.
/// - Chunks are immutable once they enter an index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: u64,
    pub text: String,
    pub source_index: u64,
}

impl Chunk {
    pub fn new(id: u64, text: impl Into<String>, source_index: u64) -> Self {
        Self {
            id,
            text: text.into(),
            source_index,
        }
    }
}

/// A chunk paired with the vector computed for its text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vector,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when rendering a transcript.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "AI",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// RFC3339 UTC creation time, when the clock could be formatted.
    pub created_at: Option<String>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: now_rfc3339_utc(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

fn now_rfc3339_utc() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}
