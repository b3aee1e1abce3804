use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes shared by the core and AI layers.
pub mod codes {
    pub const CHUNKING_INVALID_PARAMETERS: &str = "CHUNKING_INVALID_PARAMETERS";
    pub const EMBEDDINGS_FAILED: &str = "AI_EMBEDDINGS_FAILED";
    pub const INDEX_DIMENSION_MISMATCH: &str = "AI_INDEX_DIMENSION_MISMATCH";
    pub const INDEX_INVALID_CHUNK: &str = "AI_INDEX_INVALID_CHUNK";
    pub const EMPTY_QUERY: &str = "AI_EMPTY_QUERY";
    pub const GENERATION_FAILED: &str = "AI_GENERATION_FAILED";

    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const CONFIG_READ_FAILED: &str = "CONFIG_READ_FAILED";

    pub const REMOTE_NOT_ALLOWED: &str = "AI_REMOTE_NOT_ALLOWED";
    pub const OLLAMA_UNHEALTHY: &str = "AI_OLLAMA_UNHEALTHY";
    pub const OLLAMA_UNREACHABLE: &str = "AI_OLLAMA_UNREACHABLE";
}

/// Single structured error shape used across the core and AI layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
