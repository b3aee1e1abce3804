//! TOML configuration. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! [chunking]
//! chunk_size = 300
//! overlap = 50
//!
//! [retrieval]
//! top_k = 5
//! context_char_budget = 600
//!
//! [history]
//! retention = { policy = "bounded", max_turns = 50 }
//!
//! [ollama]
//! base_url = "http://127.0.0.1:11434"
//! transport = "cli"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use dq_core::chunking::ChunkingParams;
use dq_core::conversation::{ConversationStore, RetentionPolicy};
use dq_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embeddings::ollama_embed::OllamaEmbedder;
use crate::llm::ollama_cli::OllamaCliLlm;
use crate::llm::ollama_llm::OllamaLlm;
use crate::llm::Llm;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingParams,
    pub retrieval: RetrievalConfig,
    pub history: HistoryConfig,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Retrieved context is cut at this many characters (not at a word boundary).
    pub context_char_budget: usize,
    /// Prior turns rendered into the prompt.
    pub transcript_turns: usize,
    /// Restate follow-up questions as standalone ones before searching.
    pub rewrite_with_history: bool,
    pub no_context_reply: String,
    pub retrieval_failed_reply: String,
    pub generation_failed_reply: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_char_budget: 600,
            transcript_turns: 5,
            rewrite_with_history: false,
            no_context_reply: "I couldn't find anything relevant. Try rephrasing?".to_string(),
            retrieval_failed_reply: "I'm having trouble understanding. Could you rephrase?"
                .to_string(),
            generation_failed_reply: "Something went wrong.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    pub retention: RetentionPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTransport {
    /// `POST /api/generate`.
    #[default]
    Http,
    /// `ollama run <model>` subprocess.
    Cli,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub generate_model: String,
    pub embed_timeout_ms: u64,
    pub generate_timeout_ms: u64,
    pub transport: GenerationTransport,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            embed_model: "all-minilm".to_string(),
            generate_model: "llama3.2".to_string(),
            embed_timeout_ms: 10_000,
            generate_timeout_ms: 30_000,
            transport: GenerationTransport::Http,
        }
    }
}

fn invalid(message: &str, details: String) -> AppError {
    AppError::new(codes::CONFIG_INVALID, message).with_details(details)
}

impl RagConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let cfg: RagConfig = toml::from_str(raw).map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Failed to parse configuration")
                .with_details(e.to_string())
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new(codes::CONFIG_READ_FAILED, "Failed to read configuration file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let cfg = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.chunking.validate().map_err(|e| {
            invalid("Invalid chunking configuration", e.details.unwrap_or_default())
        })?;

        let r = &self.retrieval;
        if r.top_k == 0 {
            return Err(invalid("retrieval.top_k must be at least 1", "top_k=0".to_string()));
        }
        if r.context_char_budget == 0 {
            return Err(invalid(
                "retrieval.context_char_budget must be at least 1",
                "context_char_budget=0".to_string(),
            ));
        }
        for (name, reply) in [
            ("no_context_reply", &r.no_context_reply),
            ("retrieval_failed_reply", &r.retrieval_failed_reply),
            ("generation_failed_reply", &r.generation_failed_reply),
        ] {
            if reply.trim().is_empty() {
                return Err(invalid(
                    "Fallback replies must not be blank",
                    format!("retrieval.{name}"),
                ));
            }
        }

        if let RetentionPolicy::Bounded { max_turns } = self.history.retention {
            if max_turns == 0 {
                return Err(invalid(
                    "history.retention.max_turns must be at least 1",
                    "max_turns=0".to_string(),
                ));
            }
        }

        let o = &self.ollama;
        if o.embed_timeout_ms == 0 || o.generate_timeout_ms == 0 {
            return Err(invalid(
                "Ollama timeouts must be non-zero",
                format!(
                    "embed_timeout_ms={}; generate_timeout_ms={}",
                    o.embed_timeout_ms, o.generate_timeout_ms
                ),
            ));
        }
        if o.embed_model.trim().is_empty() || o.generate_model.trim().is_empty() {
            return Err(invalid(
                "Ollama model names must not be blank",
                format!("embed_model={:?}; generate_model={:?}", o.embed_model, o.generate_model),
            ));
        }
        Ok(())
    }

    pub fn new_conversation(&self) -> ConversationStore {
        ConversationStore::new(self.history.retention)
    }

    pub fn embedder(&self) -> Result<OllamaEmbedder, AppError> {
        let client = OllamaClient::new(&self.ollama.base_url)?;
        Ok(OllamaEmbedder::new(
            client,
            self.ollama.embed_model.clone(),
            Duration::from_millis(self.ollama.embed_timeout_ms),
        ))
    }

    pub fn generator(&self) -> Result<Box<dyn Llm>, AppError> {
        let timeout = Duration::from_millis(self.ollama.generate_timeout_ms);
        match self.ollama.transport {
            GenerationTransport::Http => {
                let client = OllamaClient::new(&self.ollama.base_url)?;
                Ok(Box::new(OllamaLlm::new(
                    client,
                    self.ollama.generate_model.clone(),
                    timeout,
                )))
            }
            GenerationTransport::Cli => Ok(Box::new(OllamaCliLlm::new(
                &self.ollama.generate_model,
                timeout,
            ))),
        }
    }
}
