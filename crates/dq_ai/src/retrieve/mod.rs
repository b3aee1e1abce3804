use dq_core::conversation::{render_transcript, ConversationStore};
use dq_core::domain::ConversationTurn;
use dq_core::error::{codes, AppError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::index::{SearchHit, VectorIndex};
use crate::llm::Llm;
use crate::prompts;

pub mod context;

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    /// The generation service answered from these hits.
    Generated { hits: Vec<SearchHit> },
    /// Nothing was retrieved; the generation service was not called.
    NoRelevantContext,
    /// Embedding the query or searching the index failed.
    RetrievalFailed { error: AppError },
    /// The generation service failed, timed out, or returned nothing.
    GenerationFallback { error: AppError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
}

impl Answer {
    pub fn is_fallback(&self) -> bool {
        !matches!(self.outcome, AnswerOutcome::Generated { .. })
    }
}

/// Answers questions for one session from its index and conversation history.
///
/// The history lock is held for a whole exchange, so a session answers one
/// query at a time and each user turn is immediately followed by its answer.
pub struct RetrievalOrchestrator<'a> {
    index: &'a VectorIndex,
    history: &'a Mutex<ConversationStore>,
    embedder: &'a dyn Embedder,
    llm: &'a dyn Llm,
    settings: RetrievalConfig,
}

impl<'a> RetrievalOrchestrator<'a> {
    pub fn new(
        index: &'a VectorIndex,
        history: &'a Mutex<ConversationStore>,
        embedder: &'a dyn Embedder,
        llm: &'a dyn Llm,
        settings: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            history,
            embedder,
            llm,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrievalConfig {
        &self.settings
    }

    /// Retrieve context for `query`, ask the generation service, and record the exchange.
    ///
    /// Only a blank query is returned as an error. Retrieval failures degrade to
    /// `retrieval_failed_reply` and generation failures to `generation_failed_reply`;
    /// neither touches the history.
    pub fn answer(&self, query: &str) -> Result<Answer, AppError> {
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new(codes::EMPTY_QUERY, "Query must not be empty"));
        }

        let mut history = self.history.lock();

        if self.index.is_empty() {
            return Ok(self.no_context());
        }

        let search_query = if self.settings.rewrite_with_history && !history.is_empty() {
            self.standalone_question(&history, q)
        } else {
            q.to_string()
        };

        let hits = match self
            .index
            .search(self.embedder, &search_query, self.settings.top_k)
        {
            Ok(hits) => hits,
            Err(error) => {
                warn!(error = %error, details = ?error.details, "retrieval failed; replying with fallback");
                return Ok(Answer {
                    text: self.settings.retrieval_failed_reply.clone(),
                    outcome: AnswerOutcome::RetrievalFailed { error },
                });
            }
        };
        if hits.is_empty() {
            return Ok(self.no_context());
        }

        let context = context::build_context(&hits, self.settings.context_char_budget);
        let transcript = render_transcript(&history.recent(self.settings.transcript_turns));
        let prompt = prompts::answer_prompt(&transcript, &context, q);
        debug!(
            hits = hits.len(),
            context_chars = context.chars().count(),
            prompt_chars = prompt.chars().count(),
            "assembled answer prompt"
        );

        let generated = self.llm.generate(&prompt).and_then(|text| {
            let text = text.trim().to_string();
            if text.is_empty() {
                Err(AppError::new(
                    codes::GENERATION_FAILED,
                    "Generation service returned empty output",
                ))
            } else {
                Ok(text)
            }
        });

        match generated {
            Ok(text) => {
                history.append(ConversationTurn::user(q));
                history.append(ConversationTurn::assistant(text.clone()));
                Ok(Answer {
                    text,
                    outcome: AnswerOutcome::Generated { hits },
                })
            }
            Err(e) => {
                let error = if e.is(codes::GENERATION_FAILED) {
                    e
                } else {
                    AppError::new(codes::GENERATION_FAILED, "Generation service failed")
                        .with_details(e.to_string())
                        .with_retryable(e.retryable)
                };
                warn!(error = %error, details = ?error.details, "generation failed; replying with fallback");
                Ok(Answer {
                    text: self.settings.generation_failed_reply.clone(),
                    outcome: AnswerOutcome::GenerationFallback { error },
                })
            }
        }
    }

    fn no_context(&self) -> Answer {
        debug!("no relevant context; skipping generation");
        Answer {
            text: self.settings.no_context_reply.clone(),
            outcome: AnswerOutcome::NoRelevantContext,
        }
    }

    // Falls back to the raw question when the rewrite fails.
    fn standalone_question(&self, history: &ConversationStore, q: &str) -> String {
        let transcript = render_transcript(&history.recent(self.settings.transcript_turns));
        let prompt = prompts::standalone_question_prompt(&transcript, q);
        match self.llm.generate(&prompt) {
            Ok(text) if !text.trim().is_empty() => {
                let rewritten = text.trim().to_string();
                debug!(chars = rewritten.chars().count(), "rewrote query with history");
                rewritten
            }
            Ok(_) => {
                warn!("query rewrite returned empty output; using raw query");
                q.to_string()
            }
            Err(e) => {
                warn!(error = %e, "query rewrite failed; using raw query");
                q.to_string()
            }
        }
    }
}
