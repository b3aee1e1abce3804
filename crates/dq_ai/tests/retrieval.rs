use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use dq_ai::config::RetrievalConfig;
use dq_ai::embeddings::Embedder;
use dq_ai::index::VectorIndex;
use dq_ai::llm::Llm;
use dq_ai::retrieve::{AnswerOutcome, RetrievalOrchestrator};
use dq_core::conversation::ConversationStore;
use dq_core::domain::{Chunk, Role, Vector};
use dq_core::error::{codes, AppError};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

const VOCAB: [&str; 6] = ["cat", "dog", "fish", "mammal", "water", "animal"];

/// Bag-of-keywords embedding: one dimension per vocabulary stem.
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, inputs: &[String]) -> Result<Vec<Vector>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; VOCAB.len()];
                for word in text.split_whitespace() {
                    let word = word
                        .trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase();
                    for (i, stem) in VOCAB.iter().enumerate() {
                        if word.starts_with(stem) {
                            v[i] += 1.0;
                        }
                    }
                }
                v
            })
            .collect())
    }
}

struct DownEmbedder;

impl Embedder for DownEmbedder {
    fn embed(&self, _inputs: &[String]) -> Result<Vec<Vector>, AppError> {
        Err(AppError::new(codes::EMBEDDINGS_FAILED, "embedding service unavailable").with_retryable(true))
    }
}

/// Replies from a script (or a default) and records every prompt.
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, AppError>>>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn answering(default_reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn then(self, reply: Result<&str, AppError>) -> Self {
        self.replies.lock().push_back(reply.map(|s| s.to_string()));
        self
    }

    fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().last().cloned().unwrap_or_default()
    }
}

impl Llm for ScriptedLlm {
    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_reply.clone()))
    }
}

fn timeout_error() -> AppError {
    AppError::new(codes::GENERATION_FAILED, "Generation process timed out")
        .with_details("timeout_ms=30000")
        .with_retryable(true)
}

fn animal_index(embedder: &KeywordEmbedder) -> VectorIndex {
    let index = VectorIndex::new();
    index
        .add(
            embedder,
            vec![
                Chunk::new(0, "cats are mammals", 0),
                Chunk::new(1, "dogs are mammals", 0),
                Chunk::new(2, "fish live in water", 0),
            ],
        )
        .expect("add");
    index
}

fn settings(top_k: usize) -> RetrievalConfig {
    RetrievalConfig {
        top_k,
        ..RetrievalConfig::default()
    }
}

fn context_section(prompt: &str) -> &str {
    let start = prompt.find("BEGIN CONTEXT\n").expect("context start") + "BEGIN CONTEXT\n".len();
    let end = prompt.find("\nEND CONTEXT").expect("context end");
    &prompt[start..end]
}

#[test]
fn dog_question_retrieves_the_dog_chunk() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);

    let hits = index
        .search(&embedder, "what kind of animal is a dog", 1)
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, "dogs are mammals");

    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("A dog is a mammal.");
    let orchestrator = RetrievalOrchestrator::new(&index, &history, &embedder, &llm, settings(1));

    let answer = orchestrator
        .answer("what kind of animal is a dog")
        .expect("answer");
    assert_eq!(answer.text, "A dog is a mammal.");
    match &answer.outcome {
        AnswerOutcome::Generated { hits } => {
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].chunk.id, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!answer.is_fallback());

    let prompt = llm.last_prompt();
    assert_eq!(context_section(&prompt), "dogs are mammals");
    assert!(prompt.contains("BEGIN QUESTION\nwhat kind of animal is a dog\nEND QUESTION"));

    let history = history.lock();
    let turns = history.recent(10);
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "what kind of animal is a dog");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, "A dog is a mammal.");
}

#[test]
fn empty_index_returns_fallback_without_calling_generation() {
    let embedder = KeywordEmbedder::new();
    let index = VectorIndex::new();
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("should not be used");
    let orchestrator = RetrievalOrchestrator::new(
        &index,
        &history,
        &embedder,
        &llm,
        RetrievalConfig::default(),
    );

    let answer = orchestrator.answer("is anyone there?").expect("answer");
    assert_eq!(answer.text, RetrievalConfig::default().no_context_reply);
    assert_eq!(answer.outcome, AnswerOutcome::NoRelevantContext);
    assert!(answer.is_fallback());
    assert_eq!(llm.call_count(), 0);
    assert_eq!(embedder.call_count(), 0);
    assert!(history.lock().is_empty());
}

#[test]
fn generation_timeout_returns_fallback_and_leaves_history_unchanged() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("Cats are mammals.");
    let orchestrator =
        RetrievalOrchestrator::new(&index, &history, &embedder, &llm, settings(2));

    orchestrator.answer("tell me about cats").expect("first answer");
    let before = history.lock().len();
    assert_eq!(before, 2);

    let llm = ScriptedLlm::answering("unused").then(Err(timeout_error()));
    let orchestrator =
        RetrievalOrchestrator::new(&index, &history, &embedder, &llm, settings(2));
    let answer = orchestrator.answer("and dogs?").expect("answer");

    assert_eq!(answer.text, RetrievalConfig::default().generation_failed_reply);
    match &answer.outcome {
        AnswerOutcome::GenerationFallback { error } => {
            assert_eq!(error.code, codes::GENERATION_FAILED);
            assert!(error.retryable);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(history.lock().len(), before);
    assert_eq!(llm.call_count(), 1);
}

#[test]
fn blank_generation_output_degrades_to_fallback() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering(" \n ");
    let orchestrator =
        RetrievalOrchestrator::new(&index, &history, &embedder, &llm, settings(3));

    let answer = orchestrator.answer("where do fish live").expect("answer");
    assert_eq!(answer.text, "Something went wrong.");
    assert!(matches!(answer.outcome, AnswerOutcome::GenerationFallback { .. }));
    assert!(history.lock().is_empty());
}

#[test]
fn foreign_generation_errors_are_reported_as_generation_failures() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("unused")
        .then(Err(AppError::new("AI_OLLAMA_UNREACHABLE", "connection refused").with_retryable(true)));
    let orchestrator =
        RetrievalOrchestrator::new(&index, &history, &embedder, &llm, settings(3));

    let answer = orchestrator.answer("cats?").expect("answer");
    match answer.outcome {
        AnswerOutcome::GenerationFallback { error } => {
            assert_eq!(error.code, codes::GENERATION_FAILED);
            assert!(error.retryable);
            assert!(error.details.unwrap_or_default().contains("AI_OLLAMA_UNREACHABLE"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn blank_query_is_rejected_before_any_work() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let calls_after_ingest = embedder.call_count();
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("unused");
    let orchestrator = RetrievalOrchestrator::new(
        &index,
        &history,
        &embedder,
        &llm,
        RetrievalConfig::default(),
    );

    let err = orchestrator.answer("   \t").expect_err("should reject");
    assert_eq!(err.code, codes::EMPTY_QUERY);
    assert_eq!(embedder.call_count(), calls_after_ingest);
    assert_eq!(llm.call_count(), 0);
}

#[test]
fn embedding_failure_during_search_degrades_and_nothing_is_recorded() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("unused");
    let orchestrator = RetrievalOrchestrator::new(
        &index,
        &history,
        &DownEmbedder,
        &llm,
        RetrievalConfig::default(),
    );

    let answer = orchestrator.answer("what is a dog").expect("answer");
    assert_eq!(answer.text, RetrievalConfig::default().retrieval_failed_reply);
    assert!(answer.is_fallback());
    match &answer.outcome {
        AnswerOutcome::RetrievalFailed { error } => {
            assert_eq!(error.code, codes::EMBEDDINGS_FAILED);
            assert!(error.retryable);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(llm.call_count(), 0);
    assert!(history.lock().is_empty());
}

/// Embeds everything into two dimensions, narrower than the animal index.
struct NarrowEmbedder;

impl Embedder for NarrowEmbedder {
    fn embed(&self, inputs: &[String]) -> Result<Vec<Vector>, AppError> {
        Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

#[test]
fn query_dimension_mismatch_degrades_to_the_retrieval_reply() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("unused");
    let config = RetrievalConfig {
        retrieval_failed_reply: "Search is unavailable.".to_string(),
        ..RetrievalConfig::default()
    };
    let orchestrator =
        RetrievalOrchestrator::new(&index, &history, &NarrowEmbedder, &llm, config);

    let answer = orchestrator.answer("dogs?").expect("answer");
    assert_eq!(answer.text, "Search is unavailable.");
    match &answer.outcome {
        AnswerOutcome::RetrievalFailed { error } => {
            assert_eq!(error.code, codes::INDEX_DIMENSION_MISMATCH)
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(llm.call_count(), 0);
    assert!(history.lock().is_empty());
}

#[test]
fn context_is_cut_at_the_character_budget() {
    let embedder = KeywordEmbedder::new();
    let index = VectorIndex::new();
    let long = format!("dog {}", "x".repeat(1_000));
    index
        .add(&embedder, vec![Chunk::new(0, long.clone(), 0), Chunk::new(1, "dogs bark", 0)])
        .expect("add");

    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("ok");
    let orchestrator = RetrievalOrchestrator::new(
        &index,
        &history,
        &embedder,
        &llm,
        RetrievalConfig::default(),
    );
    orchestrator.answer("dog").expect("answer");

    let prompt = llm.last_prompt();
    let context = context_section(&prompt);
    assert_eq!(context.chars().count(), 600);
    assert_eq!(context, &long[..600]);
}

#[test]
fn prompt_includes_only_the_recent_transcript_window() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(100));
    let llm = ScriptedLlm::answering("noted")
        .then(Ok("a0"))
        .then(Ok("a1"))
        .then(Ok("a2"));
    let orchestrator = RetrievalOrchestrator::new(
        &index,
        &history,
        &embedder,
        &llm,
        RetrievalConfig::default(),
    );

    for q in ["q0 cats", "q1 dogs", "q2 fish"] {
        orchestrator.answer(q).expect("answer");
    }
    orchestrator.answer("q3 water").expect("answer");

    let prompt = llm.last_prompt();
    // 6 prior turns, window of 5: the first user turn drops out.
    assert!(!prompt.contains("User: q0 cats"));
    assert!(prompt.contains(
        "BEGIN PAST CONVERSATION\nAI: a0\nUser: q1 dogs\nAI: a1\nUser: q2 fish\nAI: a2\nEND PAST CONVERSATION"
    ));
    assert_eq!(history.lock().len(), 8);
}

#[test]
fn bounded_history_evicts_oldest_turns_across_exchanges() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(3));
    let llm = ScriptedLlm::answering("fine");
    let orchestrator = RetrievalOrchestrator::new(
        &index,
        &history,
        &embedder,
        &llm,
        RetrievalConfig::default(),
    );

    orchestrator.answer("first cats").expect("answer");
    orchestrator.answer("second dogs").expect("answer");

    let history = history.lock();
    let contents = history
        .turns()
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>();
    assert_eq!(contents, vec!["fine", "second dogs", "fine"]);
}

#[test]
fn follow_up_is_rewritten_with_history_before_searching() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("unused")
        .then(Ok("Dogs are mammals."))
        .then(Ok("Where do fish live?"))
        .then(Ok("Fish live in water."));
    let config = RetrievalConfig {
        top_k: 1,
        rewrite_with_history: true,
        ..RetrievalConfig::default()
    };
    let orchestrator = RetrievalOrchestrator::new(&index, &history, &embedder, &llm, config);

    // No history yet: no rewrite call.
    orchestrator.answer("tell me about dogs").expect("answer");
    assert_eq!(llm.call_count(), 1);

    let answer = orchestrator.answer("and where do they live?").expect("answer");
    assert_eq!(llm.call_count(), 3);
    assert_eq!(answer.text, "Fish live in water.");
    match &answer.outcome {
        AnswerOutcome::Generated { hits } => assert_eq!(hits[0].chunk.text, "fish live in water"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let prompts = llm.prompts.lock();
    assert!(prompts[1].contains("BEGIN CHAT HISTORY\nUser: tell me about dogs\nAI: Dogs are mammals.\nEND CHAT HISTORY"));
    // The answer prompt keeps the user's own wording.
    assert!(prompts[2].contains("BEGIN QUESTION\nand where do they live?\nEND QUESTION"));
}

#[test]
fn failed_rewrite_falls_back_to_the_raw_query() {
    let embedder = KeywordEmbedder::new();
    let index = animal_index(&embedder);
    let history = Mutex::new(ConversationStore::bounded(10));
    let llm = ScriptedLlm::answering("unused")
        .then(Ok("Cats are mammals."))
        .then(Err(timeout_error()))
        .then(Ok("Dogs are mammals too."));
    let config = RetrievalConfig {
        top_k: 1,
        rewrite_with_history: true,
        ..RetrievalConfig::default()
    };
    let orchestrator = RetrievalOrchestrator::new(&index, &history, &embedder, &llm, config);

    orchestrator.answer("cats").expect("answer");
    let answer = orchestrator.answer("what about a dog").expect("answer");
    assert_eq!(answer.text, "Dogs are mammals too.");
    match &answer.outcome {
        AnswerOutcome::Generated { hits } => assert_eq!(hits[0].chunk.text, "dogs are mammals"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(history.lock().len(), 4);
}
