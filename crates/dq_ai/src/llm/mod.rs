use dq_core::error::AppError;

/// Answer-generation service: prompt in, text out.
///
/// Implementations must bound the call with a timeout and report failures
/// (including timeouts) as errors rather than hanging.
pub trait Llm: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, AppError>;
}

pub mod ollama_cli;
pub mod ollama_llm;
