use dq_core::error::{codes, AppError};
use tracing::debug;

use crate::llm::Llm;
use crate::prompts::transcript_cleanup_prompt;

/// Clean a raw speech-to-text transcript before it is ingested.
///
/// Blank input is returned unchanged without calling the generation service.
pub fn tidy_transcript(llm: &dyn Llm, raw: &str) -> Result<String, AppError> {
    if raw.trim().is_empty() {
        return Ok(raw.to_string());
    }

    let out = llm.generate(&transcript_cleanup_prompt(raw.trim()))?;
    let out = out.trim();
    if out.is_empty() {
        return Err(AppError::new(
            codes::GENERATION_FAILED,
            "Transcript cleanup returned empty output",
        ));
    }
    debug!(raw_chars = raw.chars().count(), tidy_chars = out.chars().count(), "tidied transcript");
    Ok(out.to_string())
}
