use dq_core::domain::Vector;
use dq_core::error::{codes, AppError};

/// Maps a batch of strings to fixed-dimension vectors, one per input, in input order.
pub trait Embedder: Send + Sync {
    fn embed(&self, inputs: &[String]) -> Result<Vec<Vector>, AppError>;
}

pub mod ollama_embed;

/// Embed `inputs` and check the batch contract: one vector per input, all of one
/// non-zero length. Returns the vectors and their dimension.
pub(crate) fn embed_batch(
    embedder: &dyn Embedder,
    inputs: &[String],
) -> Result<(Vec<Vector>, usize), AppError> {
    let vectors = embedder.embed(inputs).map_err(|e| {
        if e.is(codes::EMBEDDINGS_FAILED) {
            e
        } else {
            AppError::new(codes::EMBEDDINGS_FAILED, "Failed to compute embeddings")
                .with_details(e.to_string())
                .with_retryable(e.retryable)
        }
    })?;

    if vectors.len() != inputs.len() {
        return Err(AppError::new(
            codes::EMBEDDINGS_FAILED,
            "Embedder returned the wrong number of vectors",
        )
        .with_details(format!("inputs={}; vectors={}", inputs.len(), vectors.len())));
    }

    let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
    if dims == 0 && !vectors.is_empty() {
        return Err(AppError::new(
            codes::EMBEDDINGS_FAILED,
            "Embeddings response was empty",
        ));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(AppError::new(
            codes::INDEX_DIMENSION_MISMATCH,
            "Embedding dimension mismatch within batch",
        )
        .with_details(format!("expected={dims}; got={}; position={i}", v.len())));
    }

    Ok((vectors, dims))
}
