use serde::{Deserialize, Serialize};

use crate::error::{codes, AppError};

/// Word-window chunking parameters.
///
/// Windows hold `chunk_size` words and consecutive windows share `overlap` words,
/// so each step advances the window start by `chunk_size - overlap`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 50,
        }
    }
}

impl ChunkingParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, AppError> {
        let params = Self {
            chunk_size,
            overlap,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(AppError::new(
                codes::CHUNKING_INVALID_PARAMETERS,
                "Chunking requires 0 <= overlap < chunk_size",
            )
            .with_details(format!(
                "chunk_size={}; overlap={}",
                self.chunk_size, self.overlap
            )));
        }
        Ok(())
    }

    pub fn chunk(&self, text: &str) -> Result<Vec<String>, AppError> {
        chunk_text(text, self.chunk_size, self.overlap)
    }
}

/// Split `text` into overlapping windows of whitespace-separated words.
///
/// A window starts at every multiple of `chunk_size - overlap` below the word count,
/// so trailing windows may be short and contained in their predecessor. Blank input
/// yields no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, AppError> {
    ChunkingParams {
        chunk_size,
        overlap,
    }
    .validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    let step = chunk_size - overlap;

    Ok((0..words.len())
        .step_by(step)
        .map(|start| {
            let end = (start + chunk_size).min(words.len());
            words[start..end].join(" ")
        })
        .collect())
}
