use std::time::Duration;

use dq_core::domain::Vector;
use dq_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Embedder;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

// Per-input request cap, cut on a UTF-8 boundary.
fn clamp_input(input: &str) -> &str {
    const MAX_BYTES: usize = 12_000;
    if input.len() <= MAX_BYTES {
        return input;
    }
    let mut end = MAX_BYTES;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    warn!(bytes = input.len(), clamped_bytes = end, "embedding input clamped");
    &input[..end]
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, inputs: &[String]) -> Result<Vec<Vector>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.client.base_url());
        let req = EmbedRequest {
            model: &self.model,
            input: inputs.iter().map(|s| clamp_input(s)).collect(),
        };
        debug!(model = %self.model, batch = inputs.len(), "requesting embeddings");

        let resp = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new(codes::EMBEDDINGS_FAILED, "Failed to encode embeddings request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: EmbedResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::EMBEDDINGS_FAILED, "Failed to decode embeddings response")
                        .with_details(e.to_string())
                })?;
                if v.embeddings.iter().any(|e| e.is_empty()) {
                    return Err(AppError::new(
                        codes::EMBEDDINGS_FAILED,
                        "Embeddings response was empty",
                    ));
                }
                Ok(v.embeddings)
            }
            Ok(r) => Err(
                AppError::new(codes::EMBEDDINGS_FAILED, "Embeddings request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, _)) => Err(
                AppError::new(codes::EMBEDDINGS_FAILED, "Embeddings request failed")
                    .with_details(format!("status={status}"))
                    .with_retryable(status >= 500),
            ),
            Err(e) => Err(
                AppError::new(codes::EMBEDDINGS_FAILED, "Failed to call embeddings endpoint")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}
