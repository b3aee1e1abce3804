use std::time::Duration;

use dq_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Llm;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "requesting generation");

        let resp = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new(codes::GENERATION_FAILED, "Failed to encode generate request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::GENERATION_FAILED, "Failed to decode generate response")
                        .with_details(e.to_string())
                })?;
                let text = v.response.trim();
                if text.is_empty() {
                    return Err(AppError::new(
                        codes::GENERATION_FAILED,
                        "Generate response was empty",
                    ));
                }
                Ok(text.to_string())
            }
            Ok(r) => Err(
                AppError::new(codes::GENERATION_FAILED, "Generate request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, _)) => Err(
                AppError::new(codes::GENERATION_FAILED, "Generate request failed")
                    .with_details(format!("status={status}"))
                    .with_retryable(status >= 500),
            ),
            Err(e) => Err(
                AppError::new(codes::GENERATION_FAILED, "Failed to call generate endpoint")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}
