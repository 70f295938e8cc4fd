//! Ollama `/api/chat` backend for a locally hosted model.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::{request_error, usable_text, ResponseGenerator};
use crate::config::{GenerationConfig, OllamaConfig};
use crate::error::GenerationError;

pub struct OllamaGenerator {
    client: Client,
    host: String,
    model: String,
    generation: GenerationConfig,
}

impl OllamaGenerator {
    pub fn new(config: &OllamaConfig, generation: GenerationConfig) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            generation,
        })
    }

    /// Directive as the system message, input as the only user message.
    fn request_body(&self, directive: &str, input: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": directive},
                {"role": "user", "content": input}
            ],
            "stream": false,
            "options": {
                "temperature": self.generation.temperature,
                "top_p": self.generation.top_p,
                "top_k": self.generation.top_k,
                "num_predict": self.generation.max_output_tokens
            }
        })
    }
}

#[async_trait]
impl ResponseGenerator for OllamaGenerator {
    async fn generate(&self, directive: &str, input: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.host);
        debug!("Sending to Ollama model '{}': {}", self.model, input);

        let resp = self
            .client
            .post(&url)
            .json(&self.request_body(directive, input))
            .send()
            .await
            .map_err(|e| request_error("Ollama", &e))?;

        if !resp.status().is_success() {
            warn!("Ollama returned status {}", resp.status());
            return Err(GenerationError::BackendUnavailable(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        let data = resp.json::<serde_json::Value>().await.map_err(|e| {
            GenerationError::MalformedResponse(format!("failed to parse Ollama response: {e}"))
        })?;

        usable_text(data["message"]["content"].as_str().unwrap_or(""))
    }
}
