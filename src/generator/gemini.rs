//! Gemini `generateContent` REST backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{request_error, usable_text, ResponseGenerator};
use crate::config::{GeminiConfig, GenerationConfig};
use crate::error::GenerationError;

pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    generation: GenerationConfig,
}

impl GeminiGenerator {
    pub fn new(
        config: &GeminiConfig,
        api_key: String,
        generation: GenerationConfig,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            generation,
        })
    }
}

#[async_trait]
impl ResponseGenerator for GeminiGenerator {
    async fn generate(&self, directive: &str, input: &str) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = request_body(directive, input, &self.generation);
        debug!("Sending to Gemini model '{}': {}", self.model, input);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("Gemini", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorWrapper>(&text)
                .ok()
                .and_then(|w| w.error.message)
                .unwrap_or(text);
            warn!("Gemini returned status {status}: {message}");
            return Err(GenerationError::BackendUnavailable(format!(
                "HTTP {status}: {message}"
            )));
        }

        let parsed: GenerateContentResponse = resp.json().await.map_err(|e| {
            GenerationError::MalformedResponse(format!("failed to parse Gemini response: {e}"))
        })?;

        extract_text(parsed)
    }
}

/// Directive and input travel as two parts of one user content, directive first.
fn request_body<'a>(
    directive: &'a str,
    input: &'a str,
    generation: &'a GenerationConfig,
) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: directive }, Part { text: input }],
        }],
        generation_config: GenerationParams {
            temperature: generation.temperature,
            top_p: generation.top_p,
            top_k: generation.top_k,
            max_output_tokens: generation.max_output_tokens,
            response_mime_type: &generation.response_mime_type,
        },
    }
}

/// Concatenated text parts of the first candidate.
fn extract_text(resp: GenerateContentResponse) -> Result<String, GenerationError> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::MalformedResponse(format!(
            "prompt blocked: {reason}"
        )));
    }

    let candidate = resp
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("no candidates".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    usable_text(&text).map_err(|_| {
        GenerationError::MalformedResponse(format!(
            "no text in candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams<'a> {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
