//! Response generation: fixed system directive + the current user input,
//! sent to a text-generation backend.
//!
//! Only the latest input is sent, never the full history. Each backend
//! call is stateless even though the session keeps every turn for display.

pub mod gemini;
pub mod ollama;

use async_trait::async_trait;

use crate::config::{Config, GeneratorBackend};
use crate::error::GenerationError;
use gemini::GeminiGenerator;
use ollama::OllamaGenerator;

/// Behavioral contract prepended to every generation call.
pub const SYSTEM_DIRECTIVE: &str = "\
You are a helpful medical assistant answering health-related questions.
Your responsibilities:
1. Give clear information on medical topics.
2. Suggest possible treatments or self-care based on described symptoms.
3. Advise when the user should seek professional medical care.
4. Recommend the top 10 hospitals in Bangalore if requested.

Rules:
- Always include this disclaimer: \"Consult with a Doctor before making any decisions.\"
- If the question is not about health or medicine, politely refuse to answer it.
";

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// One backend call with `directive` as a distinct part preceding `input`.
    async fn generate(&self, directive: &str, input: &str) -> Result<String, GenerationError>;
}

/// Build the configured backend. Fails if the backend can't be set up
/// (e.g. missing API key).
pub fn from_config(config: &Config) -> Result<Box<dyn ResponseGenerator>, String> {
    match config.generator.backend {
        GeneratorBackend::Gemini => {
            let env = &config.gemini.api_key_env;
            let api_key = std::env::var(env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| format!("Gemini backend needs an API key in ${env}"))?;
            Ok(Box::new(GeminiGenerator::new(
                &config.gemini,
                api_key,
                config.generation.clone(),
            )?))
        }
        GeneratorBackend::Ollama => Ok(Box::new(OllamaGenerator::new(
            &config.ollama,
            config.generation.clone(),
        )?)),
    }
}

/// Trimmed reply text, or `MalformedResponse` when nothing usable remains.
pub(crate) fn usable_text(text: &str) -> Result<String, GenerationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::MalformedResponse("empty text".into()));
    }
    Ok(text.to_string())
}

pub(crate) fn request_error(backend: &str, err: &reqwest::Error) -> GenerationError {
    let detail = if err.is_connect() {
        format!("cannot connect to {backend}")
    } else if err.is_timeout() {
        format!("{backend} request timed out")
    } else {
        format!("{backend} request failed: {err}")
    };
    GenerationError::BackendUnavailable(detail)
}
