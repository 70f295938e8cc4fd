//! Whisper ASR transcription using whisper-rs (whisper.cpp bindings).
//!
//! Loads a GGML model once at startup, then transcribes f32 audio
//! samples (16kHz mono) in the language chosen for each capture.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::WhisperConfig;

/// WhisperContext is Send+Sync, so it is shared behind an Arc.
#[derive(Clone)]
pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
}

impl WhisperTranscriber {
    /// Load the Whisper GGML model.
    pub fn load(config: &WhisperConfig) -> Result<Self, String> {
        let model_path = find_model(&config.model)?;

        info!("Loading Whisper model from {}", model_path.display());
        let t0 = Instant::now();

        let path_str = model_path
            .to_str()
            .ok_or_else(|| format!("Model path is not valid UTF-8: {}", model_path.display()))?;
        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| format!("Failed to load Whisper model: {e}"))?;

        info!("Whisper model loaded in {}ms", t0.elapsed().as_millis());

        Ok(Self { ctx: Arc::new(ctx) })
    }

    /// Transcribe audio samples (f32, 16kHz, mono) spoken in `language`
    /// (a Whisper code such as "en", "hi", "kn").
    pub fn transcribe(&self, samples: &[f32], language: &str) -> Result<String, String> {
        let t0 = Instant::now();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| format!("Failed to create whisper state: {e}"))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_token_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| format!("Whisper inference failed: {e}"))?;

        let mut text = String::new();
        for i in 0..state.full_n_segments() {
            if let Some(segment) = state.get_segment(i) {
                if let Ok(segment_text) = segment.to_str_lossy() {
                    let trimmed = segment_text.trim();
                    if !trimmed.is_empty() {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(trimmed);
                    }
                }
            }
        }

        let latency_ms = t0.elapsed().as_secs_f64() * 1000.0;
        let audio_duration = samples.len() as f64 / 16000.0;
        info!(
            "Transcribed {:.1}s audio [{language}] in {:.0}ms: \"{}\"",
            audio_duration,
            latency_ms,
            preview(&text, 80)
        );

        Ok(text)
    }
}

/// Find the GGML model file.
fn find_model(model_name: &str) -> Result<PathBuf, String> {
    let direct = PathBuf::from(model_name);
    if direct.exists() && direct.extension().is_some() {
        return Ok(direct);
    }

    let filenames = [
        format!("ggml-{}.bin", model_name.replace('/', "-")),
        "ggml-large-v3-turbo.bin".to_string(),
        "ggml-large-v3.bin".to_string(),
        "ggml-medium.bin".to_string(),
        "ggml-base.bin".to_string(),
    ];

    let search_dirs: Vec<PathBuf> = [
        std::env::current_dir().ok(),
        dirs::home_dir().map(|h| h.join(".cache/whisper")),
        dirs::data_dir().map(|d| d.join("medchat")),
    ]
    .into_iter()
    .flatten()
    .collect();

    for dir in &search_dirs {
        for filename in &filenames {
            let path = dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // English-only (.en) models can't transcribe Hindi or Kannada
    Err(format!(
        "Whisper GGML model not found. Download a multilingual model with:\n  \
         wget https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3-turbo.bin\n\
         Searched in: {:?}",
        search_dirs
    ))
}

/// Whisper marks non-speech audio with bracketed annotations such as
/// "[BLANK_AUDIO]" or "(coughing)". True when nothing else remains.
pub fn is_non_speech(text: &str) -> bool {
    let mut depth = 0usize;
    let mut remaining = String::new();
    for ch in text.chars() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => remaining.push(ch),
            _ => {}
        }
    }
    remaining.chars().all(|c| !c.is_alphanumeric())
}

pub fn preview(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_speech_annotations() {
        assert!(is_non_speech(""));
        assert!(is_non_speech("[BLANK_AUDIO]"));
        assert!(is_non_speech(" (coughing) [Music] ..."));
        assert!(!is_non_speech("I have a headache"));
        assert!(!is_non_speech("[Music] what is fever?"));
        assert!(!is_non_speech("मुझे बुखार है"));
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ನಮಸ್ಕಾರ ನಮಸ್ಕಾರ", 3), "ನಮಸ...");
    }
}
