//! Speech output: speak a reply and block until playback completes.
//!
//! Kokoro handles English; Hindi and Kannada replies go to espeak-ng.
//! Best-effort. Failures are logged and swallowed; the transcript has
//! already been rendered by the time speech starts.

pub mod espeak;
pub mod kokoro;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{TTSConfig, TtsBackend};
use crate::error::SpeechError;
use espeak::{native_voice, EspeakTts};
use kokoro::{KokoroTts, SpeakStats};

#[async_trait]
pub trait SpeechOutput: Send + Sync {
    async fn speak(&self, text: &str);
}

/// Kokoro first, espeak-ng when Kokoro is missing or produces no audio.
pub struct SpeechEngine {
    kokoro: Option<KokoroTts>,
    espeak: Option<EspeakTts>,
}

impl SpeechEngine {
    /// Build the engine chain for the configured backend. Loading Kokoro
    /// is blocking; a load failure leaves only the espeak-ng fallback.
    pub fn from_config(config: &TTSConfig) -> Self {
        match config.backend {
            TtsBackend::None => Self::disabled(),
            TtsBackend::Espeak => Self {
                kokoro: None,
                espeak: Some(EspeakTts::new(config)),
            },
            TtsBackend::Kokoro => {
                info!("Loading Kokoro TTS model...");
                let kokoro = match KokoroTts::load(config) {
                    Ok(engine) => Some(engine),
                    Err(e) => {
                        warn!("Failed to load Kokoro TTS: {e}; using espeak-ng");
                        None
                    }
                };
                Self {
                    kokoro,
                    espeak: Some(EspeakTts::new(config)),
                }
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            kokoro: None,
            espeak: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.kokoro.is_some() || self.espeak.is_some()
    }
}

#[async_trait]
impl SpeechOutput for SpeechEngine {
    async fn speak(&self, text: &str) {
        // Kokoro's phonemizer is English-only
        let kokoro = self.kokoro.as_ref().filter(|_| native_voice(text).is_none());
        let result = match kokoro {
            Some(kokoro) => kokoro.speak(text).await,
            None => Err(SpeechError::NotLoaded),
        };

        match &result {
            Ok(stats) => info!(
                "Spoke {} sentence(s): gen={:.0}ms play={:.0}ms",
                stats.sentences, stats.generate_ms, stats.playback_ms
            ),
            Err(SpeechError::NotLoaded) => {}
            Err(e) => warn!("Kokoro failed: {e}, falling back to espeak-ng"),
        }

        let Some(rest) = fallback_text(text, &result) else {
            return;
        };
        if let Some(espeak) = &self.espeak {
            if let Err(e) = espeak.speak(rest).await {
                warn!("espeak-ng failed: {e}");
            }
        }
    }
}

/// What espeak-ng still has to say after Kokoro's attempt: everything when
/// Kokoro played nothing, the unplayed tail after a partial failure.
fn fallback_text<'a>(
    text: &'a str,
    kokoro: &'a Result<SpeakStats, SpeechError>,
) -> Option<&'a str> {
    match kokoro {
        Ok(stats) if stats.unspoken.is_empty() => None,
        Ok(stats) => Some(&stats.unspoken),
        Err(_) => Some(text),
    }
}
