//! espeak-ng subprocess fallback.
//!
//! Covers replies Kokoro can't voice, including Hindi and Kannada text.

use tokio::process::Command;
use tracing::debug;

use crate::config::TTSConfig;
use crate::error::SpeechError;

pub struct EspeakTts {
    voice: String,
    rate: u32,
}

impl EspeakTts {
    pub fn new(config: &TTSConfig) -> Self {
        Self {
            voice: config.espeak_voice.clone(),
            rate: config.espeak_rate,
        }
    }

    /// Speak via `espeak-ng`, waiting for the process to exit.
    pub async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let voice = native_voice(text).unwrap_or(self.voice.as_str());
        debug!("espeak-ng speaking {} chars (voice {voice})", text.len());

        let rate = self.rate.to_string();
        let status = Command::new("espeak-ng")
            .args(["-v", voice, "-s", rate.as_str(), "--"])
            .arg(text)
            .status()
            .await?;

        if !status.success() {
            return Err(SpeechError::Playback(format!("espeak-ng exited with {status}")));
        }
        Ok(())
    }
}

/// espeak voice for text written in Devanagari or Kannada script.
pub fn native_voice(text: &str) -> Option<&'static str> {
    text.chars().find_map(|ch| match ch {
        '\u{0900}'..='\u{097F}' => Some("hi"),
        '\u{0C80}'..='\u{0CFF}' => Some("kn"),
        _ => None,
    })
}
