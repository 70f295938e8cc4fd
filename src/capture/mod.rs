//! Speech capture: microphone listen + Whisper transcription behind one
//! `capture(locale)` call.

pub mod recorder;
pub mod transcriber;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::language::whisper_language;
use recorder::{save_wav, speech_threshold, AudioRecorder};
use transcriber::{is_non_speech, WhisperTranscriber};

/// Listen-and-transcribe capability.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Calibrate, listen, and transcribe one utterance spoken in `locale`
    /// (e.g. "hi-IN"). Blocks until text is available or capture fails.
    async fn capture(&self, locale: &str) -> Result<String, CaptureError>;
}

enum Backend {
    Ready {
        recorder: Arc<AudioRecorder>,
        transcriber: WhisperTranscriber,
    },
    Unavailable(String),
}

pub struct MicrophoneCapture {
    config: CaptureConfig,
    backend: Backend,
}

impl MicrophoneCapture {
    pub fn new(config: CaptureConfig, recorder: AudioRecorder, transcriber: WhisperTranscriber) -> Self {
        Self {
            config,
            backend: Backend::Ready {
                recorder: Arc::new(recorder),
                transcriber,
            },
        }
    }

    /// A capture adapter whose every call fails with `ServiceUnavailable`.
    pub fn unavailable(config: CaptureConfig, reason: impl Into<String>) -> Self {
        Self {
            config,
            backend: Backend::Unavailable(reason.into()),
        }
    }
}

#[async_trait]
impl SpeechCapture for MicrophoneCapture {
    async fn capture(&self, locale: &str) -> Result<String, CaptureError> {
        let (recorder, transcriber) = match &self.backend {
            Backend::Ready {
                recorder,
                transcriber,
            } => (Arc::clone(recorder), transcriber.clone()),
            Backend::Unavailable(reason) => {
                return Err(CaptureError::ServiceUnavailable(reason.clone()))
            }
        };

        let config = self.config.clone();
        let language = whisper_language(locale).to_string();

        tokio::task::spawn_blocking(move || {
            let ambient = recorder.calibrate(Duration::from_secs_f64(config.calibration_secs));
            let threshold =
                speech_threshold(ambient, config.energy_threshold, config.dynamic_energy_ratio);

            let samples = recorder.listen(threshold, &config)?;

            if let Some(path) = &config.save_wav {
                save_wav(path, &samples, recorder.sample_rate());
            }

            let text = transcriber
                .transcribe(&samples, &language)
                .map_err(CaptureError::ServiceUnavailable)?;

            let text = text.trim();
            if is_non_speech(text) {
                info!("Transcription contained no speech");
                return Err(CaptureError::Unintelligible);
            }
            Ok(text.to_string())
        })
        .await
        .map_err(|e| CaptureError::ServiceUnavailable(format!("capture task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_capture_reports_service_unavailable() {
        let capture = MicrophoneCapture::unavailable(CaptureConfig::default(), "text-only mode");
        let err = capture.capture("en-US").await.unwrap_err();
        assert_eq!(
            err,
            CaptureError::ServiceUnavailable("text-only mode".into())
        );
    }
}
