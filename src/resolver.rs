//! Input resolution: turn one trigger into one normalized input string.
//!
//! Voice and text are mutually exclusive per trigger. A voice activation
//! never consults typed text, and a text submission never opens the mic.

use tracing::{info, warn};

use crate::capture::SpeechCapture;
use crate::error::{CaptureError, Notice};
use crate::language::Language;

/// Event that starts a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    VoiceActivation(Language),
    TextSubmission(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Non-empty, trimmed user input.
    Input(String),
    /// The turn does not proceed. Carries the notice to show, if any.
    NoInput(Option<Notice>),
}

pub async fn resolve(trigger: &Trigger, capture: &dyn SpeechCapture) -> Resolution {
    match trigger {
        Trigger::TextSubmission(text) => match normalize(text) {
            Some(text) => Resolution::Input(text),
            None => Resolution::NoInput(None),
        },
        Trigger::VoiceActivation(language) => {
            let locale = language.locale();
            info!("Voice input requested ({language}, {locale})");
            match capture.capture(locale).await {
                Ok(text) => match normalize(&text) {
                    Some(text) => Resolution::Input(text),
                    None => Resolution::NoInput(Some(Notice::NotUnderstood)),
                },
                Err(e) => {
                    match &e {
                        CaptureError::Unintelligible => info!("Capture produced no usable speech"),
                        CaptureError::ServiceUnavailable(detail) => {
                            warn!("Speech recognition unavailable: {detail}")
                        }
                    }
                    Resolution::NoInput(Some(Notice::from_capture(&e)))
                }
            }
        }
    }
}

fn normalize(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCapture;

    #[tokio::test]
    async fn test_text_is_trimmed() {
        let capture = FakeCapture::heard("unused");
        let resolution = resolve(&Trigger::TextSubmission("  hello \n".into()), &capture).await;
        assert_eq!(resolution, Resolution::Input("hello".into()));
        assert!(capture.locales().is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_is_silent_no_input() {
        let capture = FakeCapture::heard("unused");
        for text in ["", "   ", "\n\t"] {
            let resolution = resolve(&Trigger::TextSubmission(text.into()), &capture).await;
            assert_eq!(resolution, Resolution::NoInput(None));
        }
    }

    #[tokio::test]
    async fn test_voice_uses_mapped_locale() {
        let capture = FakeCapture::heard("मुझे सिरदर्द है");
        let resolution = resolve(&Trigger::VoiceActivation(Language::Hindi), &capture).await;
        assert_eq!(resolution, Resolution::Input("मुझे सिरदर्द है".into()));
        assert_eq!(capture.locales(), vec!["hi-IN".to_string()]);
    }

    #[tokio::test]
    async fn test_unintelligible_voice_resolves_to_notice() {
        let capture = FakeCapture::failing(CaptureError::Unintelligible);
        let resolution = resolve(&Trigger::VoiceActivation(Language::Kannada), &capture).await;
        assert_eq!(resolution, Resolution::NoInput(Some(Notice::NotUnderstood)));
        assert_eq!(capture.locales(), vec!["kn-IN".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_service_has_distinct_notice() {
        let capture = FakeCapture::failing(CaptureError::ServiceUnavailable("offline".into()));
        let resolution = resolve(&Trigger::VoiceActivation(Language::English), &capture).await;
        assert_eq!(
            resolution,
            Resolution::NoInput(Some(Notice::RecognitionUnavailable))
        );
    }

    #[tokio::test]
    async fn test_blank_transcription_is_not_understood() {
        let capture = FakeCapture::heard("   ");
        let resolution = resolve(&Trigger::VoiceActivation(Language::English), &capture).await;
        assert_eq!(resolution, Resolution::NoInput(Some(Notice::NotUnderstood)));
    }
}
