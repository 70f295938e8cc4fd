//! Error taxonomy for a conversation turn.
//!
//! Capture and generation errors end the current turn early and are shown
//! to the user as a [`Notice`]; none of them is fatal to the session.

use thiserror::Error;

/// Failure of the listen-and-transcribe step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Audio was captured (or the listen window expired) but produced no text.
    #[error("speech could not be understood")]
    Unintelligible,

    /// The microphone or recognition backend could not be reached.
    #[error("speech recognition unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Failure of the text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("generation backend returned no usable text: {0}")]
    MalformedResponse(String),
}

/// Rejected append to the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("turn content is empty")]
    InvalidTurn,
}

/// Failure inside a speech output engine. Never crosses the
/// `SpeechOutput` seam: playback is best-effort.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech model not loaded")]
    NotLoaded,

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio playback failed: {0}")]
    Playback(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plain-text notice surfaced to the user when a turn ends early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NotUnderstood,
    RecognitionUnavailable,
    GenerationFailed(GenerationError),
}

impl Notice {
    pub fn from_capture(err: &CaptureError) -> Self {
        match err {
            CaptureError::Unintelligible => Self::NotUnderstood,
            CaptureError::ServiceUnavailable(_) => Self::RecognitionUnavailable,
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotUnderstood => write!(f, "Sorry, I could not understand the audio."),
            Self::RecognitionUnavailable => {
                write!(f, "Could not request results from the speech recognition service.")
            }
            Self::GenerationFailed(GenerationError::BackendUnavailable(_)) => write!(
                f,
                "Could not reach the answer service. Please try your question again."
            ),
            Self::GenerationFailed(GenerationError::MalformedResponse(_)) => write!(
                f,
                "The answer service returned an empty reply. Please rephrase your question."
            ),
        }
    }
}
