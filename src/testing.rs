//! In-memory fakes for the capture, generation, speech and presentation seams.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::capture::SpeechCapture;
use crate::error::{CaptureError, GenerationError, Notice};
use crate::generator::ResponseGenerator;
use crate::language::Language;
use crate::orchestrator::Presenter;
use crate::session::{Role, Turn};
use crate::speech::SpeechOutput;

pub struct FakeCapture {
    result: Result<String, CaptureError>,
    locales: Mutex<Vec<String>>,
}

impl FakeCapture {
    pub fn heard(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            locales: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: CaptureError) -> Self {
        Self {
            result: Err(err),
            locales: Mutex::new(Vec::new()),
        }
    }

    pub fn locales(&self) -> Vec<String> {
        self.locales.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechCapture for FakeCapture {
    async fn capture(&self, locale: &str) -> Result<String, CaptureError> {
        self.locales.lock().unwrap().push(locale.to_string());
        self.result.clone()
    }
}

/// Replays scripted results, then answers "Answer: {input}".
#[derive(Default)]
pub struct FakeGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeGenerator {
    pub fn scripted(results: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (directive, input) pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for FakeGenerator {
    async fn generate(&self, directive: &str, input: &str) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((directive.to_string(), input.to_string()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("Answer: {input}")))
    }
}

#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechOutput for RecordingSpeech {
    async fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Listening(Language),
    Notice(Notice),
    Turn(Role, String),
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub shown: Vec<Shown>,
}

impl Presenter for RecordingPresenter {
    fn listening(&mut self, language: Language) {
        self.shown.push(Shown::Listening(language));
    }

    fn notice(&mut self, notice: &Notice) {
        self.shown.push(Shown::Notice(notice.clone()));
    }

    fn turn(&mut self, turn: &Turn) {
        self.shown
            .push(Shown::Turn(turn.role(), turn.content().to_string()));
    }
}
