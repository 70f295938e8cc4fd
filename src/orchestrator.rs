//! Turn orchestration with state machine.
//!
//! IDLE → AWAITING_INPUT → GENERATING → SPEAKING → IDLE
//!
//! Any failure returns straight to IDLE. Exactly one turn runs at a time:
//! `handle` takes `&mut self` and only returns once the turn has ended.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::capture::SpeechCapture;
use crate::error::{GenerationError, Notice, SessionError};
use crate::generator::{ResponseGenerator, SYSTEM_DIRECTIVE};
use crate::language::Language;
use crate::resolver::{self, Resolution, Trigger};
use crate::session::{ConversationSession, Role, Turn};
use crate::speech::SpeechOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingInput,
    Generating,
    Speaking,
}

impl TurnState {
    pub fn can_transition_to(self, next: TurnState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::AwaitingInput)
                | (Self::AwaitingInput, Self::Generating)
                | (Self::AwaitingInput, Self::Idle)
                | (Self::Generating, Self::Speaking)
                | (Self::Generating, Self::Idle)
                | (Self::Speaking, Self::Idle)
        )
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::AwaitingInput => write!(f, "AWAITING_INPUT"),
            Self::Generating => write!(f, "GENERATING"),
            Self::Speaking => write!(f, "SPEAKING"),
        }
    }
}

/// Presentation surface the orchestrator reports to while a turn runs.
pub trait Presenter {
    /// The microphone is about to open.
    fn listening(&mut self, language: Language);
    fn notice(&mut self, notice: &Notice);
    /// A turn was appended to the history.
    fn turn(&mut self, turn: &Turn);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No input was resolved. History untouched.
    NoInput(Option<Notice>),
    /// User turn recorded, generation failed.
    Unanswered(GenerationError),
    /// Both turns recorded and the reply was handed to speech output.
    Answered(String),
}

pub struct TurnOrchestrator {
    session: ConversationSession,
    state: TurnState,
    capture: Arc<dyn SpeechCapture>,
    generator: Arc<dyn ResponseGenerator>,
    speech: Arc<dyn SpeechOutput>,
}

impl TurnOrchestrator {
    /// Drive turns for `session`, one conversation per orchestrator.
    pub fn new(
        session: ConversationSession,
        capture: Arc<dyn SpeechCapture>,
        generator: Arc<dyn ResponseGenerator>,
        speech: Arc<dyn SpeechOutput>,
    ) -> Self {
        Self {
            session,
            state: TurnState::Idle,
            capture,
            generator,
            speech,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    /// Run one complete turn for `trigger`.
    pub async fn handle(&mut self, trigger: Trigger, presenter: &mut dyn Presenter) -> TurnOutcome {
        self.transition(TurnState::AwaitingInput);

        if let Trigger::VoiceActivation(language) = &trigger {
            presenter.listening(*language);
        }

        let input = match resolver::resolve(&trigger, self.capture.as_ref()).await {
            Resolution::Input(text) => text,
            Resolution::NoInput(notice) => {
                if let Some(notice) = &notice {
                    presenter.notice(notice);
                }
                self.transition(TurnState::Idle);
                return TurnOutcome::NoInput(notice);
            }
        };

        if let Err(e) = self.record(Role::User, &input, presenter) {
            error!("Resolved input rejected by session: {e}");
            self.transition(TurnState::Idle);
            return TurnOutcome::NoInput(None);
        }

        self.transition(TurnState::Generating);
        let reply = match self.generator.generate(SYSTEM_DIRECTIVE, &input).await {
            Ok(reply) => reply,
            Err(e) => return self.unanswered(e, presenter),
        };

        if let Err(e) = self.record(Role::Assistant, &reply, presenter) {
            error!("Generated reply rejected by session: {e}");
            return self.unanswered(
                GenerationError::MalformedResponse("empty text".into()),
                presenter,
            );
        }

        self.transition(TurnState::Speaking);
        let reply = reply.trim().to_string();
        self.speech.speak(&reply).await;

        self.transition(TurnState::Idle);
        info!("Turn complete ({} turns in history)", self.session.len());
        TurnOutcome::Answered(reply)
    }

    fn record(
        &mut self,
        role: Role,
        content: &str,
        presenter: &mut dyn Presenter,
    ) -> Result<(), SessionError> {
        let turn = self.session.append(role, content)?;
        presenter.turn(turn);
        Ok(())
    }

    fn unanswered(&mut self, err: GenerationError, presenter: &mut dyn Presenter) -> TurnOutcome {
        warn!("Generation failed: {err}");
        presenter.notice(&Notice::GenerationFailed(err.clone()));
        self.transition(TurnState::Idle);
        TurnOutcome::Unanswered(err)
    }

    fn transition(&mut self, next: TurnState) {
        if !self.state.can_transition_to(next) {
            error!("Unexpected transition: {} → {}", self.state, next);
        }
        info!("State: {} → {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::testing::{FakeCapture, FakeGenerator, RecordingPresenter, RecordingSpeech, Shown};

    struct Harness {
        orchestrator: TurnOrchestrator,
        capture: Arc<FakeCapture>,
        generator: Arc<FakeGenerator>,
        speech: Arc<RecordingSpeech>,
        presenter: RecordingPresenter,
    }

    impl Harness {
        fn new(capture: FakeCapture, generator: FakeGenerator) -> Self {
            Self::with_session(ConversationSession::new(), capture, generator)
        }

        fn with_session(
            session: ConversationSession,
            capture: FakeCapture,
            generator: FakeGenerator,
        ) -> Self {
            let capture = Arc::new(capture);
            let generator = Arc::new(generator);
            let speech = Arc::new(RecordingSpeech::default());
            let orchestrator = TurnOrchestrator::new(
                session,
                capture.clone(),
                generator.clone(),
                speech.clone(),
            );
            Self {
                orchestrator,
                capture,
                generator,
                speech,
                presenter: RecordingPresenter::default(),
            }
        }

        async fn text(&mut self, text: &str) -> TurnOutcome {
            self.orchestrator
                .handle(Trigger::TextSubmission(text.into()), &mut self.presenter)
                .await
        }

        async fn voice(&mut self, language: Language) -> TurnOutcome {
            self.orchestrator
                .handle(Trigger::VoiceActivation(language), &mut self.presenter)
                .await
        }
    }

    #[test]
    fn test_state_transitions() {
        use TurnState::*;
        assert!(Idle.can_transition_to(AwaitingInput));
        assert!(AwaitingInput.can_transition_to(Generating));
        assert!(AwaitingInput.can_transition_to(Idle));
        assert!(Generating.can_transition_to(Speaking));
        assert!(Generating.can_transition_to(Idle));
        assert!(Speaking.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Generating));
        assert!(!Idle.can_transition_to(Speaking));
        assert!(!AwaitingInput.can_transition_to(Speaking));
        assert!(!Speaking.can_transition_to(Generating));
        assert!(!Speaking.can_transition_to(AwaitingInput));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TurnState::Idle.to_string(), "IDLE");
        assert_eq!(TurnState::AwaitingInput.to_string(), "AWAITING_INPUT");
        assert_eq!(TurnState::Generating.to_string(), "GENERATING");
        assert_eq!(TurnState::Speaking.to_string(), "SPEAKING");
    }

    #[tokio::test]
    async fn test_text_hello_scenario() {
        let mut h = Harness::new(
            FakeCapture::heard("unused"),
            FakeGenerator::scripted(vec![Ok(
                "Hello! Consult with a Doctor before making any decisions.".into(),
            )]),
        );

        let outcome = h.text("hello").await;

        let reply = "Hello! Consult with a Doctor before making any decisions.";
        assert_eq!(outcome, TurnOutcome::Answered(reply.into()));
        let history = h.orchestrator.session().history();
        assert_eq!(history.len(), 2);
        assert_eq!((history[0].role(), history[0].content()), (Role::User, "hello"));
        assert_eq!((history[1].role(), history[1].content()), (Role::Assistant, reply));
        assert_eq!(h.speech.spoken(), vec![reply.to_string()]);
        assert_eq!(h.orchestrator.state(), TurnState::Idle);
        assert!(h.capture.locales().is_empty());
        assert_eq!(
            h.presenter.shown,
            vec![
                Shown::Turn(Role::User, "hello".into()),
                Shown::Turn(Role::Assistant, reply.into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_directive_is_passed_verbatim_with_input() {
        let mut h = Harness::new(FakeCapture::heard("unused"), FakeGenerator::default());
        h.text("  What should I do for a headache?  ").await;

        assert_eq!(
            h.generator.calls(),
            vec![(
                SYSTEM_DIRECTIVE.to_string(),
                "What should I do for a headache?".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_only_current_input_is_sent() {
        let mut h = Harness::new(FakeCapture::heard("unused"), FakeGenerator::default());
        h.text("first question").await;
        h.text("second question").await;

        let inputs: Vec<String> = h.generator.calls().into_iter().map(|(_, i)| i).collect();
        assert_eq!(inputs, vec!["first question", "second question"]);
    }

    #[tokio::test]
    async fn test_history_grows_by_two_per_answered_turn() {
        let mut h = Harness::new(FakeCapture::heard("I have a fever"), FakeGenerator::default());
        for n in 1..=4 {
            if n % 2 == 0 {
                h.voice(Language::English).await;
            } else {
                h.text(&format!("question {n}")).await;
            }
            assert_eq!(h.orchestrator.session().len(), 2 * n);
        }

        let roles: Vec<Role> = h.orchestrator.session().history().iter().map(Turn::role).collect();
        for pair in roles.chunks(2) {
            assert_eq!(pair, [Role::User, Role::Assistant]);
        }
    }

    #[tokio::test]
    async fn test_unintelligible_voice_leaves_history_unchanged() {
        let mut h = Harness::new(
            FakeCapture::failing(CaptureError::Unintelligible),
            FakeGenerator::default(),
        );
        h.text("hello").await;

        let outcome = h.voice(Language::Hindi).await;

        assert_eq!(outcome, TurnOutcome::NoInput(Some(Notice::NotUnderstood)));
        assert_eq!(h.orchestrator.session().len(), 2);
        assert_eq!(h.generator.calls().len(), 1);
        assert_eq!(h.speech.spoken().len(), 1);
        assert_eq!(h.orchestrator.state(), TurnState::Idle);
        assert_eq!(h.capture.locales(), vec!["hi-IN".to_string()]);
        assert_eq!(
            &h.presenter.shown[2..],
            &[
                Shown::Listening(Language::Hindi),
                Shown::Notice(Notice::NotUnderstood),
            ]
        );
    }

    #[tokio::test]
    async fn test_unavailable_recognition_shows_distinct_notice() {
        let mut h = Harness::new(
            FakeCapture::failing(CaptureError::ServiceUnavailable("no device".into())),
            FakeGenerator::default(),
        );

        let outcome = h.voice(Language::Kannada).await;

        assert_eq!(
            outcome,
            TurnOutcome::NoInput(Some(Notice::RecognitionUnavailable))
        );
        assert!(h.orchestrator.session().is_empty());
        assert!(h.generator.calls().is_empty());
        assert!(h.speech.spoken().is_empty());
    }

    #[tokio::test]
    async fn test_backend_unavailable_keeps_user_turn_only() {
        let err = GenerationError::BackendUnavailable("connection refused".into());
        let mut h = Harness::new(
            FakeCapture::heard("unused"),
            FakeGenerator::scripted(vec![Err(err.clone())]),
        );

        let outcome = h.text("What should I do for a headache?").await;

        assert_eq!(outcome, TurnOutcome::Unanswered(err.clone()));
        let history = h.orchestrator.session().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role(), Role::User);
        assert!(h.speech.spoken().is_empty());
        assert_eq!(h.orchestrator.state(), TurnState::Idle);
        assert_eq!(
            h.presenter.shown.last(),
            Some(&Shown::Notice(Notice::GenerationFailed(err)))
        );
    }

    #[tokio::test]
    async fn test_session_recovers_after_failed_generation() {
        let mut h = Harness::new(
            FakeCapture::heard("unused"),
            FakeGenerator::scripted(vec![Err(GenerationError::MalformedResponse(
                "no candidates".into(),
            ))]),
        );

        h.text("first").await;
        let outcome = h.text("second").await;

        assert_eq!(outcome, TurnOutcome::Answered("Answer: second".into()));
        let roles: Vec<Role> = h.orchestrator.session().history().iter().map(Turn::role).collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Assistant]);
        assert_eq!(h.speech.spoken(), vec!["Answer: second".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_text_is_ignored_silently() {
        let mut h = Harness::new(FakeCapture::heard("unused"), FakeGenerator::default());

        let outcome = h.text("   ").await;

        assert_eq!(outcome, TurnOutcome::NoInput(None));
        assert!(h.orchestrator.session().is_empty());
        assert!(h.generator.calls().is_empty());
        assert!(h.presenter.shown.is_empty());
        assert_eq!(h.orchestrator.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_blank_reply_is_not_recorded_or_spoken() {
        let mut h = Harness::new(
            FakeCapture::heard("unused"),
            FakeGenerator::scripted(vec![Ok("  \n ".into())]),
        );

        let outcome = h.text("hello").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Unanswered(GenerationError::MalformedResponse(_))
        ));
        assert_eq!(h.orchestrator.session().len(), 1);
        assert!(h.speech.spoken().is_empty());
    }

    #[tokio::test]
    async fn test_turns_append_to_the_given_session() {
        let mut session = ConversationSession::new();
        session.append(Role::User, "earlier question").unwrap();
        session.append(Role::Assistant, "earlier answer").unwrap();
        let mut h = Harness::with_session(
            session,
            FakeCapture::heard("unused"),
            FakeGenerator::default(),
        );

        h.text("follow-up").await;

        let contents: Vec<&str> =
            h.orchestrator.session().history().iter().map(Turn::content).collect();
        assert_eq!(
            contents,
            vec!["earlier question", "earlier answer", "follow-up", "Answer: follow-up"]
        );
    }

    #[tokio::test]
    async fn test_voice_turn_uses_selected_locale() {
        let mut h = Harness::new(FakeCapture::heard("ನನಗೆ ಜ್ವರ ಇದೆ"), FakeGenerator::default());

        let outcome = h.voice(Language::Kannada).await;

        assert_eq!(outcome, TurnOutcome::Answered("Answer: ನನಗೆ ಜ್ವರ ಇದೆ".into()));
        assert_eq!(h.capture.locales(), vec!["kn-IN".to_string()]);
        assert_eq!(h.presenter.shown[0], Shown::Listening(Language::Kannada));
    }
}
