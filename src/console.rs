//! Terminal front end: reads typed questions and commands, renders the
//! transcript, and forwards push-to-talk presses as voice triggers.

use std::io::Write;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Notice;
use crate::language::Language;
use crate::notifier::Notifier;
use crate::orchestrator::{Presenter, TurnOrchestrator};
use crate::resolver::Trigger;
use crate::session::{ConversationSession, Role, Turn};

const HELP: &str = "\
Type a health question and press Enter, or use a command:
  /voice [language]   speak your question (English, Hindi or Kannada)
  /lang <language>    change the default voice input language
  /history            show the conversation so far
  /help               show this help
  /quit               leave the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(Trigger),
    SetLanguage(Language),
    History,
    Help,
    Quit,
    /// Unusable command; carries the message to show.
    Invalid(String),
}

/// Interpret one line of console input.
pub fn parse_command(line: &str, selected: Language) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(Trigger::TextSubmission(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "voice" | "v" if arg.is_empty() => Command::Ask(Trigger::VoiceActivation(selected)),
        "voice" | "v" => match arg.parse() {
            Ok(language) => Command::Ask(Trigger::VoiceActivation(language)),
            Err(e) => Command::Invalid(e),
        },
        "lang" | "language" => match arg.parse() {
            Ok(language) => Command::SetLanguage(language),
            Err(e) => Command::Invalid(e),
        },
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Invalid(format!("Unknown command /{name}. Type /help for commands.")),
    }
}

/// One transcript line, e.g. "[14:03:22] You: hello".
pub fn render_turn(turn: &Turn) -> String {
    let speaker = match turn.role() {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };
    format!("[{}] {speaker}: {}", turn.at().format("%H:%M:%S"), turn.content())
}

pub struct Console {
    language: Language,
    notifier: Notifier,
    /// Set while a voice turn is waiting for its transcription.
    awaiting_speech: bool,
}

impl Console {
    pub fn new(language: Language, notifier: Notifier) -> Self {
        Self {
            language,
            notifier,
            awaiting_speech: false,
        }
    }

    /// Read input until /quit or end of stdin. Push-to-talk presses that
    /// arrive while a turn is running are dropped.
    pub async fn run(
        &mut self,
        orchestrator: &mut TurnOrchestrator,
        mut push_to_talk: Option<mpsc::Receiver<Instant>>,
    ) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut idle_since = Instant::now();

        println!("Health assistant. Voice input language: {}.", self.language);
        println!("{HELP}");

        loop {
            prompt()?;

            let trigger = tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match parse_command(&line, self.language) {
                        Command::Ask(trigger) => trigger,
                        Command::SetLanguage(language) => {
                            self.language = language;
                            info!("Voice input language: {language} ({})", language.locale());
                            println!("Voice input language set to {language}.");
                            continue;
                        }
                        Command::History => {
                            print_history(orchestrator.session());
                            continue;
                        }
                        Command::Help => {
                            println!("{HELP}");
                            continue;
                        }
                        Command::Quit => break,
                        Command::Invalid(message) => {
                            println!("{message}");
                            continue;
                        }
                    }
                }
                Some(pressed_at) = next_press(&mut push_to_talk) => {
                    if pressed_at < idle_since {
                        debug!("Dropping push-to-talk press from a previous turn");
                        continue;
                    }
                    println!();
                    Trigger::VoiceActivation(self.language)
                }
            };

            let outcome = orchestrator.handle(trigger, self).await;
            debug!("Turn outcome: {outcome:?} (state {})", orchestrator.state());
            idle_since = Instant::now();
        }

        info!("Session ended after {} turns", orchestrator.session().len());
        Ok(())
    }
}

impl Presenter for Console {
    fn listening(&mut self, language: Language) {
        self.awaiting_speech = true;
        println!("Listening for your voice input... ({language})");
    }

    fn notice(&mut self, notice: &Notice) {
        self.awaiting_speech = false;
        println!("{notice}");
        self.notifier.notice(notice);
    }

    fn turn(&mut self, turn: &Turn) {
        if turn.role() == Role::User && self.awaiting_speech {
            self.awaiting_speech = false;
            println!("You said: {}", turn.content());
        }
        println!("{}", render_turn(turn));
    }
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

fn print_history(session: &ConversationSession) {
    if session.is_empty() {
        println!("No conversation yet.");
        return;
    }
    for turn in session.history() {
        println!("{}", render_turn(turn));
    }
}

async fn next_press(rx: &mut Option<mpsc::Receiver<Instant>>) -> Option<Instant> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
