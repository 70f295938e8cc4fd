//! medchat-rs: voice- and text-driven health question assistant.

mod capture;
mod config;
mod console;
mod error;
mod generator;
mod hotkey;
mod language;
mod notifier;
mod orchestrator;
mod resolver;
mod session;
mod speech;
#[cfg(test)]
mod testing;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use capture::recorder::AudioRecorder;
use capture::transcriber::WhisperTranscriber;
use capture::MicrophoneCapture;
use config::{Config, GeneratorBackend};
use language::Language;
use speech::SpeechEngine;

#[derive(Parser, Debug)]
#[command(name = "medchat-rs", about = "Voice and text health question assistant")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Voice input language: English, Hindi or Kannada
    #[arg(short, long)]
    language: Option<Language>,

    /// Generation backend: gemini or ollama
    #[arg(short, long)]
    backend: Option<GeneratorBackend>,

    /// Skip microphone and Whisper setup; typed input only
    #[arg(long)]
    text_only: bool,

    /// Disable spoken replies
    #[arg(long)]
    mute: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so they don't interleave with the transcript
    let filter = if args.verbose {
        EnvFilter::new("debug,ort=info")
    } else {
        EnvFilter::new("info,ort=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("medchat-rs starting");

    let mut config = Config::load(args.config.as_deref());
    if let Some(language) = args.language {
        config.session.language = language;
    }
    if let Some(backend) = args.backend {
        config.generator.backend = backend;
    }
    info!(
        "Generator: {:?}, voice language: {}",
        config.generator.backend, config.session.language
    );

    let generator = generator::from_config(&config)?;

    let capture = if args.text_only {
        MicrophoneCapture::unavailable(config.capture.clone(), "voice input disabled (--text-only)")
    } else {
        match open_microphone(&config).await {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Voice input unavailable: {e}");
                MicrophoneCapture::unavailable(config.capture.clone(), e)
            }
        }
    };

    let speech = if args.mute {
        SpeechEngine::disabled()
    } else {
        SpeechEngine::from_config(&config.tts)
    };
    if !speech.is_enabled() {
        info!("Spoken replies disabled");
    }

    let mut orchestrator = orchestrator::TurnOrchestrator::new(
        session::ConversationSession::new(),
        Arc::new(capture),
        Arc::from(generator),
        Arc::new(speech),
    );

    let push_to_talk = if config.hotkey.enabled && !args.text_only {
        let (tx, rx) = mpsc::channel(4);
        hotkey::HotkeyMonitor::new(&config.hotkey, tx).map(|monitor| {
            tokio::spawn(monitor.run());
            rx
        })
    } else {
        None
    };

    let notifier = notifier::Notifier::new(config.feedback.notifications);
    let mut console = console::Console::new(config.session.language, notifier);
    console.run(&mut orchestrator, push_to_talk).await?;

    Ok(())
}

/// Load Whisper (blocking, takes a few seconds) and open the input stream.
async fn open_microphone(config: &Config) -> Result<MicrophoneCapture, String> {
    info!("Loading Whisper model...");
    let transcriber = tokio::task::spawn_blocking({
        let whisper_config = config.whisper.clone();
        move || WhisperTranscriber::load(&whisper_config)
    })
    .await
    .map_err(|e| format!("Whisper loader panicked: {e}"))??;

    let mut recorder = AudioRecorder::new(config.audio.clone());
    recorder.open_stream()?;

    Ok(MicrophoneCapture::new(
        config.capture.clone(),
        recorder,
        transcriber,
    ))
}
