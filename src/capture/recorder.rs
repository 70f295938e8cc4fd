//! Microphone capture with cpal.
//!
//! The input stream stays open on a dedicated audio thread for the whole
//! session. Each capture first measures ambient noise, then waits for
//! speech to start and records until a pause ends the phrase.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{AudioConfig, CaptureConfig};
use crate::error::CaptureError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const PRE_ROLL_SECS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Calibrating,
    Listening,
}

/// State shared between the audio callback and the capturing thread.
struct RecorderInner {
    mode: Mode,
    buffer: Vec<f32>,
    pre_roll: usize,
    max_samples: usize,
    ambient_sum_sq: f64,
    ambient_count: usize,
    threshold: f32,
    pause: Duration,
    speech_started: bool,
    silence_start: Option<Instant>,
    phrase_done: bool,
    stream_error: Option<String>,
}

impl RecorderInner {
    fn new(sample_rate: u32) -> Self {
        Self {
            mode: Mode::Idle,
            buffer: Vec::new(),
            pre_roll: (PRE_ROLL_SECS * sample_rate as f64) as usize,
            max_samples: 0,
            ambient_sum_sq: 0.0,
            ambient_count: 0,
            threshold: 0.0,
            pause: Duration::ZERO,
            speech_started: false,
            silence_start: None,
            phrase_done: false,
            stream_error: None,
        }
    }

    fn begin_calibration(&mut self) {
        self.mode = Mode::Calibrating;
        self.ambient_sum_sq = 0.0;
        self.ambient_count = 0;
    }

    fn ambient_rms(&self) -> f32 {
        if self.ambient_count == 0 {
            return 0.0;
        }
        (self.ambient_sum_sq / self.ambient_count as f64).sqrt() as f32
    }

    fn begin_listening(&mut self, threshold: f32, pause: Duration, max_samples: usize) {
        self.mode = Mode::Listening;
        self.buffer.clear();
        self.threshold = threshold;
        self.pause = pause;
        self.max_samples = max_samples;
        self.speech_started = false;
        self.silence_start = None;
        self.phrase_done = false;
    }

    fn finish(&mut self) -> Vec<f32> {
        self.mode = Mode::Idle;
        std::mem::take(&mut self.buffer)
    }

    /// Consume one callback's worth of samples.
    fn feed(&mut self, data: &[f32], now: Instant) {
        match self.mode {
            Mode::Idle => {}
            Mode::Calibrating => {
                self.ambient_sum_sq += data.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
                self.ambient_count += data.len();
            }
            Mode::Listening => {
                if self.phrase_done {
                    return;
                }

                let rms = rms_energy(data);
                let is_speech = rms >= self.threshold;

                if !self.speech_started {
                    // Keep a short pre-roll so the first syllable isn't clipped
                    self.buffer.extend_from_slice(data);
                    if self.buffer.len() > self.pre_roll {
                        let excess = self.buffer.len() - self.pre_roll;
                        self.buffer.drain(..excess);
                    }
                    if is_speech {
                        debug!("Speech detected (RMS {rms:.4} >= {:.4})", self.threshold);
                        self.speech_started = true;
                    }
                    return;
                }

                let remaining = self.max_samples.saturating_sub(self.buffer.len());
                let to_copy = data.len().min(remaining);
                self.buffer.extend_from_slice(&data[..to_copy]);

                if self.buffer.len() >= self.max_samples {
                    info!("Phrase time limit reached");
                    self.phrase_done = true;
                    return;
                }

                if is_speech {
                    self.silence_start = None;
                } else {
                    let silence_start = *self.silence_start.get_or_insert(now);
                    if now.duration_since(silence_start) >= self.pause {
                        debug!("Pause of {:?} ended the phrase", self.pause);
                        self.phrase_done = true;
                    }
                }
            }
        }
    }
}

/// Audio recorder with an always-open input stream.
pub struct AudioRecorder {
    config: AudioConfig,
    shared: Arc<Mutex<RecorderInner>>,
    /// Dropping this sender stops the audio thread and closes the stream.
    shutdown: Option<mpsc::Sender<()>>,
}

impl AudioRecorder {
    pub fn new(config: AudioConfig) -> Self {
        let shared = Arc::new(Mutex::new(RecorderInner::new(config.sample_rate)));
        Self {
            config,
            shared,
            shutdown: None,
        }
    }

    /// Open the audio stream. Call once at startup.
    pub fn open_stream(&mut self) -> Result<(), String> {
        if self.shutdown.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();

        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match build_input_stream(&config, shared) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until the recorder is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio stream closed");
            })
            .map_err(|e| format!("Failed to spawn audio thread: {e}"))?;

        ready_rx
            .recv()
            .map_err(|_| "Audio thread exited during startup".to_string())??;

        self.shutdown = Some(shutdown_tx);
        info!("Audio stream opened (ready for low-latency capture)");
        Ok(())
    }

    /// Measure ambient noise for `window`. Blocks for the whole window.
    pub fn calibrate(&self, window: Duration) -> f32 {
        self.lock().begin_calibration();
        std::thread::sleep(window);
        let mut inner = self.lock();
        let ambient = inner.ambient_rms();
        inner.mode = Mode::Idle;
        debug!("Ambient noise RMS over {window:?}: {ambient:.4}");
        ambient
    }

    /// Wait for speech above `threshold` and record until a pause ends it.
    ///
    /// Fails with `Unintelligible` if no speech starts within the listen
    /// timeout, and with `ServiceUnavailable` if the stream has reported an
    /// error, before or during this call.
    pub fn listen(&self, threshold: f32, capture: &CaptureConfig) -> Result<Vec<f32>, CaptureError> {
        if self.shutdown.is_none() {
            return Err(CaptureError::ServiceUnavailable("audio stream not open".into()));
        }

        let max_samples =
            (capture.phrase_time_limit_secs * self.config.sample_rate as f64) as usize;
        let wait_timeout = Duration::from_secs_f64(capture.listen_timeout_secs);
        {
            let mut inner = self.lock();
            // A stream error outlives the capture that saw it
            if let Some(err) = inner.stream_error.clone() {
                return Err(CaptureError::ServiceUnavailable(err));
            }
            inner.begin_listening(
                threshold,
                Duration::from_secs_f64(capture.pause_secs),
                max_samples,
            );
        }
        info!("Listening (threshold {threshold:.4})");

        let started = Instant::now();
        loop {
            std::thread::sleep(POLL_INTERVAL);
            let mut inner = self.lock();

            if let Some(err) = inner.stream_error.clone() {
                inner.finish();
                return Err(CaptureError::ServiceUnavailable(err));
            }

            if inner.phrase_done {
                let samples = inner.finish();
                let duration = samples.len() as f64 / self.config.sample_rate as f64;
                info!("Captured {:.1}s of audio ({} samples)", duration, samples.len());
                return Ok(samples);
            }

            if !inner.speech_started && started.elapsed() >= wait_timeout {
                inner.finish();
                info!("No speech within {wait_timeout:?}");
                return Err(CaptureError::Unintelligible);
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderInner> {
        // The callback never panics while holding the lock; recover anyway
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn build_input_stream(
    config: &AudioConfig,
    shared: Arc<Mutex<RecorderInner>>,
) -> Result<Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or("No input audio device available")?;

    info!(
        "Using audio device: {}",
        device.name().unwrap_or("unknown".into())
    );

    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.chunk_size),
    };

    let data_shared = Arc::clone(&shared);
    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                if let Ok(mut inner) = data_shared.lock() {
                    inner.feed(data, Instant::now());
                }
            },
            move |err| {
                warn!("Audio stream error: {err}");
                if let Ok(mut inner) = shared.lock() {
                    inner.stream_error = Some(err.to_string());
                }
            },
            None, // timeout
        )
        .map_err(|e| format!("Failed to build input stream: {e}"))?;

    stream.play().map_err(|e| format!("Failed to start audio stream: {e}"))?;
    Ok(stream)
}

/// Speech threshold for this capture: ambient noise scaled by `ratio`,
/// never below the configured floor.
pub fn speech_threshold(ambient: f32, floor: f32, ratio: f32) -> f32 {
    (ambient * ratio).max(floor)
}

/// Calculate RMS energy of audio samples.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Write captured samples to a 16-bit WAV file for debugging.
pub fn save_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    match hound::WavWriter::create(path, spec) {
        Ok(mut writer) => {
            for &sample in samples {
                // f32 [-1, 1] → i16
                let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                if writer.write_sample(s).is_err() {
                    break;
                }
            }
            if writer.finalize().is_ok() {
                debug!("Saved capture to {}", path.display());
            }
        }
        Err(e) => {
            warn!("Failed to save WAV: {e}");
        }
    }
}
