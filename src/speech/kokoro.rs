//! Kokoro TTS engine: text → phonemes → ONNX inference → audio playback.
//!
//! Pipeline:
//! 1. Text → sentences (split on .!?)
//! 2. Sentence → phonemes (misaki-rs G2P)
//! 3. Phonemes → token IDs (tokenizer.json vocabulary)
//! 4. Token IDs + voice style + speed → ONNX inference → f32 audio (24kHz)
//! 5. Audio → rodio Sink, blocking until playback ends

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use ndarray::{Array1, Array2, Array3};
use ndarray_npy::NpzReader;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use crate::config::TTSConfig;
use crate::error::SpeechError;

const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension
const STYLE_DIM: usize = 256;

/// Timing of one spoken reply.
#[derive(Debug, Default)]
pub struct SpeakStats {
    pub sentences: usize,
    pub generate_ms: f64,
    pub playback_ms: f64,
    /// Sentences left unplayed after a playback failure, joined.
    pub unspoken: String,
}

pub struct KokoroTts {
    // ort 2.0 Session::run needs &mut
    session: Mutex<Session>,
    phonemizer: misaki_rs::G2P,
    vocab: HashMap<char, i64>,
    /// Voice name → style vectors indexed by token count, shape (510, 256).
    voices: HashMap<String, Array2<f32>>,
    voice: String,
    speed: f32,
    output: OutputStream,
}

impl KokoroTts {
    /// Load the ONNX model, tokenizer, voices, phonemizer and audio output.
    /// Blocking; call once at startup.
    pub fn load(config: &TTSConfig) -> Result<Self, SpeechError> {
        let t0 = Instant::now();
        let dir = if config.model_dir.is_empty() {
            std::env::current_dir().unwrap_or_default()
        } else {
            PathBuf::from(&config.model_dir)
        };

        let tokenizer_path = dir.join("tokenizer.json");
        info!("Loading tokenizer from {}", tokenizer_path.display());
        let vocab = load_tokenizer(&tokenizer_path)?;

        let voices_path = dir.join("voices-v1.0.bin");
        info!("Loading voices from {}", voices_path.display());
        let voices = load_voices(&voices_path)?;
        if !voices.contains_key(&config.voice) {
            let mut names: Vec<&String> = voices.keys().collect();
            names.sort();
            return Err(SpeechError::Synthesis(format!(
                "Unknown voice '{}' (available: {names:?})",
                config.voice
            )));
        }

        let model_path = dir.join("kokoro-v1.0.onnx");
        info!("Loading ONNX model from {}", model_path.display());
        let load_err = |stage: &str, e: &dyn std::fmt::Display| {
            SpeechError::Synthesis(format!("Failed to {stage}: {e}"))
        };
        let session = Session::builder()
            .map_err(|e| load_err("create ONNX session builder", &e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err("set optimization level", &e))?
            .with_intra_threads(4)
            .map_err(|e| load_err("set thread count", &e))?
            .commit_from_file(&model_path)
            .map_err(|e| load_err("load ONNX model", &e))?;

        let phonemizer = misaki_rs::G2P::new(misaki_rs::Language::EnglishUS);

        let output = OutputStreamBuilder::open_default_stream()
            .map_err(|e| SpeechError::Playback(format!("Failed to open audio output: {e}")))?;

        info!(
            "Kokoro TTS loaded in {}ms ({} voices, voice: {}, speed: {})",
            t0.elapsed().as_millis(),
            voices.len(),
            config.voice,
            config.speed
        );

        Ok(Self {
            session: Mutex::new(session),
            phonemizer,
            vocab,
            voices,
            voice: config.voice.clone(),
            speed: config.speed,
            output,
        })
    }

    /// Speak text sentence by sentence. Returns once playback has finished.
    ///
    /// Fails if no sentence was played (e.g. text the English phonemizer
    /// can't handle), so the caller can fall back. If playback breaks after
    /// some sentences were heard, the rest is returned in `unspoken`.
    pub async fn speak(&self, text: &str) -> Result<SpeakStats, SpeechError> {
        let sentences = split_sentences(text.trim());
        let mut stats = SpeakStats::default();

        for (i, sentence) in sentences.iter().enumerate() {
            let t_gen = Instant::now();
            let samples = match self.synthesize(sentence) {
                Ok(s) => s,
                Err(e) => {
                    warn!("TTS generation failed for sentence {}: {e}", i + 1);
                    continue;
                }
            };
            stats.generate_ms += t_gen.elapsed().as_secs_f64() * 1000.0;

            if samples.is_empty() {
                continue;
            }

            let t_play = Instant::now();
            if let Err(e) = self.play(samples).await {
                if stats.sentences == 0 {
                    return Err(e);
                }
                warn!("Playback failed at sentence {}: {e}", i + 1);
                stats.unspoken = sentences[i..].join(" ");
                break;
            }
            let play_ms = t_play.elapsed().as_secs_f64() * 1000.0;
            stats.playback_ms += play_ms;
            stats.sentences += 1;

            debug!("Sentence {}/{}: play={:.1}s", i + 1, sentences.len(), play_ms / 1000.0);
        }

        if stats.sentences == 0 {
            return Err(SpeechError::Synthesis("no audio generated".into()));
        }
        Ok(stats)
    }

    /// Generate audio samples for a single sentence.
    fn synthesize(&self, text: &str) -> Result<Vec<f32>, SpeechError> {
        let (phonemes, _tokens) = self
            .phonemizer
            .g2p(text)
            .map_err(|e| SpeechError::Synthesis(format!("Phonemization failed: {e}")))?;

        let token_ids = tokenize(&phonemes, &self.vocab);
        if token_ids.len() <= 2 {
            return Ok(Vec::new());
        }
        let n_tokens = token_ids.len();

        let styles = self.voices.get(&self.voice).ok_or(SpeechError::NotLoaded)?;
        let style_idx = n_tokens.saturating_sub(2).min(styles.nrows() - 1);
        let style_vec: Vec<f32> = styles.row(style_idx).to_vec();

        let tokens = Array2::from_shape_vec((1, n_tokens), token_ids)
            .map_err(|e| SpeechError::Synthesis(format!("Bad tokens shape: {e}")))?;
        let style = Array2::from_shape_vec((1, STYLE_DIM), style_vec)
            .map_err(|e| SpeechError::Synthesis(format!("Bad style shape: {e}")))?;
        let speed = Array1::from_vec(vec![self.speed]);

        let tokens_tensor = Tensor::from_array(tokens)
            .map_err(|e| SpeechError::Synthesis(format!("Failed to create tokens tensor: {e}")))?;
        let style_tensor = Tensor::from_array(style)
            .map_err(|e| SpeechError::Synthesis(format!("Failed to create style tensor: {e}")))?;
        let speed_tensor = Tensor::from_array(speed)
            .map_err(|e| SpeechError::Synthesis(format!("Failed to create speed tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SpeechError::Synthesis("ONNX session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| SpeechError::Synthesis(format!("ONNX inference failed: {e}")))?;

        let (_name, audio) = outputs
            .iter()
            .next()
            .ok_or_else(|| SpeechError::Synthesis("No output tensor from model".into()))?;
        let (_shape, samples) = audio
            .try_extract_tensor::<f32>()
            .map_err(|e| SpeechError::Synthesis(format!("Failed to extract audio: {e}")))?;

        Ok(samples.to_vec())
    }

    async fn play(&self, samples: Vec<f32>) -> Result<(), SpeechError> {
        let sink = Sink::connect_new(self.output.mixer());
        sink.append(SamplesBuffer::new(1, SAMPLE_RATE, samples));

        tokio::task::spawn_blocking(move || sink.sleep_until_end())
            .await
            .map_err(|e| SpeechError::Playback(format!("Playback task failed: {e}")))
    }
}

/// Map phonemes to token IDs, padded with 0 on both ends and capped at
/// the style table size. Unknown characters are skipped.
fn tokenize(phonemes: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    let mut ids = Vec::with_capacity(phonemes.len() + 2);
    ids.push(0);
    ids.extend(phonemes.chars().filter_map(|ch| vocab.get(&ch).copied()));
    ids.truncate(MAX_TOKENS - 1);
    ids.push(0);
    ids
}

/// Load tokenizer vocabulary from tokenizer.json.
fn load_tokenizer(path: &Path) -> Result<HashMap<char, i64>, SpeechError> {
    let contents = fs::read_to_string(path)?;
    let data: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| SpeechError::Synthesis(format!("Failed to parse tokenizer JSON: {e}")))?;

    let vocab = data["model"]["vocab"]
        .as_object()
        .ok_or_else(|| SpeechError::Synthesis("Missing model.vocab in tokenizer.json".into()))?;

    Ok(vocab
        .iter()
        .filter_map(|(token, id)| Some((token.chars().next()?, id.as_i64()?)))
        .collect())
}

/// Load all voice styles from an NPZ file, squeezing (510, 1, 256) → (510, 256).
fn load_voices(path: &Path) -> Result<HashMap<String, Array2<f32>>, SpeechError> {
    let npz_err = |e: ndarray_npy::ReadNpzError| SpeechError::Synthesis(format!("Voices file: {e}"));
    let mut npz = NpzReader::new(fs::File::open(path)?).map_err(npz_err)?;

    let mut voices = HashMap::new();
    for entry in npz.names().map_err(npz_err)? {
        let arr: Array3<f32> = npz.by_name(&entry).map_err(npz_err)?;
        let (rows, dim) = (arr.shape()[0], arr.shape()[2]);
        let styles = arr
            .into_shape_with_order((rows, dim))
            .map_err(|e| SpeechError::Synthesis(format!("Failed to reshape voice '{entry}': {e}")))?;
        voices.insert(entry.trim_end_matches(".npy").to_string(), styles);
    }

    Ok(voices)
}

/// Split text into sentences at .!? boundaries followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?')
            && bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace)
        {
            let s = text[start..=i].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = i + 1;
        }
    }

    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }

    sentences
}
