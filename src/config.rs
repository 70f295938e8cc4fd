//! Configuration management for medchat-rs.
//!
//! Loads config from a YAML file in standard locations. Every section
//! falls back to defaults, so partial files are fine.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::language::Language;

/// Deserialized through `FromStr` so YAML and CLI accept the same spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum GeneratorBackend {
    #[default]
    Gemini,
    Ollama,
}

impl std::str::FromStr for GeneratorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("Unknown generator backend: {other}")),
        }
    }
}

impl TryFrom<String> for GeneratorBackend {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
    pub host: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:3b".into(),
            host: "http://localhost:11434".into(),
            timeout_secs: 120,
        }
    }
}

/// Sampling parameters sent with every generation call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub calibration_secs: f64,
    pub energy_threshold: f32,
    pub dynamic_energy_ratio: f32,
    pub pause_secs: f64,
    pub listen_timeout_secs: f64,
    pub phrase_time_limit_secs: f64,
    pub save_wav: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            calibration_secs: 1.0,
            energy_threshold: 0.01,
            dynamic_energy_ratio: 1.5,
            pause_secs: 0.8,
            listen_timeout_secs: 10.0,
            phrase_time_limit_secs: 30.0,
            save_wav: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub model: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: "large-v3-turbo".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum TtsBackend {
    #[default]
    Kokoro,
    Espeak,
    None,
}

impl std::str::FromStr for TtsBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kokoro" => Ok(Self::Kokoro),
            "espeak" | "espeak-ng" => Ok(Self::Espeak),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("Unknown TTS backend: {other}")),
        }
    }
}

impl TryFrom<String> for TtsBackend {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TTSConfig {
    pub backend: TtsBackend,
    pub voice: String,
    pub speed: f32,
    pub model_dir: String,
    pub espeak_voice: String,
    pub espeak_rate: u32,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::Kokoro,
            voice: "af_heart".into(),
            speed: 1.0,
            model_dir: String::new(),
            espeak_voice: "en-us".into(),
            espeak_rate: 165,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub enabled: bool,
    pub combo: Vec<String>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            combo: vec!["KEY_LEFTCTRL".into(), "KEY_F9".into()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub notifications: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub language: Language,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
    pub generation: GenerationConfig,
    pub audio: AudioConfig,
    pub capture: CaptureConfig,
    pub whisper: WhisperConfig,
    pub tts: TTSConfig,
    pub hotkey: HotkeyConfig,
    pub feedback: FeedbackConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/medchat/config.yaml
    /// 3. /etc/medchat/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/medchat/config.yaml")),
                Some(PathBuf::from("/etc/medchat/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_defaults() {
        let generation = GenerationConfig::default();
        assert_eq!(generation.temperature, 0.4);
        assert_eq!(generation.top_p, 0.95);
        assert_eq!(generation.top_k, 40);
        assert_eq!(generation.max_output_tokens, 8192);
        assert_eq!(generation.response_mime_type, "text/plain");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::parse(
            "generator:\n  backend: ollama\nsession:\n  language: Hindi\ncapture:\n  pause_secs: 1.2\n",
        )
        .unwrap();
        assert_eq!(config.generator.backend, GeneratorBackend::Ollama);
        assert_eq!(config.session.language, Language::Hindi);
        assert_eq!(config.capture.pause_secs, 1.2);
        assert_eq!(config.capture.calibration_secs, 1.0);
        assert_eq!(config.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.generation, GenerationConfig::default());
    }

    #[test]
    fn test_tts_backend_parse() {
        let config = Config::parse("tts:\n  backend: espeak\n  espeak_voice: hi\n").unwrap();
        assert_eq!(config.tts.backend, TtsBackend::Espeak);
        assert_eq!(config.tts.espeak_voice, "hi");
        assert_eq!(config.tts.voice, "af_heart");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.generator.backend, GeneratorBackend::Gemini);
        assert!(!config.hotkey.enabled);
        assert!(!config.feedback.notifications);
    }

    #[test]
    fn test_enum_values_are_case_insensitive() {
        let spellings = [
            ("ollama", "hindi", "espeak"),
            ("Ollama", "Hindi", "Espeak"),
            ("OLLAMA", "HINDI", "espeak-ng"),
        ];
        for (backend, language, tts) in spellings {
            let yaml = format!(
                "generator:\n  backend: {backend}\nsession:\n  language: {language}\ntts:\n  backend: {tts}\n"
            );
            let config = Config::parse(&yaml).unwrap();
            assert_eq!(config.generator.backend, GeneratorBackend::Ollama);
            assert_eq!(config.session.language, Language::Hindi);
            assert_eq!(config.tts.backend, TtsBackend::Espeak);
        }
    }

    #[test]
    fn test_lowercase_language_keeps_rest_of_file() {
        let config =
            Config::parse("generator:\n  backend: ollama\nsession:\n  language: kannada\n")
                .unwrap();
        assert_eq!(config.generator.backend, GeneratorBackend::Ollama);
        assert_eq!(config.session.language, Language::Kannada);
    }

    #[test]
    fn test_unknown_language_is_rejected() {
        assert!(Config::parse("session:\n  language: Klingon\n").is_err());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Gemini".parse::<GeneratorBackend>().unwrap(), GeneratorBackend::Gemini);
        assert_eq!("ollama".parse::<GeneratorBackend>().unwrap(), GeneratorBackend::Ollama);
        assert!("openai".parse::<GeneratorBackend>().is_err());
    }
}
