//! TOML configuration file loading
//!
//! Supports `~/.config/speakdrill/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SpeakdrillConfigFile {
    /// Where practice history is kept
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Learner's native language, used for translations and definitions
    #[serde(default)]
    pub native_language: Option<String>,

    /// Generative service configuration
    #[serde(default)]
    pub ai: AiFileConfig,

    /// Playback sequencing configuration
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Recording configuration
    #[serde(default)]
    pub capture: CaptureFileConfig,
}

/// Generative service configuration
#[derive(Debug, Default, Deserialize)]
pub struct AiFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Model used for structured text generation
    pub text_model: Option<String>,
    /// Model used for speech synthesis
    pub tts_model: Option<String>,
    /// Default prebuilt voice (e.g. "Kore")
    pub voice: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    /// Entries kept in the synthesized speech cache (0 disables)
    pub speech_cache_capacity: Option<usize>,
    /// Entries kept in the definition cache (0 disables)
    pub definition_cache_capacity: Option<usize>,
}

/// Playback sequencing configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Pause between clips of one pass
    pub clip_gap_ms: Option<u64>,
    /// Pause before the playlist restarts
    pub loop_gap_ms: Option<u64>,
    /// Play a short tone before each following clip
    pub cue: Option<bool>,
    pub cue_hz: Option<f32>,
    pub cue_ms: Option<u64>,
    /// Default playback speed multiplier
    pub speed: Option<f32>,
    pub preserve_pitch: Option<bool>,
    /// Voice for questions in question/answer drills
    pub question_voice: Option<String>,
    /// Voice for answers in question/answer drills
    pub answer_voice: Option<String>,
}

/// Recording configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// RMS level below which input counts as silence
    pub silence_threshold: Option<f32>,
    /// Continuous silence that ends a recording
    pub silence_ms: Option<u64>,
    /// How often input level is checked
    pub poll_ms: Option<u64>,
    /// Hard cap on recording length
    pub max_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SpeakdrillConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SpeakdrillConfigFile {
    let Some(path) = config_file_path() else {
        return SpeakdrillConfigFile::default();
    };

    if !path.exists() {
        return SpeakdrillConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SpeakdrillConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SpeakdrillConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/speakdrill/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("speakdrill").join("config.toml"))
}
