//! Configuration management for speakdrill

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::ai::RetryPolicy;
use crate::sequencer::{CueTone, SequencerTiming};
use crate::voice::SilencePolicy;
use crate::{Error, Result};

use file::SpeakdrillConfigFile;

/// Default generative API endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// speakdrill configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (practice history, recordings)
    pub data_dir: PathBuf,

    /// Learner's native language
    pub native_language: String,

    /// Generative service configuration
    pub ai: AiConfig,

    /// Playback configuration
    pub playback: PlaybackConfig,

    /// Silence-based auto-stop for recordings
    pub silence: SilencePolicy,
}

/// Generative service configuration
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// API key (from `SPEAKDRILL_API_KEY` or `GEMINI_API_KEY`)
    pub api_key: Option<SecretString>,

    /// REST base URL
    pub base_url: String,

    /// Model for structured generation
    pub text_model: String,

    /// Model for speech synthesis
    pub tts_model: String,

    /// Default voice
    pub voice: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Retry policy for transient failures
    pub retry: RetryPolicy,

    /// Speech cache entries (0 disables)
    pub speech_cache_capacity: usize,

    /// Definition cache entries (0 disables)
    pub definition_cache_capacity: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: "Kore".to_string(),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            speech_cache_capacity: 256,
            definition_cache_capacity: 512,
        }
    }
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Gap, loop gap and cue tone
    pub timing: SequencerTiming,

    /// Default speed multiplier (0.25 to 4.0)
    pub speed: f32,

    /// Keep pitch constant when speed changes
    pub preserve_pitch: bool,

    /// Voice for questions in question/answer drills
    pub question_voice: String,

    /// Voice for answers in question/answer drills
    pub answer_voice: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            timing: SequencerTiming::default(),
            speed: 1.0,
            preserve_pitch: true,
            question_voice: "Kore".to_string(),
            answer_voice: "Puck".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration with `env > toml > default` precedence
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn resolve<F>(fc: SpeakdrillConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AiConfig::default();
        let retry_defaults = RetryPolicy::default();

        let ai = AiConfig {
            api_key: env("SPEAKDRILL_API_KEY")
                .or_else(|| env("GEMINI_API_KEY"))
                .or(fc.ai.api_key)
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            base_url: env("SPEAKDRILL_BASE_URL")
                .or(fc.ai.base_url)
                .unwrap_or(defaults.base_url),
            text_model: env("SPEAKDRILL_TEXT_MODEL")
                .or(fc.ai.text_model)
                .unwrap_or(defaults.text_model),
            tts_model: env("SPEAKDRILL_TTS_MODEL")
                .or(fc.ai.tts_model)
                .unwrap_or(defaults.tts_model),
            voice: env("SPEAKDRILL_VOICE")
                .or(fc.ai.voice)
                .unwrap_or(defaults.voice),
            request_timeout: fc
                .ai
                .timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            retry: RetryPolicy {
                max_retries: fc.ai.max_retries.unwrap_or(retry_defaults.max_retries),
                base_delay: fc
                    .ai
                    .base_delay_ms
                    .map_or(retry_defaults.base_delay, Duration::from_millis),
                max_delay: fc
                    .ai
                    .max_delay_ms
                    .map_or(retry_defaults.max_delay, Duration::from_millis),
            },
            speech_cache_capacity: fc
                .ai
                .speech_cache_capacity
                .unwrap_or(defaults.speech_cache_capacity),
            definition_cache_capacity: fc
                .ai
                .definition_cache_capacity
                .unwrap_or(defaults.definition_cache_capacity),
        };

        let pb = fc.playback;
        let timing_defaults = SequencerTiming::default();
        let cue_defaults = CueTone::default();
        let cue = if pb.cue.unwrap_or(timing_defaults.cue.is_some()) {
            Some(CueTone {
                frequency_hz: pb.cue_hz.unwrap_or(cue_defaults.frequency_hz),
                duration: pb.cue_ms.map_or(cue_defaults.duration, Duration::from_millis),
            })
        } else {
            None
        };
        let playback_defaults = PlaybackConfig::default();
        let playback = PlaybackConfig {
            timing: SequencerTiming {
                clip_gap: pb
                    .clip_gap_ms
                    .map_or(timing_defaults.clip_gap, Duration::from_millis),
                loop_gap: pb
                    .loop_gap_ms
                    .map_or(timing_defaults.loop_gap, Duration::from_millis),
                cue,
            },
            speed: pb.speed.unwrap_or(playback_defaults.speed),
            preserve_pitch: pb.preserve_pitch.unwrap_or(playback_defaults.preserve_pitch),
            question_voice: pb
                .question_voice
                .unwrap_or(playback_defaults.question_voice),
            answer_voice: pb.answer_voice.unwrap_or(playback_defaults.answer_voice),
        };

        if !(0.25..=4.0).contains(&playback.speed) {
            return Err(Error::Config(format!(
                "playback speed {} outside 0.25-4.0",
                playback.speed
            )));
        }

        let silence_defaults = SilencePolicy::default();
        let cap = fc.capture;
        let silence = SilencePolicy {
            threshold: cap.silence_threshold.unwrap_or(silence_defaults.threshold),
            silence_duration: cap
                .silence_ms
                .map_or(silence_defaults.silence_duration, Duration::from_millis),
            poll_interval: cap
                .poll_ms
                .map_or(silence_defaults.poll_interval, Duration::from_millis),
            max_duration: cap
                .max_ms
                .map(Duration::from_millis)
                .or(silence_defaults.max_duration),
        };

        if silence.poll_interval.is_zero() {
            return Err(Error::Config("capture poll interval must be non-zero".to_string()));
        }
        if silence.threshold < 0.0 {
            return Err(Error::Config("silence threshold must be non-negative".to_string()));
        }

        let data_dir = env("SPEAKDRILL_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        Ok(Self {
            data_dir,
            native_language: fc
                .native_language
                .unwrap_or_else(|| "English".to_string()),
            ai,
            playback,
            silence,
        })
    }

    /// Path of the persisted application state
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Directory for learner recordings
    #[must_use]
    pub fn recordings_dir(&self) -> PathBuf {
        self.data_dir.join("recordings")
    }
}

/// Default data directory: `~/.local/share/speakdrill` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/speakdrill"),
        |d| d.data_dir().join("speakdrill"),
    )
}
