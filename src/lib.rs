//! speakdrill - Spoken language drills with generated speech and pronunciation feedback
//!
//! This library provides the core of the speakdrill practice tool:
//! - Audio sequencing of synthesized and recorded clips with session cancellation
//! - Generative AI client with retry, bounded caches and schema validation
//! - Microphone capture with silence-based auto-stop
//! - Local persistence of practice history and document import/export
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                       CLI                            │
//! │   play  │  practice  │  exam  │  history  │  ...    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    speakdrill                        │
//! │   Sequencer  │  Recorder  │  Store  │  Document     │
//! └──────┬───────────────┬──────────────────────────────┘
//!        │               │
//! ┌──────▼──────┐ ┌──────▼──────────────────────────────┐
//! │  AI client  │ │  Audio devices (cpal)                │
//! │  TTS │ JSON │ │  output sink  │  capture             │
//! └─────────────┘ └─────────────────────────────────────┘
//! ```

pub mod ai;
pub mod config;
pub mod document;
pub mod error;
pub mod exam;
pub mod markup;
pub mod sequencer;
pub mod store;
pub mod voice;

pub use ai::{AiClient, GenerativeBackend, RetryPolicy};
pub use config::Config;
pub use error::{Error, Result};
pub use exam::{ExamStage, MockExam};
pub use sequencer::{PlaybackState, Playlist, Sequencer, SessionToken};
pub use store::{AppState, PracticeSession};
