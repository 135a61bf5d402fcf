//! Voice processing module
//!
//! Handles clip decoding and rendering, playback to the output device, and
//! microphone capture with silence-based auto-stop.

mod capture;
mod clip;
pub mod dsp;
mod playback;
mod silence;

pub use capture::{
    CaptureDevice, CpalCapture, InputStream, Recorder, Recording, RecordingHandle, SAMPLE_RATE,
    StopReason, samples_to_wav,
};
pub use clip::{Clip, ClipOrigin, TTS_SAMPLE_RATE};
pub use playback::{AudioSink, CpalSink, PlayOutcome, RenderedAudio};
pub use silence::{SilenceDetector, SilencePolicy};
