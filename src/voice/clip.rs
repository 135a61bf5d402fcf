//! Decoded audio clips
//!
//! A [`Clip`] is one playable utterance: synthesized speech or a learner
//! recording. Clips are decoded once per session and rendered to the sink's
//! output rate with the session's speed applied.

use std::io::Cursor;
use std::time::Duration;

use super::RenderedAudio;
use super::dsp::{resample, scaled_rate, time_stretch};
use crate::{Error, Result};

/// Sample rate of synthesized speech (16-bit mono PCM)
pub const TTS_SAMPLE_RATE: u32 = 24000;

/// Where a clip came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipOrigin {
    /// Text-to-speech output
    Synthesized,
    /// Pre-recorded learner or voice-clone audio
    Recorded,
}

/// A decoded mono audio buffer plus per-clip playback adjustments
#[derive(Debug, Clone)]
pub struct Clip {
    samples: Vec<f32>,
    sample_rate: u32,
    origin: ClipOrigin,
    rate: Option<f32>,
    detune: f32,
}

impl Clip {
    /// Wrap already-decoded samples
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32, origin: ClipOrigin) -> Self {
        Self {
            samples,
            sample_rate,
            origin,
            rate: None,
            detune: 0.0,
        }
    }

    /// Decode 16-bit little-endian mono PCM from the speech service
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` if the payload is empty or has an odd length
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::Decode("empty PCM payload".to_string()));
        }
        if bytes.len() % 2 != 0 {
            return Err(Error::Decode(format!(
                "PCM payload has odd length {}",
                bytes.len()
            )));
        }

        let samples = bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect();

        Ok(Self::new(samples, sample_rate, ClipOrigin::Synthesized))
    }

    /// Decode a stored recording (WAV or MP3)
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` if the container is not recognized or corrupt
    pub fn from_recording(bytes: &[u8]) -> Result<Self> {
        let (samples, sample_rate) = if bytes.starts_with(b"RIFF") {
            decode_wav(bytes)?
        } else if looks_like_mp3(bytes) {
            decode_mp3(bytes)?
        } else {
            return Err(Error::Decode("unrecognized recording format".to_string()));
        };

        if samples.is_empty() {
            return Err(Error::Decode("recording contains no audio".to_string()));
        }

        Ok(Self::new(samples, sample_rate, ClipOrigin::Recorded))
    }

    /// Override the session speed for this clip
    #[must_use]
    pub const fn with_rate(mut self, rate: Option<f32>) -> Self {
        self.rate = rate;
        self
    }

    /// Pitch offset in semitones (recorded clips only)
    #[must_use]
    pub const fn with_detune(mut self, semitones: f32) -> Self {
        self.detune = semitones;
        self
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn origin(&self) -> ClipOrigin {
        self.origin
    }

    /// Unadjusted length of the clip
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Pitch multiplier from detune; synthesized speech is never detuned
    #[must_use]
    pub fn pitch_factor(&self) -> f32 {
        match self.origin {
            ClipOrigin::Recorded if self.detune.abs() > f32::EPSILON => {
                2f32.powf(self.detune / 12.0)
            }
            _ => 1.0,
        }
    }

    /// Render for an output device running at `out_rate`
    ///
    /// The clip's own rate override wins over `speed`. With `preserve_pitch`
    /// the rate changes duration only; otherwise it shifts pitch as well.
    ///
    /// # Errors
    ///
    /// Returns error if resampling fails
    pub fn render(&self, speed: f32, preserve_pitch: bool, out_rate: u32) -> Result<RenderedAudio> {
        let rate = self.rate.unwrap_or(speed);
        if rate <= 0.0 || !rate.is_finite() {
            return Err(Error::InvalidInput(format!("invalid playback rate {rate}")));
        }
        let pitch = self.pitch_factor();

        let samples = if preserve_pitch {
            let stretched = time_stretch(&self.samples, rate);
            resample(&stretched, scaled_rate(self.sample_rate, pitch), out_rate)?
        } else {
            resample(&self.samples, scaled_rate(self.sample_rate, rate * pitch), out_rate)?
        };

        tracing::trace!(
            origin = ?self.origin,
            rate,
            pitch,
            preserve_pitch,
            input = self.samples.len(),
            output = samples.len(),
            "clip rendered"
        );

        Ok(RenderedAudio::new(samples, out_rate))
    }
}

fn looks_like_mp3(bytes: &[u8]) -> bool {
    bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
}

/// Decode WAV bytes to mono f32 samples
#[allow(clippy::cast_precision_loss)]
fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Decode(e.to_string()))?
        }
    };

    Ok((downmix(&interleaved, channels), spec.sample_rate))
}

/// Decode MP3 bytes to mono f32 samples
#[allow(clippy::cast_sign_loss)]
fn decode_mp3(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate.max(0) as u32;
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels.max(1)));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Decode(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Decode("MP3 stream has no frames".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Average interleaved channels into one
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
