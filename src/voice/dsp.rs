//! Sample-level helpers: resampling, time stretching, tones, energy

use crate::{Error, Result};

/// Resampler input rates are rounded to this step to keep FFT sizes small
const RATE_QUANTUM: u32 = 100;

/// Frame length for overlap-add time stretching
const STRETCH_FRAME: usize = 1024;

/// Fade applied to both ends of generated tones
const TONE_FADE_SECS: f32 = 0.005;

/// Resample mono audio using rubato
///
/// # Errors
///
/// Returns error if the resampler cannot be built for these rates
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Audio("sample rate must be non-zero".to_string()));
    }

    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, 1024, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;
    let chunk_size = resampler.input_frames_next();

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize + chunk_size);

    for chunk in input.chunks(chunk_size) {
        let mut block = chunk.to_vec();
        // Pad the tail so the last partial chunk is not dropped
        block.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    output.truncate(expected);

    Ok(output.iter().map(|&s| s as f32).collect())
}

/// Sample rate that makes audio recorded at `rate` play `factor` times faster
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled_rate(rate: u32, factor: f32) -> u32 {
    let scaled = (f64::from(rate) * f64::from(factor) / f64::from(RATE_QUANTUM)).round() as u32;
    scaled.max(1) * RATE_QUANTUM
}

/// Change duration by `rate` without changing pitch (overlap-add)
///
/// `rate > 1` shortens the audio. Inputs shorter than one frame are
/// returned unchanged.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn time_stretch(samples: &[f32], rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < f32::EPSILON || rate <= 0.0 || samples.len() < STRETCH_FRAME {
        return samples.to_vec();
    }

    let synthesis_hop = STRETCH_FRAME / 4;
    let analysis_hop = ((synthesis_hop as f32 * rate).round() as usize).max(1);
    let frames = (samples.len() - STRETCH_FRAME) / analysis_hop + 1;
    let out_len = (frames - 1) * synthesis_hop + STRETCH_FRAME;

    let window: Vec<f32> = (0..STRETCH_FRAME)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / STRETCH_FRAME as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect();

    let mut out = vec![0.0f32; out_len];
    let mut norm = vec![0.0f32; out_len];

    for frame in 0..frames {
        let src = &samples[frame * analysis_hop..frame * analysis_hop + STRETCH_FRAME];
        let dst = frame * synthesis_hop;
        for (i, (&s, &w)) in src.iter().zip(&window).enumerate() {
            out[dst + i] += s * w;
            norm[dst + i] += w;
        }
    }

    for (o, n) in out.iter_mut().zip(norm) {
        if n > 1e-3 {
            *o /= n;
        }
    }

    out
}

/// Generate a sine tone with short fades to avoid clicks
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn tone(frequency_hz: f32, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let len = (rate * duration_secs.max(0.0)) as usize;
    let fade = ((rate * TONE_FADE_SECS) as usize).clamp(1, len.max(1));

    (0..len)
        .map(|i| {
            let t = i as f32 / rate;
            let envelope = (i.min(len - 1 - i) as f32 / fade as f32).min(1.0);
            amplitude * envelope * (2.0 * std::f32::consts::PI * frequency_hz * t).sin()
        })
        .collect()
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
