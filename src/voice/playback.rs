//! Audio playback to speakers
//!
//! The output device is a single shared resource: an [`AudioSink`] plays
//! one clip at a time and only for the session that asked for it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::sync::Mutex;

use crate::sequencer::SessionToken;
use crate::{Error, Result};

/// How often the playback thread checks for completion or interruption
const PLAYBACK_POLL: Duration = Duration::from_millis(20);

/// Extra time allowed past the expected clip length before giving up
const PLAYBACK_GRACE: Duration = Duration::from_millis(500);

/// Mono samples ready for a specific output rate
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl RenderedAudio {
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playing time at the rendered rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// How a call to [`AudioSink::play`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The whole clip was played
    Finished,
    /// The session was superseded before or during playback
    Interrupted,
}

/// The output device
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio` on behalf of `token`'s session
    ///
    /// Implementations must not emit anything when the token is already
    /// stale and must stop as soon as it is superseded.
    ///
    /// # Errors
    ///
    /// Returns error if the device fails
    async fn play(&self, audio: &RenderedAudio, token: &SessionToken) -> Result<PlayOutcome>;

    /// Sample rate clips should be rendered at
    fn output_rate(&self) -> u32;
}

/// Plays audio to the default output device
pub struct CpalSink {
    config: StreamConfig,
    output: Mutex<()>,
}

impl CpalSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let config: StreamConfig = device
            .default_output_config()
            .map_err(|e| Error::Playback(e.to_string()))?
            .into();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            output: Mutex::new(()),
        })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, audio: &RenderedAudio, token: &SessionToken) -> Result<PlayOutcome> {
        let _output = self.output.lock().await;

        if !token.is_current() {
            return Ok(PlayOutcome::Interrupted);
        }
        if audio.samples().is_empty() {
            return Ok(PlayOutcome::Finished);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let config = self.config.clone();
        let samples = Arc::clone(&audio.samples);
        let expected = audio.duration();

        // cpal streams are !Send, so the stream lives and dies on one blocking thread
        let mut worker = tokio::task::spawn_blocking({
            let stop = Arc::clone(&stop);
            move || play_blocking(&config, &samples, expected, &stop)
        });

        tokio::select! {
            joined = &mut worker => {
                joined.map_err(|e| Error::Playback(e.to_string()))??;
                tracing::debug!(samples = audio.samples().len(), "playback complete");
                Ok(PlayOutcome::Finished)
            }
            () = token.cancelled() => {
                stop.store(true, Ordering::SeqCst);
                if let Err(e) = worker.await {
                    tracing::warn!(error = %e, "playback thread failed during interrupt");
                }
                tracing::debug!(session = token.id(), "playback interrupted");
                Ok(PlayOutcome::Interrupted)
            }
        }
    }

    fn output_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

/// Play samples on the default device, returning when done or stopped
fn play_blocking(
    config: &StreamConfig,
    samples: &Arc<[f32]>,
    expected: Duration,
    stop: &AtomicBool,
) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device".to_string()))?;

    let channels = usize::from(config.channels.max(1));
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = device
        .build_output_stream(
            config,
            {
                let samples = Arc::clone(samples);
                let position = Arc::clone(&position);
                let finished = Arc::clone(&finished);
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                    if pos >= samples.len() {
                        finished.store(true, Ordering::SeqCst);
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                Error::Permission("audio output device not available".to_string())
            }
            other => Error::Playback(other.to_string()),
        })?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    let deadline = std::time::Instant::now() + expected + PLAYBACK_GRACE;
    while !finished.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst) {
        if std::time::Instant::now() > deadline {
            tracing::warn!("playback did not drain before deadline");
            break;
        }
        std::thread::sleep(PLAYBACK_POLL);
    }

    drop(stream);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_duration() {
        let audio = RenderedAudio::new(vec![0.0; 12000], 24000);
        assert_eq!(audio.duration(), Duration::from_millis(500));
        assert_eq!(audio.sample_rate(), 24000);

        let empty = RenderedAudio::new(Vec::new(), 0);
        assert_eq!(empty.duration(), Duration::ZERO);
    }
}
