//! Audio capture from microphone
//!
//! [`Recorder`] owns the single capture device. While a recording is active
//! it polls the input level on a fixed interval and stops by itself once the
//! [`SilencePolicy`] says the speaker has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::dsp::rms;
use super::silence::{SilenceDetector, SilencePolicy};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// An open input stream
pub trait InputStream: Send {
    /// Rate of the samples returned by [`InputStream::drain`]
    fn sample_rate(&self) -> u32;

    /// Samples captured since the previous call
    fn drain(&mut self) -> Vec<f32>;
}

/// Something that can be opened for recording
pub trait CaptureDevice: Send + Sync {
    /// Start capturing
    ///
    /// May block while the device starts; [`Recorder`] calls it on the
    /// blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `Error::Permission` if access is denied, `Error::Capture` otherwise
    fn open(&self) -> Result<Box<dyn InputStream>>;
}

/// Default input device via cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCapture;

impl CaptureDevice for CpalCapture {
    fn open(&self) -> Result<Box<dyn InputStream>> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<u32>>(1);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        // cpal streams are !Send; keep the stream on its own thread until stopped
        let thread_buffer = Arc::clone(&buffer);
        std::thread::Builder::new()
            .name("speakdrill-capture".to_string())
            .spawn(move || match build_input_stream(thread_buffer) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    // Returns when the sender is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                    tracing::debug!("audio capture stopped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::Capture(e.to_string()))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| Error::Capture("capture thread exited".to_string()))??;

        Ok(Box::new(CpalInputStream {
            buffer,
            sample_rate,
            _stop: stop_tx,
        }))
    }
}

struct CpalInputStream {
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    _stop: std::sync::mpsc::Sender<()>,
}

impl InputStream for CpalInputStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn drain(&mut self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

fn build_input_stream(buffer: Arc<Mutex<Vec<f32>>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Permission("no input device available".to_string()))?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Capture(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .map(|c| c.with_sample_rate(SampleRate(SAMPLE_RATE)));

    // Fall back to the device default and downmix
    let supported = match supported {
        Some(c) => c,
        None => device
            .default_input_config()
            .map_err(|e| Error::Capture(e.to_string()))?,
    };
    let config: StreamConfig = supported.config();
    let channels = usize::from(config.channels.max(1));

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = config.sample_rate.0,
        channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    if channels == 1 {
                        buf.extend_from_slice(data);
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        buf.extend(
                            data.chunks(channels)
                                .map(|f| f.iter().sum::<f32>() / f.len() as f32),
                        );
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                Error::Permission("microphone not available or access denied".to_string())
            }
            other => Error::Capture(other.to_string()),
        })?;

    stream.play().map_err(|e| Error::Capture(e.to_string()))?;
    tracing::debug!("audio capture started");

    Ok((stream, config.sample_rate.0))
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// [`RecordingHandle::stop`] was called or the handle dropped
    Manual,
    /// Input stayed below the threshold for the silence duration
    Silence,
    /// The policy's maximum length was reached
    MaxDuration,
}

/// A finished recording
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub stop_reason: StopReason,
    /// Wall time between start and stop
    pub elapsed: Duration,
}

impl Recording {
    /// MIME type of [`Recording::to_wav`]
    pub const MIME_TYPE: &'static str = "audio/wav";

    /// Encode as 16-bit WAV for upload or storage
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Exclusive owner of the capture device
pub struct Recorder {
    device: Arc<dyn CaptureDevice>,
    policy: SilencePolicy,
    active: Arc<AtomicBool>,
}

impl Recorder {
    #[must_use]
    pub fn new(device: Arc<dyn CaptureDevice>, policy: SilencePolicy) -> Self {
        Self {
            device,
            policy,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a recording is in progress
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn policy(&self) -> &SilencePolicy {
        &self.policy
    }

    /// Begin recording
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if a recording is already active, or the
    /// device's error if it cannot be opened
    pub async fn start_capture(&self) -> Result<RecordingHandle> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Capture("a recording is already in progress".to_string()));
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        let device = Arc::clone(&self.device);
        let stream = tokio::task::spawn_blocking(move || device.open())
            .await
            .map_err(|e| Error::Capture(format!("capture open task failed: {e}")))??;
        let (stop_tx, stop_rx) = oneshot::channel();
        let policy = self.policy;

        tracing::debug!(
            threshold = policy.threshold,
            silence_ms = policy.silence_duration.as_millis(),
            "recording started"
        );

        let task = tokio::spawn(async move {
            let recording = monitor(stream, policy, stop_rx).await;
            drop(guard);
            recording
        });

        Ok(RecordingHandle {
            stop: Some(stop_tx),
            task,
        })
    }
}

/// Clears the active flag when the recording task ends
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A recording in progress; dropping it stops the recording
pub struct RecordingHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Recording>,
}

impl RecordingHandle {
    /// Stop now and collect the audio
    ///
    /// # Errors
    ///
    /// Returns error if the capture task panicked
    pub async fn stop(mut self) -> Result<Recording> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| Error::Capture(e.to_string()))
    }

    /// Wait for the recording to end by itself
    ///
    /// # Errors
    ///
    /// Returns error if the capture task panicked
    pub async fn finished(mut self) -> Result<Recording> {
        (&mut self.task)
            .await
            .map_err(|e| Error::Capture(e.to_string()))
    }

    /// Whether the recording has already ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn monitor(
    mut stream: Box<dyn InputStream>,
    policy: SilencePolicy,
    mut stop_rx: oneshot::Receiver<()>,
) -> Recording {
    let started = Instant::now();
    let mut detector = SilenceDetector::new(policy);
    let mut samples = Vec::new();

    let mut ticker = tokio::time::interval(policy.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let stop_reason = loop {
        tokio::select! {
            // Resolves on stop() and on handle drop
            _ = &mut stop_rx => break StopReason::Manual,
            _ = ticker.tick() => {
                let chunk = stream.drain();
                let energy = rms(&chunk);
                samples.extend_from_slice(&chunk);
                let elapsed = started.elapsed();

                if detector.observe(energy, elapsed) {
                    break StopReason::Silence;
                }
                if policy.max_duration.is_some_and(|max| elapsed >= max) {
                    break StopReason::MaxDuration;
                }
            }
        }
    };

    samples.extend(stream.drain());
    let elapsed = started.elapsed();
    tracing::debug!(
        reason = ?stop_reason,
        samples = samples.len(),
        elapsed_ms = elapsed.as_millis(),
        "recording stopped"
    );

    Recording {
        samples,
        sample_rate: stream.sample_rate(),
        stop_reason,
        elapsed,
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
