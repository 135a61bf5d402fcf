//! Recorder integration tests
//!
//! Drives the silence auto-stop with a scripted microphone and paused time.

use std::io::Cursor;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use speakdrill::voice::{CaptureDevice, InputStream, Recorder, SilencePolicy, StopReason};
use speakdrill::{Error, Result};

mod common;
use common::{CHUNK_SAMPLES, ScriptedCapture};

fn policy() -> SilencePolicy {
    SilencePolicy {
        threshold: 0.03,
        silence_duration: Duration::from_secs(3),
        poll_interval: Duration::from_millis(100),
        max_duration: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_stops_after_silence() {
    // One second of speech, then nothing
    let recorder = Recorder::new(ScriptedCapture::speech_then_silence(10), policy());

    let recording = recorder.start_capture().await.unwrap().finished().await.unwrap();

    assert_eq!(recording.stop_reason, StopReason::Silence);
    // Silence starts after the last loud chunk; stop within one poll interval of 3s
    let silence_started = Duration::from_millis(900);
    let silent = recording.elapsed - silence_started;
    assert!(silent >= Duration::from_secs(3), "stopped after {silent:?}");
    assert!(silent <= Duration::from_millis(3100), "stopped after {silent:?}");
    assert!(!recorder.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_speech_resets_silence() {
    let mut levels = vec![0.5; 5];
    levels.extend(vec![0.0; 20]);
    levels.extend(vec![0.5; 5]);
    let recorder = Recorder::new(ScriptedCapture::new(levels), policy());

    let recording = recorder.start_capture().await.unwrap().finished().await.unwrap();

    assert_eq!(recording.stop_reason, StopReason::Silence);
    // Second burst ends at 2.9s
    assert!(recording.elapsed >= Duration::from_millis(5900));
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop() {
    let recorder = Recorder::new(ScriptedCapture::speech_then_silence(1000), policy());

    let handle = recorder.start_capture().await.unwrap();
    tokio::time::sleep(Duration::from_millis(550)).await;
    assert!(recorder.is_capturing());
    assert!(!handle.is_finished());

    let recording = handle.stop().await.unwrap();
    assert_eq!(recording.stop_reason, StopReason::Manual);
    assert!(recording.elapsed >= Duration::from_millis(550));
    assert!(recording.elapsed < Duration::from_millis(700));
    // Six polls plus the final drain
    assert_eq!(recording.samples.len(), 7 * CHUNK_SAMPLES);
    assert!(!recorder.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_max_duration() {
    let recorder = Recorder::new(
        ScriptedCapture::speech_then_silence(1000),
        SilencePolicy {
            max_duration: Some(Duration::from_secs(2)),
            ..policy()
        },
    );

    let recording = recorder.start_capture().await.unwrap().finished().await.unwrap();

    assert_eq!(recording.stop_reason, StopReason::MaxDuration);
    assert!(recording.elapsed >= Duration::from_secs(2));
    assert!(recording.elapsed <= Duration::from_millis(2100));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_capture_rejected() {
    let device = ScriptedCapture::speech_then_silence(1000);
    let recorder = Recorder::new(device.clone(), policy());

    let handle = recorder.start_capture().await.unwrap();
    let second = recorder.start_capture().await;
    assert!(matches!(second, Err(Error::Capture(_))));
    assert_eq!(device.opens(), 1);

    handle.stop().await.unwrap();
    let again = recorder.start_capture().await.unwrap();
    assert_eq!(device.opens(), 2);
    again.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_releases_device() {
    let recorder = Recorder::new(ScriptedCapture::speech_then_silence(1000), policy());

    let handle = recorder.start_capture().await.unwrap();
    drop(handle);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!recorder.is_capturing());
    assert!(recorder.start_capture().await.is_ok());
}

struct DeniedMicrophone;

impl CaptureDevice for DeniedMicrophone {
    fn open(&self) -> Result<Box<dyn InputStream>> {
        Err(Error::Permission("microphone access denied".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_permission_error_is_reported() {
    let recorder = Recorder::new(Arc::new(DeniedMicrophone), policy());

    let result = recorder.start_capture().await;
    assert!(matches!(result, Err(Error::Permission(_))));
    assert!(!recorder.is_capturing());
}

/// Device whose `open` blocks until released from another task
struct GatedMicrophone {
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    inner: Arc<ScriptedCapture>,
}

impl CaptureDevice for GatedMicrophone {
    fn open(&self) -> Result<Box<dyn InputStream>> {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.recv().unwrap();
        }
        self.inner.open()
    }
}

#[tokio::test]
async fn test_blocking_open_leaves_runtime_free() {
    let (release_tx, release_rx) = mpsc::channel();
    let device = GatedMicrophone {
        gate: Mutex::new(Some(release_rx)),
        inner: ScriptedCapture::speech_then_silence(1000),
    };
    let recorder = Recorder::new(Arc::new(device), policy());

    // Only runs if the open is not holding the runtime thread
    let release = tokio::spawn(async move { release_tx.send(()).unwrap() });

    let handle = tokio::time::timeout(Duration::from_secs(5), recorder.start_capture())
        .await
        .expect("device open stalled the runtime")
        .unwrap();
    release.await.unwrap();
    assert!(recorder.is_capturing());

    let recording = handle.stop().await.unwrap();
    assert_eq!(recording.stop_reason, StopReason::Manual);
}

#[tokio::test(start_paused = true)]
async fn test_recording_encodes_as_wav() {
    let recorder = Recorder::new(ScriptedCapture::speech_then_silence(3), policy());
    let recording = recorder.start_capture().await.unwrap().finished().await.unwrap();

    let wav = recording.to_wav().unwrap();
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(reader.len() as usize, recording.samples.len());
}
