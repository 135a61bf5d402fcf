//! Shared test utilities
//!
//! In-memory stand-ins for the speaker, the microphone, the clip source and
//! the model backend. All timing uses tokio's clock so tests can run with
//! paused time.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use speakdrill::ai::{GenerateRequest, GenerativeBackend};
use speakdrill::sequencer::{ClipDescriptor, ClipKind, ClipSource, SequencerTiming};
use speakdrill::voice::{
    AudioSink, CaptureDevice, Clip, ClipOrigin, InputStream, PlayOutcome, RenderedAudio,
};
use speakdrill::{Error, Result, SessionToken};
use tokio::time::Instant;

/// Output rate of [`FakeSink`]
pub const OUTPUT_RATE: u32 = 24000;

/// Samples per fake clip (half a second at [`OUTPUT_RATE`])
pub const CLIP_SAMPLES: usize = 12000;

/// Samples per [`ScriptedCapture`] drain (100 ms at 16 kHz)
pub const CHUNK_SAMPLES: usize = 1600;

/// One call to [`FakeSink::play`]
#[derive(Debug, Clone)]
pub struct PlayRecord {
    pub session: u64,
    /// First sample, identifying which clip was played
    pub level: f32,
    pub samples: usize,
    pub started: Instant,
    pub completed: bool,
}

impl PlayRecord {
    /// Cue tones start at zero; fake clips never do
    #[must_use]
    pub fn is_cue(&self) -> bool {
        self.level.abs() < 1e-6
    }
}

/// Speaker that "plays" audio by sleeping for its duration
#[derive(Default)]
pub struct FakeSink {
    plays: Mutex<Vec<PlayRecord>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn plays(&self) -> Vec<PlayRecord> {
        self.plays.lock().unwrap().clone()
    }

    /// Clip plays, without cue tones
    #[must_use]
    pub fn clip_plays(&self) -> Vec<PlayRecord> {
        self.plays().into_iter().filter(|p| !p.is_cue()).collect()
    }

    /// Highest number of overlapping plays seen
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, audio: &RenderedAudio, token: &SessionToken) -> Result<PlayOutcome> {
        if !token.is_current() {
            return Ok(PlayOutcome::Interrupted);
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let slot = {
            let mut plays = self.plays.lock().unwrap();
            plays.push(PlayRecord {
                session: token.id(),
                level: audio.samples().first().copied().unwrap_or_default(),
                samples: audio.samples().len(),
                started: Instant::now(),
                completed: false,
            });
            plays.len() - 1
        };

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => PlayOutcome::Interrupted,
            () = tokio::time::sleep(audio.duration()) => PlayOutcome::Finished,
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        if outcome == PlayOutcome::Finished {
            self.plays.lock().unwrap()[slot].completed = true;
        }
        Ok(outcome)
    }

    fn output_rate(&self) -> u32 {
        OUTPUT_RATE
    }
}

/// Level of the fake clip for `clip N`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn clip_level(n: usize) -> f32 {
    (n + 1) as f32 / 100.0
}

/// Clip source that decodes `clip N` to a constant level
///
/// Text starting with `fail` fails to decode.
#[derive(Default)]
pub struct FakeSource {
    delay: Duration,
    fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take `delay` to produce each clip
    #[must_use]
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipSource for FakeSource {
    async fn fetch(&self, descriptor: &ClipDescriptor) -> Result<Clip> {
        let ClipKind::Speech { text, .. } = &descriptor.kind else {
            return Err(Error::Decode("fake source only speaks".to_string()));
        };
        self.fetched.lock().unwrap().push(text.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if text.starts_with("fail") {
            return Err(Error::Decode(format!("cannot decode {text}")));
        }

        let n = text
            .strip_prefix("clip ")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        Ok(Clip::new(vec![clip_level(n); CLIP_SAMPLES], OUTPUT_RATE, ClipOrigin::Synthesized)
            .with_rate(descriptor.rate))
    }
}

/// `clip 0`, `clip 1`, ...
#[must_use]
pub fn numbered_clips(count: usize) -> Vec<ClipDescriptor> {
    (0..count)
        .map(|n| ClipDescriptor::speech(format!("clip {n}"), "Kore"))
        .collect()
}

/// Short gaps and no cue
#[must_use]
pub fn quiet_timing() -> SequencerTiming {
    SequencerTiming {
        clip_gap: Duration::from_millis(100),
        loop_gap: Duration::from_millis(300),
        cue: None,
    }
}

/// 16-bit PCM of a constant level
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pcm_bytes(level: f32, samples: usize) -> Vec<u8> {
    let value = (level * 32767.0) as i16;
    std::iter::repeat_n(value.to_le_bytes(), samples)
        .flatten()
        .collect()
}

/// Model backend replaying scripted responses
///
/// With an empty script, speech is 100 ms of quiet PCM and generation fails
/// with a permanent error.
#[derive(Default)]
pub struct FakeBackend {
    speech: Mutex<VecDeque<Result<Vec<u8>>>>,
    replies: Mutex<VecDeque<Result<String>>>,
    synth_calls: Mutex<Vec<Instant>>,
    generate_calls: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_speech(&self, result: Result<Vec<u8>>) {
        self.speech.lock().unwrap().push_back(result);
    }

    pub fn push_reply(&self, result: Result<String>) {
        self.replies.lock().unwrap().push_back(result);
    }

    #[must_use]
    pub fn synth_calls(&self) -> Vec<Instant> {
        self.synth_calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn generate_calls(&self) -> Vec<Instant> {
        self.generate_calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.generate_calls.lock().unwrap().push(Instant::now());
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(service_error(400, "no scripted reply")))
    }

    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Vec<u8>> {
        self.synth_calls.lock().unwrap().push(Instant::now());
        self.speech
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(pcm_bytes(0.1, 2400)))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[must_use]
pub fn service_error(status: u16, message: &str) -> Error {
    Error::Service {
        status,
        message: message.to_string(),
        retry_after: None,
    }
}

/// Microphone replaying one level per drain, then silence
pub struct ScriptedCapture {
    levels: Vec<f32>,
    opens: AtomicUsize,
}

impl ScriptedCapture {
    #[must_use]
    pub fn new(levels: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            levels,
            opens: AtomicUsize::new(0),
        })
    }

    /// `loud` chunks of speech followed by silence
    #[must_use]
    pub fn speech_then_silence(loud: usize) -> Arc<Self> {
        Self::new(vec![0.5; loud])
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for ScriptedCapture {
    fn open(&self) -> Result<Box<dyn InputStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            levels: self.levels.iter().copied().collect(),
        }))
    }
}

struct ScriptedStream {
    levels: VecDeque<f32>,
}

impl InputStream for ScriptedStream {
    fn sample_rate(&self) -> u32 {
        16000
    }

    fn drain(&mut self) -> Vec<f32> {
        vec![self.levels.pop_front().unwrap_or(0.0); CHUNK_SAMPLES]
    }
}

/// Generate sine wave audio samples
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32, rate: u32) -> Vec<f32> {
    let num_samples = (rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn generate_silence(duration_secs: f32, rate: u32) -> Vec<f32> {
    vec![0.0; (rate as f32 * duration_secs) as usize]
}
