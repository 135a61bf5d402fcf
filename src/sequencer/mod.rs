//! Audio sequencer
//!
//! Plays a [`Playlist`] clip by clip with gaps, an optional cue tone and
//! looping. Each `start` opens a new session and supersedes the previous
//! one; work belonging to a superseded session is discarded as soon as it
//! resumes, so only the newest session ever reaches the output device.

mod playlist;
mod session;
mod source;
mod state;

pub use playlist::{
    ClipDescriptor, ClipKind, Cursor, LoopPolicy, PlayMode, PlaybackOptions, Playlist, Step,
};
pub use session::{SessionClock, SessionToken};
pub use source::{ClipSource, StandardClipSource};
pub use state::{InvalidTransition, PlaybackState, Transition};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::voice::{AudioSink, PlayOutcome, RenderedAudio, dsp};
use crate::{Error, Result};

/// Buffered events per subscriber
const EVENT_CAPACITY: usize = 64;

/// Cue tone level
const CUE_AMPLITUDE: f32 = 0.2;

/// Short beep played before each following clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueTone {
    pub frequency_hz: f32,
    pub duration: Duration,
}

impl Default for CueTone {
    fn default() -> Self {
        Self {
            frequency_hz: 880.0,
            duration: Duration::from_millis(150),
        }
    }
}

impl CueTone {
    fn render(&self, sample_rate: u32) -> RenderedAudio {
        RenderedAudio::new(
            dsp::tone(
                self.frequency_hz,
                self.duration.as_secs_f32(),
                sample_rate,
                CUE_AMPLITUDE,
            ),
            sample_rate,
        )
    }
}

/// Pauses between clips
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerTiming {
    /// Between clips of one pass
    pub clip_gap: Duration,
    /// Before the playlist (or single item) starts over
    pub loop_gap: Duration,
    pub cue: Option<CueTone>,
}

impl Default for SequencerTiming {
    fn default() -> Self {
        Self {
            clip_gap: Duration::from_millis(800),
            loop_gap: Duration::from_millis(2000),
            cue: Some(CueTone::default()),
        }
    }
}

/// Broadcast to subscribers; `session` is the token id the event belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
    State { session: u64, state: PlaybackState },
    Failed { session: u64, message: String },
}

impl SequencerEvent {
    #[must_use]
    pub const fn session(&self) -> u64 {
        match self {
            Self::State { session, .. } | Self::Failed { session, .. } => *session,
        }
    }
}

/// Why a session's task stopped early
enum Halt {
    /// A newer session took over; nothing to report
    Superseded,
    Failed(Error),
}

type HaltResult<T> = std::result::Result<T, Halt>;

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Self::Failed(e)
    }
}

struct Inner {
    clock: SessionClock,
    state: Mutex<PlaybackState>,
    failure: Mutex<Option<(u64, Error)>>,
    events: broadcast::Sender<SequencerEvent>,
    sink: Arc<dyn AudioSink>,
    source: Arc<dyn ClipSource>,
    timing: SequencerTiming,
}

/// Session-scoped playlist player
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

impl Sequencer {
    #[must_use]
    pub fn new(
        sink: Arc<dyn AudioSink>,
        source: Arc<dyn ClipSource>,
        timing: SequencerTiming,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                clock: SessionClock::new(),
                state: Mutex::new(PlaybackState::Idle),
                failure: Mutex::new(None),
                events,
                sink,
                source,
                timing,
            }),
        }
    }

    /// Supersede any current session and start playing `playlist`
    ///
    /// Returns as soon as the session is set up; playback runs on a
    /// spawned task. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an out-of-range single index or a
    /// non-positive speed. The current session is left untouched then.
    pub fn start(&self, playlist: Playlist, options: PlaybackOptions) -> Result<SessionToken> {
        if !(options.speed.is_finite() && options.speed > 0.0) {
            return Err(Error::InvalidInput(format!("invalid speed {}", options.speed)));
        }
        let cursor = Cursor::new(&playlist, &options)?;

        let token = {
            let mut state = self.inner.lock_state();
            let token = self.inner.clock.begin();
            *state = PlaybackState::Loading {
                index: cursor.index(),
            };
            self.inner.emit(SequencerEvent::State {
                session: token.id(),
                state: *state,
            });
            token
        };

        tracing::debug!(
            session = token.id(),
            clips = playlist.len(),
            loops = ?options.loops,
            mode = ?options.mode,
            speed = options.speed,
            "playback session started"
        );

        let inner = Arc::clone(&self.inner);
        let session = token.clone();
        tokio::spawn(async move {
            inner.run(session, playlist, options, cursor).await;
        });

        Ok(token)
    }

    /// Stop the current session, if any
    ///
    /// Pending gaps are cancelled and the sink is interrupted. Calling this
    /// while idle changes nothing.
    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        let session = self.inner.clock.current();
        self.inner.clock.invalidate();

        if state.is_active() {
            *state = PlaybackState::Idle;
            self.inner.emit(SequencerEvent::State {
                session,
                state: PlaybackState::Idle,
            });
            tracing::debug!(session, "playback stopped");
        }
    }

    /// Start `playlist` and wait until its session ends
    ///
    /// Being superseded by another `start` or by `stop` counts as ending.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the session
    pub async fn play_to_end(&self, playlist: Playlist, options: PlaybackOptions) -> Result<()> {
        let mut events = self.subscribe();
        let token = self.start(playlist, options)?;

        loop {
            if !token.is_current() && !self.inner.has_failure(token.id()) {
                return Ok(());
            }

            match events.recv().await {
                Ok(SequencerEvent::Failed { session, message }) if session == token.id() => {
                    return Err(self.inner.take_failure(session).unwrap_or(Error::Playback(message)));
                }
                Ok(SequencerEvent::State {
                    session,
                    state: PlaybackState::Idle,
                }) if session == token.id() => return Ok(()),
                Ok(event) if event.session() > token.id() => return Ok(()),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "sequencer events lagged");
                    if let Some(error) = self.inner.take_failure(token.id()) {
                        return Err(error);
                    }
                    if !self.state().is_active() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        *self.inner.lock_state()
    }

    /// Id of the newest session
    #[must_use]
    pub fn current_session(&self) -> u64 {
        self.inner.clock.current()
    }

    /// Receive state changes and failures
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn timing(&self) -> &SequencerTiming {
        &self.inner.timing
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SequencerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn has_failure(&self, session: u64) -> bool {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(id, _)| *id == session)
    }

    fn take_failure(&self, session: u64) -> Option<Error> {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.as_ref().is_some_and(|(id, _)| *id == session) {
            failure.take().map(|(_, e)| e)
        } else {
            None
        }
    }

    /// Apply a transition for `token`'s session, or report it superseded
    fn transition(&self, token: &SessionToken, transition: Transition) -> HaltResult<()> {
        let mut state = self.lock_state();
        if !token.is_current() {
            return Err(Halt::Superseded);
        }

        let next = state
            .apply(transition)
            .map_err(|e| Halt::Failed(Error::Playback(e.to_string())))?;
        *state = next;
        self.emit(SequencerEvent::State {
            session: token.id(),
            state: next,
        });
        tracing::trace!(session = token.id(), state = %next, "sequencer state");
        Ok(())
    }

    /// Abort `token`'s session after an error
    fn fail(&self, token: &SessionToken, error: Error) {
        let mut state = self.lock_state();
        if !token.is_current() {
            tracing::debug!(session = token.id(), error = %error, "dropping failure from stale session");
            return;
        }

        let from = *state;
        tracing::warn!(session = token.id(), state = %from, error = %error, "playback session failed");
        let message = error.to_string();
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some((token.id(), error));
        *state = PlaybackState::Idle;

        self.emit(SequencerEvent::Failed {
            session: token.id(),
            message,
        });
        self.emit(SequencerEvent::State {
            session: token.id(),
            state: PlaybackState::Idle,
        });
    }

    async fn run(
        &self,
        token: SessionToken,
        playlist: Playlist,
        options: PlaybackOptions,
        cursor: Cursor,
    ) {
        match self.drive(&token, &playlist, &options, cursor).await {
            Ok(()) => tracing::debug!(session = token.id(), "playback session finished"),
            Err(Halt::Superseded) => tracing::debug!(session = token.id(), "playback session superseded"),
            Err(Halt::Failed(error)) => self.fail(&token, error),
        }
    }

    async fn drive(
        &self,
        token: &SessionToken,
        playlist: &Playlist,
        options: &PlaybackOptions,
        mut cursor: Cursor,
    ) -> HaltResult<()> {
        let out_rate = self.sink.output_rate();
        let cue = self.timing.cue.map(|cue| cue.render(out_rate));

        let mut index = cursor.index();
        let mut audio = guarded(token, self.prepare(playlist, index, options, out_rate)).await??;

        loop {
            self.transition(
                token,
                Transition::Begin {
                    index,
                    pass: cursor.pass(),
                },
            )?;
            tracing::debug!(session = token.id(), index, pass = cursor.pass(), "clip playing");

            if self.sink.play(&audio, token).await? == PlayOutcome::Interrupted {
                return Err(Halt::Superseded);
            }

            let (next, gap, cued) = match cursor.advance() {
                Step::Done => return self.transition(token, Transition::Finish),
                Step::Next(next) => (next, self.timing.clip_gap, true),
                Step::Loop(next) => (next, self.timing.loop_gap, false),
            };

            self.transition(token, Transition::Wait { next })?;
            let resume_at = Instant::now() + gap;

            // Prepare the next clip while the gap runs
            if next != index {
                audio = guarded(token, self.prepare(playlist, next, options, out_rate)).await??;
            }
            guarded(token, tokio::time::sleep_until(resume_at)).await?;

            // Cue only within a pass
            if let Some(cue) = cue.as_ref().filter(|_| cued) {
                if self.sink.play(cue, token).await? == PlayOutcome::Interrupted {
                    return Err(Halt::Superseded);
                }
            }

            index = next;
        }
    }

    async fn prepare(
        &self,
        playlist: &Playlist,
        index: usize,
        options: &PlaybackOptions,
        out_rate: u32,
    ) -> Result<RenderedAudio> {
        let descriptor = playlist
            .get(index)
            .ok_or_else(|| Error::InvalidInput(format!("no clip at index {index}")))?;

        let clip = self.source.fetch(descriptor).await?;
        tracing::trace!(index, duration_ms = clip.duration().as_millis(), "clip decoded");
        clip.render(options.speed, options.preserve_pitch, out_rate)
    }
}

/// Run `fut` unless the session is superseded first
async fn guarded<F: Future>(token: &SessionToken, fut: F) -> HaltResult<F::Output> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Halt::Superseded),
        out = fut => Ok(out),
    }
}
