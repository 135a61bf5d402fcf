//! Simulated spoken exam
//!
//! The examiner reads each question aloud, the candidate answers into the
//! microphone, and the answer ends when the candidate stops talking. Each
//! exam run has its own session token so cancelling it stops the examiner
//! and the recording at whatever point they have reached.

use std::sync::Arc;

use tokio::sync::watch;

use crate::ai::AiClient;
use crate::sequencer::{
    ClipDescriptor, PlaybackOptions, Playlist, Sequencer, SessionClock, SessionToken,
};
use crate::voice::{Recorder, Recording, StopReason};
use crate::{Error, Result};

/// Where the exam is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExamStage {
    #[default]
    Idle,
    /// Question `n` is being read
    ExaminerSpeaking(usize),
    /// Recording the answer to question `n`
    Listening(usize),
    /// Transcribing the answer to question `n`
    Processing(usize),
    Finished,
}

/// One answered question
#[derive(Debug, Clone)]
pub struct ExamTurn {
    pub question: String,
    pub transcript: String,
    pub recording: Recording,
}

impl ExamTurn {
    /// Whether the candidate stopped talking, as opposed to hitting the time limit
    #[must_use]
    pub fn ended_by_silence(&self) -> bool {
        self.recording.stop_reason == StopReason::Silence
    }
}

/// How an exam run ended
#[derive(Debug, Clone)]
pub enum ExamOutcome {
    Completed(Vec<ExamTurn>),
    /// Cancelled; turns answered before cancellation are kept
    Cancelled(Vec<ExamTurn>),
}

/// Turn-taking driver for a mock exam
pub struct MockExam {
    sequencer: Sequencer,
    recorder: Arc<Recorder>,
    ai: Arc<AiClient>,
    examiner_voice: String,
    clock: SessionClock,
    stage: watch::Sender<ExamStage>,
}

impl MockExam {
    #[must_use]
    pub fn new(
        sequencer: Sequencer,
        recorder: Arc<Recorder>,
        ai: Arc<AiClient>,
        examiner_voice: impl Into<String>,
    ) -> Self {
        let (stage, _) = watch::channel(ExamStage::Idle);
        Self {
            sequencer,
            recorder,
            ai,
            examiner_voice: examiner_voice.into(),
            clock: SessionClock::new(),
            stage,
        }
    }

    #[must_use]
    pub fn stage(&self) -> ExamStage {
        *self.stage.borrow()
    }

    /// Follow stage changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ExamStage> {
        self.stage.subscribe()
    }

    /// Cancel the running exam, if any
    pub fn cancel(&self) {
        self.clock.invalidate();
        self.sequencer.stop();
        self.stage.send_replace(ExamStage::Idle);
        tracing::info!("exam cancelled");
    }

    /// Ask `questions` in order
    ///
    /// # Errors
    ///
    /// Returns error if speech, capture or transcription fails
    pub async fn run(&self, questions: &[String]) -> Result<ExamOutcome> {
        if questions.is_empty() {
            return Err(Error::InvalidInput("exam has no questions".to_string()));
        }

        let token = self.clock.begin();
        let outcome = self.ask_all(&token, questions).await;
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, stage = ?self.stage(), "exam failed");
            self.set_stage(&token, ExamStage::Idle);
        }
        outcome
    }

    async fn ask_all(&self, token: &SessionToken, questions: &[String]) -> Result<ExamOutcome> {
        let mut turns = Vec::with_capacity(questions.len());

        for (n, question) in questions.iter().enumerate() {
            if !self.set_stage(token, ExamStage::ExaminerSpeaking(n)) {
                return Ok(ExamOutcome::Cancelled(turns));
            }
            tracing::debug!(question = n, "examiner speaking");

            let playlist = Playlist::new(vec![ClipDescriptor::speech(
                question.as_str(),
                self.examiner_voice.as_str(),
            )])?;
            self.sequencer
                .play_to_end(playlist, PlaybackOptions::default())
                .await?;

            if !self.set_stage(token, ExamStage::Listening(n)) {
                return Ok(ExamOutcome::Cancelled(turns));
            }

            let handle = self.recorder.start_capture().await?;
            let recording = tokio::select! {
                recording = handle.finished() => recording?,
                // Dropping the handle stops the recording
                () = token.cancelled() => return Ok(ExamOutcome::Cancelled(turns)),
            };

            if !self.set_stage(token, ExamStage::Processing(n)) {
                return Ok(ExamOutcome::Cancelled(turns));
            }

            let transcript = if recording.is_empty() {
                String::new()
            } else {
                let wav = recording.to_wav()?;
                tokio::select! {
                    transcript = self.ai.transcribe(&wav, Recording::MIME_TYPE) => transcript?,
                    () = token.cancelled() => return Ok(ExamOutcome::Cancelled(turns)),
                }
            };

            tracing::info!(
                question = n,
                reason = ?recording.stop_reason,
                answer_ms = recording.elapsed.as_millis(),
                "answer recorded"
            );

            turns.push(ExamTurn {
                question: question.clone(),
                transcript,
                recording,
            });
        }

        if !self.set_stage(token, ExamStage::Finished) {
            return Ok(ExamOutcome::Cancelled(turns));
        }
        Ok(ExamOutcome::Completed(turns))
    }

    /// Update the stage unless the run has been cancelled
    fn set_stage(&self, token: &SessionToken, stage: ExamStage) -> bool {
        let mut applied = false;
        self.stage.send_if_modified(|current| {
            if token.is_current() {
                *current = stage;
                applied = true;
            }
            applied
        });
        applied
    }
}
