//! Playlists, loop policy and iteration position

use std::path::PathBuf;

use crate::{Error, Result};

/// What to play for one playlist entry
#[derive(Debug, Clone, PartialEq)]
pub enum ClipKind {
    /// Text synthesized with a prebuilt voice
    Speech { text: String, voice: String },
    /// Stored recording, optionally detuned by semitones
    Recording { path: PathBuf, detune: f32 },
}

/// One playlist entry
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDescriptor {
    pub kind: ClipKind,
    /// Overrides the session speed for this clip
    pub rate: Option<f32>,
}

impl ClipDescriptor {
    pub fn speech(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            kind: ClipKind::Speech {
                text: text.into(),
                voice: voice.into(),
            },
            rate: None,
        }
    }

    pub fn recording(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ClipKind::Recording {
                path: path.into(),
                detune: 0.0,
            },
            rate: None,
        }
    }

    #[must_use]
    pub const fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Set detune in semitones; has no effect on speech entries
    #[must_use]
    pub fn with_detune(mut self, semitones: f32) -> Self {
        if let ClipKind::Recording { detune, .. } = &mut self.kind {
            *detune = semitones;
        }
        self
    }
}

/// Ordered, non-empty list of clips addressed by index
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    clips: Vec<ClipDescriptor>,
}

impl Playlist {
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `clips` is empty
    pub fn new(clips: Vec<ClipDescriptor>) -> Result<Self> {
        if clips.is_empty() {
            return Err(Error::InvalidInput("playlist is empty".to_string()));
        }
        Ok(Self { clips })
    }

    /// Interleave question/answer pairs, each side in its own voice
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if there are no pairs
    pub fn from_pairs<I, Q, A>(pairs: I, question_voice: &str, answer_voice: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (Q, A)>,
        Q: Into<String>,
        A: Into<String>,
    {
        let clips = pairs
            .into_iter()
            .flat_map(|(q, a)| {
                [
                    ClipDescriptor::speech(q, question_voice),
                    ClipDescriptor::speech(a, answer_voice),
                ]
            })
            .collect();
        Self::new(clips)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ClipDescriptor> {
        self.clips.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClipDescriptor> {
        self.clips.iter()
    }
}

/// How many times the playlist (or single item) is played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPolicy {
    /// A fixed number of passes; zero is treated as one
    Times(u32),
    /// Until stopped
    Infinite,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self::Times(1)
    }
}

impl LoopPolicy {
    /// Total passes, `None` for infinite
    #[must_use]
    pub fn passes(self) -> Option<u32> {
        match self {
            Self::Times(n) => Some(n.max(1)),
            Self::Infinite => None,
        }
    }
}

/// Whole playlist or one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Continuous,
    Single { index: usize },
}

/// Per-session settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub loops: LoopPolicy,
    /// Speed multiplier applied to clips without their own rate
    pub speed: f32,
    pub preserve_pitch: bool,
    pub mode: PlayMode,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            loops: LoopPolicy::default(),
            speed: 1.0,
            preserve_pitch: true,
            mode: PlayMode::default(),
        }
    }
}

/// What follows the clip that just ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Next entry of the same pass, after the clip gap
    Next(usize),
    /// First entry of a new pass, after the loop gap
    Loop(usize),
    /// Session complete
    Done,
}

/// Iteration position within a session
#[derive(Debug, Clone)]
pub struct Cursor {
    index: usize,
    pass: u32,
    len: usize,
    mode: PlayMode,
    passes: Option<u32>,
}

impl Cursor {
    /// Position at the start of a session
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if single mode names an index outside
    /// the playlist
    pub fn new(playlist: &Playlist, options: &PlaybackOptions) -> Result<Self> {
        let index = match options.mode {
            PlayMode::Continuous => 0,
            PlayMode::Single { index } if index < playlist.len() => index,
            PlayMode::Single { index } => {
                return Err(Error::InvalidInput(format!(
                    "clip {index} out of range for playlist of {}",
                    playlist.len()
                )));
            }
        };

        Ok(Self {
            index,
            pass: 0,
            len: playlist.len(),
            mode: options.mode,
            passes: options.loops.passes(),
        })
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn pass(&self) -> u32 {
        self.pass
    }

    /// Move past the current clip
    pub fn advance(&mut self) -> Step {
        if matches!(self.mode, PlayMode::Continuous) && self.index + 1 < self.len {
            self.index += 1;
            return Step::Next(self.index);
        }

        let more = self.passes.is_none_or(|total| self.pass + 1 < total);
        if !more {
            return Step::Done;
        }

        self.pass += 1;
        if matches!(self.mode, PlayMode::Continuous) {
            self.index = 0;
        }
        Step::Loop(self.index)
    }
}
