//! Sequencer state machine
//!
//! One tagged state per sequencer and one transition function. Anything
//! not listed in [`PlaybackState::apply`] is rejected.

use std::fmt;

/// Where a sequencer is in its playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing playing or pending
    #[default]
    Idle,
    /// Fetching and decoding the first clip of a session
    Loading { index: usize },
    /// Clip `index` is audible; `pass` counts completed loops
    Playing { index: usize, pass: u32 },
    /// Waiting between clips; clip `next` is prepared meanwhile
    Gap { next: usize },
}

impl PlaybackState {
    /// Whether a session is in progress
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Apply `transition`, returning the new state
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the transition is not allowed from
    /// the current state
    pub fn apply(self, transition: Transition) -> Result<Self, InvalidTransition> {
        match (self, transition) {
            (_, Transition::Start { index }) => Ok(Self::Loading { index }),
            (_, Transition::Stop) => Ok(Self::Idle),
            (Self::Loading { index: at } | Self::Gap { next: at }, Transition::Begin { index, pass })
                if at == index =>
            {
                Ok(Self::Playing { index, pass })
            }
            (Self::Playing { .. }, Transition::Wait { next }) => Ok(Self::Gap { next }),
            (Self::Playing { .. }, Transition::Finish) => Ok(Self::Idle),
            (from, transition) => Err(InvalidTransition { from, transition }),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading { index } => write!(f, "loading({index})"),
            Self::Playing { index, pass } => write!(f, "playing({index}, pass {pass})"),
            Self::Gap { next } => write!(f, "gap(next {next})"),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new session begins at `index`
    Start { index: usize },
    /// Clip `index` starts playing
    Begin { index: usize, pass: u32 },
    /// The current clip ended and `next` follows after a pause
    Wait { next: usize },
    /// The last clip of the last pass ended
    Finish,
    /// Stopped, superseded or failed
    Stop,
}

/// Rejected transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {transition:?} from {from}")]
pub struct InvalidTransition {
    pub from: PlaybackState,
    pub transition: Transition,
}
