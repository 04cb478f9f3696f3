//! Single-slot playback: the output primitive plus the state machine that owns it.

mod controller;
mod simulated;

pub use controller::PlaybackController;
pub use simulated::{SimulatedOutput, SimulatedTransport};

use crossbeam_channel::Sender;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
}

impl PlaybackState {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

/// Identifies one start request. Events carrying an older ticket are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlaybackTicket(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Ready,
    Ended,
    Failed(String),
}

/// Asynchronous notification from an [`AudioOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub ticket: PlaybackTicket,
    pub kind: PlaybackEventKind,
}

impl PlaybackEvent {
    #[must_use]
    pub fn ready(ticket: PlaybackTicket) -> Self {
        Self {
            ticket,
            kind: PlaybackEventKind::Ready,
        }
    }

    #[must_use]
    pub fn ended(ticket: PlaybackTicket) -> Self {
        Self {
            ticket,
            kind: PlaybackEventKind::Ended,
        }
    }

    #[must_use]
    pub fn failed(ticket: PlaybackTicket, reason: impl Into<String>) -> Self {
        Self {
            ticket,
            kind: PlaybackEventKind::Failed(reason.into()),
        }
    }
}

/// What the scheduler needs to know after the controller applied an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Started(PlaybackTicket),
    Finished(PlaybackTicket),
    Failed {
        ticket: PlaybackTicket,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The output refused the request before loading began.
    StartRejected { audio_ref: String, reason: String },
    /// No output device is available.
    DeviceUnavailable(String),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartRejected { audio_ref, reason } => {
                write!(f, "playback of '{audio_ref}' rejected: {reason}")
            }
            Self::DeviceUnavailable(device) => write!(f, "audio output unavailable: {device}"),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// The one real playback resource.
///
/// `start` must return promptly; readiness, natural end, and failures are
/// reported later through `events`, tagged with `ticket`.
pub trait AudioOutput: Send {
    fn start(
        &mut self,
        ticket: PlaybackTicket,
        audio_ref: &str,
        events: Sender<PlaybackEvent>,
    ) -> Result<(), PlaybackError>;

    /// Tears down whatever is loaded or playing. Must be idempotent.
    fn stop(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);
}
