//! Playback states and the snapshot shared with observers.

use std::sync::{Arc, Mutex};

use crate::track::TrackId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Waiting for the resolver to produce a source.
    Resolving,
    /// Source handed to the sink, waiting for it to report ready.
    Loading,
    Playing,
    Paused,
    Seeking,
    /// Session failed; needs an explicit retry or skip.
    Error,
    /// Between tracks, waiting for the queue to supply the next one.
    Transitioning,
}

impl PlaybackState {
    /// The sink holds an opened source in these states.
    pub fn has_media(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::Seeking)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::Error => "error",
            Self::Transitioning => "transitioning",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Runtime playback information shared with the UI.
pub struct PlaybackInfo {
    pub state: PlaybackState,
    pub track_id: Option<TrackId>,
    pub title: Option<String>,
    /// Seconds into the current track.
    pub position: f64,
    pub duration: Option<f64>,
    pub speed: f64,
    pub volume: f64,
    pub loop_start: Option<f64>,
    pub loop_end: Option<f64>,
    /// Short description of the last failure, while in `Error`.
    pub error: Option<String>,
}

impl Default for PlaybackInfo {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            track_id: None,
            title: None,
            position: 0.0,
            duration: None,
            speed: 1.0,
            volume: 1.0,
            loop_start: None,
            loop_end: None,
            error: None,
        }
    }
}

pub type PlaybackHandle = Arc<Mutex<PlaybackInfo>>;
