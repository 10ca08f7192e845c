//! Messages into and out of the engine thread.

use std::path::PathBuf;

use crate::playback::PlaybackState;
use crate::queue::RepeatMode;
use crate::thumbnails::Thumbnail;
use crate::track::{Track, TrackId};

/// A user intent, sent to the orchestrating thread.
#[derive(Debug, Clone)]
pub enum Command {
    // Queue editing.
    Enqueue(Track),
    InsertAt { index: usize, track: Track },
    Remove(usize),
    Move { from: usize, to: usize },
    /// Reorder the queue to match `ids`; unknown ids are ignored.
    Reorder(Vec<TrackId>),
    ClearQueue,

    // Transport.
    Play,
    /// Jump straight to the track at this queue position.
    PlayAt(usize),
    TogglePause,
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    Retry,
    Seek(f64),
    SetSpeed(f64),
    SetVolume(f64),
    /// `None` marks the current position.
    SetLoopStart(Option<f64>),
    SetLoopEnd(Option<f64>),
    ClearLoop,
    SetRepeat(RepeatMode),
    CycleRepeat,
    SetShuffle(bool),
    ToggleShuffle,

    Search { query: String, page: usize },
    RequestThumbnail(String),

    SavePlaylist(String),
    LoadPlaylist(String),
    DeletePlaylist(String),
    ImportPlaylist(PathBuf),
    ExportPlaylist { name: String, path: PathBuf },

    Quit,
}

/// Something a front end may want to render.
#[derive(Debug, Clone)]
pub enum Notification {
    StateChanged(PlaybackState),
    NowPlaying(Track),
    QueueChanged { len: usize, current: Option<usize> },
    /// Playback ran off the end and nothing more could be found.
    QueueExhausted,
    /// Playback failed; the session sits in `Error` until retried.
    Error(String),
    /// Non-blocking message, e.g. a rejected command or a failed save.
    Notice(String),
    SearchResults { query: String, page: usize, tracks: Vec<Track> },
    Thumbnail { reference: String, thumbnail: Thumbnail },
    PlaylistsChanged(Vec<String>),
}
