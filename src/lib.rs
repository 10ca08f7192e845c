//! Playback orchestration for remote audio tracks.
//!
//! An [`Engine`] runs on one thread and owns the play queue, the playback
//! state machine and a pool of workers for blocking network work. Front
//! ends send it [`Command`]s, feed it [`SinkEvent`]s from their audio sink,
//! and render the [`Notification`]s and [`PlaybackInfo`] snapshots it
//! publishes.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod playback;
pub mod playlist;
pub mod queue;
pub mod resolver;
pub mod thumbnails;
pub mod track;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use engine::{Command, Engine, Notification};
pub use error::{Error, Result};
pub use playback::{PlaybackHandle, PlaybackInfo, PlaybackSink, PlaybackState, SinkEvent};
pub use queue::{QueueManager, RepeatMode};
pub use resolver::MediaBackend;
pub use thumbnails::{HttpThumbnailFetcher, ThumbnailFetcher};
pub use track::{ResolvedSource, Track, TrackId};
