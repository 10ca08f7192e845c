//! The playback sink boundary.
//!
//! A sink decodes and outputs audio. Commands are synchronous calls; status
//! comes back asynchronously as [`SinkEvent`]s on a channel the sink was
//! built with, and is consumed on the orchestrating thread.

use crate::error::Result;
use crate::track::ResolvedSource;

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// The opened source can start playing.
    Ready,
    /// Current position in seconds.
    PositionTick(f64),
    EndOfMedia,
    /// Unrecoverable failure of the current source.
    Error(String),
}

pub trait PlaybackSink: Send {
    /// Prepare `source` for playback, paused. Reports `Ready` when done.
    fn open(&mut self, source: &ResolvedSource) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Drop whatever is loaded. Never fails.
    fn stop(&mut self);

    fn seek(&mut self, seconds: f64) -> Result<()>;

    fn set_speed(&mut self, speed: f64) -> Result<()>;

    fn set_volume(&mut self, volume: f64) -> Result<()>;
}
