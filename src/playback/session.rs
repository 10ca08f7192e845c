//! One playback attempt of one track.

use crate::dispatch::TaskHandle;
use crate::error::{Error, Result};
use crate::track::{ResolvedSource, Track};

use super::PlaybackState;

pub const MIN_SPEED: f64 = 0.5;
pub const MAX_SPEED: f64 = 2.0;

pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() { 1.0 } else { speed.clamp(MIN_SPEED, MAX_SPEED) }
}

pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) }
}

/// Replaced, never reused, on every track change. Owns the only live
/// [`ResolvedSource`].
#[derive(Debug)]
pub struct PlaybackSession {
    track: Track,
    pub(super) state: PlaybackState,
    pub(super) position: f64,
    duration: Option<f64>,
    pub(super) speed: f64,
    pub(super) volume: f64,
    loop_start: Option<f64>,
    loop_end: Option<f64>,
    source: Option<ResolvedSource>,
    pub(super) resolve: Option<TaskHandle>,
    pub(super) error: Option<String>,
}

impl PlaybackSession {
    pub fn new(track: Track, speed: f64, volume: f64) -> Self {
        let duration = (track.duration_seconds > 0).then_some(track.duration_seconds as f64);
        Self {
            track,
            state: PlaybackState::Idle,
            position: 0.0,
            duration,
            speed: clamp_speed(speed),
            volume: clamp_volume(volume),
            loop_start: None,
            loop_end: None,
            source: None,
            resolve: None,
            error: None,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn loop_points(&self) -> (Option<f64>, Option<f64>) {
        (self.loop_start, self.loop_end)
    }

    pub fn source(&self) -> Option<&ResolvedSource> {
        self.source.as_ref()
    }

    pub fn resolve_handle(&self) -> Option<TaskHandle> {
        self.resolve
    }

    pub(super) fn attach(&mut self, source: ResolvedSource) {
        if self.duration.is_none() {
            self.duration = source.format.duration_seconds.filter(|d| *d > 0.0);
        }
        self.source = Some(source);
    }

    /// Give up the source; a downloaded file is deleted here.
    pub(super) fn release(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::debug!(track_id = %source.track_id, kind = ?source.kind, "released source");
        }
    }

    pub(super) fn inherit_loop(&mut self, other: &PlaybackSession) {
        self.loop_start = other.loop_start;
        self.loop_end = other.loop_end;
    }

    pub fn set_loop_start(&mut self, at: f64) -> Result<()> {
        self.check_in_range(at, "loop start")?;
        if let Some(end) = self.loop_end {
            if at >= end {
                return Err(Error::InvalidArgument(format!(
                    "loop start {at:.2}s must be before loop end {end:.2}s"
                )));
            }
        }
        self.loop_start = Some(at);
        Ok(())
    }

    pub fn set_loop_end(&mut self, at: f64) -> Result<()> {
        self.check_in_range(at, "loop end")?;
        if let Some(start) = self.loop_start {
            if at <= start {
                return Err(Error::InvalidArgument(format!(
                    "loop end {at:.2}s must be after loop start {start:.2}s"
                )));
            }
        }
        self.loop_end = Some(at);
        Ok(())
    }

    pub fn clear_loop(&mut self) {
        self.loop_start = None;
        self.loop_end = None;
    }

    /// Both loop points are set.
    pub fn loop_active(&self) -> bool {
        self.loop_start.is_some() && self.loop_end.is_some()
    }

    /// Where to jump when `position` has run past the loop region.
    pub fn loop_wrap(&self, position: f64) -> Option<f64> {
        match (self.loop_start, self.loop_end) {
            (Some(start), Some(end)) if position >= end => Some(start),
            _ => None,
        }
    }

    /// `position ≥ duration` with no loop active.
    pub fn reached_end(&self, position: f64) -> bool {
        !self.loop_active() && self.duration.is_some_and(|d| position >= d)
    }

    pub fn clamp_position(&self, target: f64) -> f64 {
        let target = if target.is_nan() { 0.0 } else { target.max(0.0) };
        match self.duration {
            Some(d) => target.min(d),
            None => target,
        }
    }

    fn check_in_range(&self, at: f64, what: &str) -> Result<()> {
        if !at.is_finite() || at < 0.0 {
            return Err(Error::InvalidArgument(format!("{what} must be a non-negative position")));
        }
        if let Some(d) = self.duration {
            if at > d {
                return Err(Error::InvalidArgument(format!(
                    "{what} {at:.2}s is past the end of the track ({d:.2}s)"
                )));
            }
        }
        Ok(())
    }
}
