//! The playback state machine.
//!
//! Runs on the orchestrating thread only. Resolution happens in a
//! dispatched task; the controller only reacts to the completion whose
//! handle matches the live session, so a skip while resolving can never be
//! overtaken by the old track.

use std::sync::{Arc, Mutex, PoisonError};

use crate::dispatch::{CancelToken, TaskDispatcher, TaskHandle, TaskKind, TaskOutput};
use crate::error::{Error, Result};
use crate::resolver::TrackResolver;
use crate::track::{ResolvedSource, Track};

use super::session::{clamp_speed, clamp_volume};
use super::{PlaybackHandle, PlaybackInfo, PlaybackSession, PlaybackSink, PlaybackState, SinkEvent};

/// What a sink event means for the rest of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOutcome {
    Continue,
    /// The track finished on its own; the queue should advance.
    TrackEnded,
    /// The session failed and now sits in `Error`.
    Failed(String),
}

pub struct PlaybackController {
    sink: Box<dyn PlaybackSink>,
    session: Option<PlaybackSession>,
    /// Player preferences, carried into every new session.
    speed: f64,
    volume: f64,
    info: PlaybackHandle,
}

impl PlaybackController {
    pub fn new(sink: Box<dyn PlaybackSink>, speed: f64, volume: f64) -> Self {
        let speed = clamp_speed(speed);
        let volume = clamp_volume(volume);
        let info = Arc::new(Mutex::new(PlaybackInfo {
            speed,
            volume,
            ..PlaybackInfo::default()
        }));
        Self {
            sink,
            session: None,
            speed,
            volume,
            info,
        }
    }

    pub fn playback_handle(&self) -> PlaybackHandle {
        self.info.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.session.as_ref().map_or(PlaybackState::Idle, |s| s.state)
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.session.as_ref().map(|s| s.track())
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Start a fresh session for `track` and dispatch its resolution.
    ///
    /// Any in-flight resolution is cancelled and the previous source
    /// released.
    pub fn begin(
        &mut self,
        track: Track,
        dispatcher: &mut TaskDispatcher,
        resolver: &Arc<TrackResolver>,
    ) -> TaskHandle {
        self.end_session(dispatcher);
        let session = PlaybackSession::new(track, self.speed, self.volume);
        self.start(session, dispatcher, resolver)
    }

    /// Re-resolve the failed track, keeping its loop region.
    pub fn retry(
        &mut self,
        dispatcher: &mut TaskDispatcher,
        resolver: &Arc<TrackResolver>,
    ) -> Option<TaskHandle> {
        let old = self.session.take_if(|s| s.state == PlaybackState::Error)?;
        let mut session = PlaybackSession::new(old.track().clone(), self.speed, self.volume);
        session.inherit_loop(&old);
        drop(old);
        tracing::info!(track_id = %session.track().id, "retrying playback");
        Some(self.start(session, dispatcher, resolver))
    }

    /// Leave the current track for a skip: cancel, stop and release, then
    /// wait in `Transitioning` for the next `begin`.
    pub fn transition(&mut self, dispatcher: &mut TaskDispatcher) {
        self.end_session(dispatcher);
        if let Some(s) = self.session.as_mut() {
            s.state = PlaybackState::Transitioning;
            s.position = 0.0;
        }
        self.publish();
    }

    /// Back to `Idle` with nothing loaded.
    pub fn stop(&mut self, dispatcher: &mut TaskDispatcher) {
        self.end_session(dispatcher);
        if let Some(s) = self.session.take() {
            tracing::info!(track_id = %s.track().id, "playback stopped");
        }
        self.publish();
    }

    /// Apply a resolve completion. Completions for any other handle than the
    /// live session's are ignored; their source is dropped here.
    pub fn on_resolved(
        &mut self,
        handle: TaskHandle,
        result: Result<ResolvedSource>,
    ) -> Result<()> {
        let Some(session) = self.session.as_mut().filter(|s| s.resolve == Some(handle)) else {
            tracing::debug!(%handle, "ignoring stale resolution");
            return Ok(());
        };
        session.resolve = None;

        let source = match result {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(track_id = %session.track().id, error = %e, "resolution failed");
                self.fail(e.user_message());
                return Err(e);
            }
        };

        tracing::info!(
            track_id = %session.track().id,
            kind = ?source.kind,
            format = ?source.format.format_id,
            "opening resolved source"
        );
        session.state = PlaybackState::Loading;
        if let Err(e) = self.sink.open(&source) {
            self.fail(e.user_message());
            return Err(e);
        }
        if let Some(s) = self.session.as_mut() {
            s.attach(source);
        }
        self.publish();
        Ok(())
    }

    pub fn on_sink_event(&mut self, event: SinkEvent) -> SinkOutcome {
        let Some(state) = self.session.as_ref().map(|s| s.state) else {
            return SinkOutcome::Continue;
        };

        let outcome = match event {
            SinkEvent::Ready if state == PlaybackState::Loading => self.start_playing(),
            SinkEvent::Ready => SinkOutcome::Continue,
            SinkEvent::PositionTick(position) if state.has_media() => self.on_tick(position),
            SinkEvent::PositionTick(_) => SinkOutcome::Continue,
            SinkEvent::EndOfMedia if state.has_media() => self.on_end_of_media(),
            SinkEvent::EndOfMedia => SinkOutcome::Continue,
            SinkEvent::Error(msg) => {
                tracing::error!(error = %msg, "sink reported a playback error");
                self.sink.stop();
                self.fail(Error::SinkPlayback(msg).user_message())
            }
        };
        self.publish();
        outcome
    }

    pub fn toggle_pause(&mut self) -> Result<()> {
        match self.state() {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
            _ => Ok(()),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state() != PlaybackState::Playing {
            return Ok(());
        }
        self.sink_call(|sink| sink.pause())?;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state() != PlaybackState::Paused {
            return Ok(());
        }
        self.sink_call(|sink| sink.play())?;
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Jump to `target` seconds, clamped into the track. Only meaningful
    /// while media is loaded.
    pub fn seek(&mut self, target: f64) -> Result<()> {
        if !target.is_finite() {
            return Err(Error::InvalidArgument(format!("cannot seek to {target}")));
        }
        let Some(session) = self.session.as_ref().filter(|s| s.state.has_media()) else {
            return Err(Error::InvalidArgument("nothing is playing".to_string()));
        };
        let position = session.clamp_position(target);
        self.seek_to(position)
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        let speed = clamp_speed(speed);
        self.speed = speed;
        if let Some(s) = self.session.as_mut() {
            s.speed = speed;
        }
        if self.state().has_media() {
            self.sink_call(|sink| sink.set_speed(speed))?;
        }
        self.publish();
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        let volume = clamp_volume(volume);
        self.volume = volume;
        if let Some(s) = self.session.as_mut() {
            s.volume = volume;
        }
        if self.state().has_media() {
            self.sink_call(|sink| sink.set_volume(volume))?;
        }
        self.publish();
        Ok(())
    }

    /// Set loop start at `at`, or at the current position.
    pub fn set_loop_start(&mut self, at: Option<f64>) -> Result<()> {
        let session = self.session_mut()?;
        let at = at.unwrap_or(session.position);
        session.set_loop_start(at)?;
        tracing::debug!(at, "loop start set");
        self.publish();
        Ok(())
    }

    /// Set loop end at `at`, or at the current position.
    pub fn set_loop_end(&mut self, at: Option<f64>) -> Result<()> {
        let session = self.session_mut()?;
        let at = at.unwrap_or(session.position);
        session.set_loop_end(at)?;
        tracing::debug!(at, "loop end set");
        self.publish();
        Ok(())
    }

    pub fn clear_loop(&mut self) {
        if let Some(s) = self.session.as_mut() {
            s.clear_loop();
        }
        self.publish();
    }

    fn start(
        &mut self,
        mut session: PlaybackSession,
        dispatcher: &mut TaskDispatcher,
        resolver: &Arc<TrackResolver>,
    ) -> TaskHandle {
        let track = session.track().clone();
        let resolver = Arc::clone(resolver);
        tracing::info!(track_id = %track.id, title = %track.title, "resolving track");

        let handle = dispatcher.submit(TaskKind::Resolve, CancelToken::new(), move |token| {
            resolver.resolve(&track, token).map(TaskOutput::Resolved)
        });
        session.resolve = Some(handle);
        session.state = PlaybackState::Resolving;
        self.session = Some(session);
        self.publish();
        handle
    }

    /// Cancel resolution, stop the sink and drop the source of the live
    /// session, if any.
    fn end_session(&mut self, dispatcher: &mut TaskDispatcher) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(handle) = session.resolve.take() {
            dispatcher.cancel(handle);
        }
        if session.source().is_some() || session.state.has_media() {
            self.sink.stop();
        }
        session.release();
    }

    fn start_playing(&mut self) -> SinkOutcome {
        let Some(session) = self.session.as_ref() else {
            return SinkOutcome::Continue;
        };
        let start = session.loop_points().0.unwrap_or(0.0);
        let (speed, volume) = (session.speed, session.volume);

        let prepared = (|| {
            if start > 0.0 {
                self.sink.seek(start)?;
            }
            self.sink.set_speed(speed)?;
            self.sink.set_volume(volume)?;
            self.sink.play()
        })();

        match prepared {
            Ok(()) => {
                if let Some(s) = self.session.as_mut() {
                    s.position = start;
                    s.state = PlaybackState::Playing;
                    tracing::info!(track_id = %s.track().id, "playing");
                }
                SinkOutcome::Continue
            }
            Err(e) => {
                self.sink.stop();
                self.fail(e.user_message())
            }
        }
    }

    fn on_tick(&mut self, position: f64) -> SinkOutcome {
        let Some(session) = self.session.as_mut() else {
            return SinkOutcome::Continue;
        };
        session.position = position.max(0.0);
        if session.state == PlaybackState::Seeking {
            session.state = PlaybackState::Playing;
        }
        if session.state != PlaybackState::Playing {
            return SinkOutcome::Continue;
        }

        if let Some(start) = session.loop_wrap(position) {
            tracing::trace!(position, start, "loop end reached");
            return match self.seek_to(start) {
                Ok(()) => SinkOutcome::Continue,
                Err(e) => SinkOutcome::Failed(e.user_message()),
            };
        }
        if session.reached_end(position) {
            return self.finish();
        }
        SinkOutcome::Continue
    }

    fn on_end_of_media(&mut self) -> SinkOutcome {
        let loop_start = self
            .session
            .as_ref()
            .filter(|s| s.loop_active())
            .and_then(|s| s.loop_points().0);

        match loop_start {
            Some(start) => {
                // Keep looping even past the sink's end of stream.
                let resumed = self.seek_to(start).and_then(|_| match self.state() {
                    PlaybackState::Playing => self.sink_call(|sink| sink.play()),
                    _ => Ok(()),
                });
                match resumed {
                    Ok(()) => SinkOutcome::Continue,
                    Err(e) => SinkOutcome::Failed(e.user_message()),
                }
            }
            None => self.finish(),
        }
    }

    fn finish(&mut self) -> SinkOutcome {
        if let Some(s) = self.session.as_mut() {
            tracing::info!(track_id = %s.track().id, "track ended");
            s.state = PlaybackState::Transitioning;
            if let Some(d) = s.duration() {
                s.position = d;
            }
        }
        SinkOutcome::TrackEnded
    }

    fn seek_to(&mut self, position: f64) -> Result<()> {
        let resume = self.state();
        self.set_state(PlaybackState::Seeking);
        self.sink_call(|sink| sink.seek(position))?;
        if let Some(s) = self.session.as_mut() {
            s.position = position;
            s.state = match resume {
                PlaybackState::Paused => PlaybackState::Paused,
                _ => PlaybackState::Playing,
            };
        }
        self.publish();
        Ok(())
    }

    /// Run a sink command; a failure ends the session in `Error`.
    fn sink_call(&mut self, call: impl FnOnce(&mut dyn PlaybackSink) -> Result<()>) -> Result<()> {
        match call(self.sink.as_mut()) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "sink command failed");
                self.sink.stop();
                self.fail(e.user_message());
                Err(e)
            }
        }
    }

    fn fail(&mut self, message: String) -> SinkOutcome {
        if let Some(s) = self.session.as_mut() {
            s.state = PlaybackState::Error;
            s.error = Some(message.clone());
            s.release();
        }
        self.publish();
        SinkOutcome::Failed(message)
    }

    fn set_state(&mut self, state: PlaybackState) {
        if let Some(s) = self.session.as_mut() {
            s.state = state;
        }
        self.publish();
    }

    fn session_mut(&mut self) -> Result<&mut PlaybackSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument("no active track".to_string()))
    }

    fn publish(&self) {
        let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        *info = match self.session.as_ref() {
            Some(s) => {
                let (loop_start, loop_end) = s.loop_points();
                PlaybackInfo {
                    state: s.state,
                    track_id: Some(s.track().id.clone()),
                    title: Some(s.track().title.clone()),
                    position: s.position,
                    duration: s.duration(),
                    speed: s.speed,
                    volume: s.volume,
                    loop_start,
                    loop_end,
                    error: s.error.clone(),
                }
            }
            None => PlaybackInfo {
                speed: self.speed,
                volume: self.volume,
                ..PlaybackInfo::default()
            },
        };
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        let loaded = self.session.as_ref().is_some_and(|s| s.source().is_some());
        if loaded || self.state().has_media() {
            self.sink.stop();
        }
    }
}
