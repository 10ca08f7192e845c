//! The orchestrating thread.
//!
//! `Engine` owns the queue, the playback controller and the task
//! dispatcher, and is the only place their state changes. Commands, sink
//! events and task completions are processed one at a time, so no two of
//! them ever interleave.

mod command;

pub use command::{Command, Notification};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, select};

use crate::config::Settings;
use crate::dispatch::{CancelToken, Completion, TaskDispatcher, TaskHandle, TaskKind, TaskOutput};
use crate::error::{Error, Result};
use crate::playback::{
    PlaybackController, PlaybackHandle, PlaybackSink, PlaybackState, SinkEvent, SinkOutcome,
};
use crate::playlist::PlaylistStore;
use crate::queue::{Advance, AdvanceReason, QueueManager};
use crate::resolver::{MediaBackend, ResolverPolicy, TrackResolver};
use crate::thumbnails::{Thumbnail, ThumbnailCache, ThumbnailFetcher};
use crate::track::Track;

/// Undelivered notifications kept before the oldest are dropped.
pub const NOTIFICATION_BACKLOG: usize = 256;

pub struct Engine {
    dispatcher: TaskDispatcher,
    resolver: Arc<TrackResolver>,
    queue: QueueManager,
    playback: PlaybackController,
    thumbnails: ThumbnailCache,
    store: PlaylistStore,
    /// Latest search; results of any other search are dropped.
    search: Option<TaskHandle>,
    last_state: PlaybackState,
    events: Sender<Notification>,
    notifications: Receiver<Notification>,
}

impl Engine {
    pub fn new(
        settings: &Settings,
        backend: Arc<dyn MediaBackend>,
        sink: Box<dyn PlaybackSink>,
        fetcher: Arc<dyn ThumbnailFetcher>,
    ) -> Result<Self> {
        settings.validate()?;

        let thumbnails = ThumbnailCache::open(
            settings.thumbnails.cache_dir(),
            settings.thumbnails.max_entries,
            fetcher,
        )?;
        thumbnails.prune_orphans();
        let store = PlaylistStore::open(&settings.storage)?;

        let playback = &settings.playback;
        let queue =
            QueueManager::new(playback.repeat.into(), playback.shuffle, playback.auto_refill);
        let controller = PlaybackController::new(sink, playback.speed, playback.volume);
        let resolver = TrackResolver::new(backend, ResolverPolicy::from(&settings.resolver));
        let (events, notifications) = crossbeam_channel::bounded(NOTIFICATION_BACKLOG);
        let moved_aside: Vec<String> = store
            .quarantined()
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        tracing::info!(
            pool_size = settings.dispatcher.pool_size,
            playlists = store.list_names().len(),
            "engine ready"
        );
        let engine = Self {
            dispatcher: TaskDispatcher::new(settings.dispatcher.pool_size),
            resolver: Arc::new(resolver),
            queue,
            playback: controller,
            thumbnails,
            store,
            search: None,
            last_state: PlaybackState::Idle,
            events,
            notifications,
        };
        for path in moved_aside {
            engine.notify(Notification::Notice(format!(
                "Saved data was unreadable and has been moved to {path}"
            )));
        }
        Ok(engine)
    }

    /// A receiver for engine notifications. All clones share one stream.
    /// At most [`NOTIFICATION_BACKLOG`] undelivered notifications are kept;
    /// past that the oldest are discarded.
    pub fn notifications(&self) -> Receiver<Notification> {
        self.notifications.clone()
    }

    pub fn playback_handle(&self) -> PlaybackHandle {
        self.playback.playback_handle()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn playlists(&self) -> &PlaylistStore {
        &self.store
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    /// Multiplex commands, sink events and task completions until
    /// `Command::Quit` arrives or the command channel closes, then shut down.
    pub fn run(mut self, commands: Receiver<Command>, sink_events: Receiver<SinkEvent>) {
        let completions = self.dispatcher.completions().clone();
        let never = crossbeam_channel::never();
        let mut sink_open = true;
        tracing::info!("engine loop started");

        loop {
            let sink_rx = if sink_open { &sink_events } else { &never };
            select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => {
                        if self.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::info!("command channel closed");
                        break;
                    }
                },
                recv(sink_rx) -> msg => match msg {
                    Ok(event) => self.handle_sink_event(event),
                    Err(_) => {
                        tracing::warn!("sink event channel closed");
                        sink_open = false;
                    }
                },
                recv(completions) -> msg => {
                    if let Some(completion) = msg.ok().and_then(|raw| self.dispatcher.accept(raw)) {
                        self.handle_completion(completion);
                    }
                },
            }
        }

        self.shutdown();
    }

    /// Wait up to `timeout` for one completion and apply it. Returns whether
    /// one arrived. For hosts that drive the engine without [`Engine::run`].
    pub fn process_next_completion(&mut self, timeout: Duration) -> bool {
        match self.dispatcher.recv_timeout(timeout) {
            Some(completion) => {
                self.handle_completion(completion);
                true
            }
            None => false,
        }
    }

    /// Apply one command. Returns `true` when the engine should quit.
    pub fn handle_command(&mut self, command: Command) -> bool {
        if matches!(command, Command::Quit) {
            tracing::info!("quit requested");
            return true;
        }
        tracing::debug!(?command, "command");
        if let Err(e) = self.apply(command) {
            self.report(e);
        }
        self.publish_state();
        false
    }

    pub fn handle_sink_event(&mut self, event: SinkEvent) {
        match self.playback.on_sink_event(event) {
            SinkOutcome::Continue => {}
            SinkOutcome::TrackEnded => self.advance(AdvanceReason::TrackEnded),
            SinkOutcome::Failed(message) => self.notify(Notification::Error(message)),
        }
        self.publish_state();
    }

    /// Apply a completion that already passed [`TaskDispatcher::accept`].
    pub fn handle_completion(&mut self, completion: Completion) {
        let Completion { handle, kind, result } = completion;
        match kind {
            TaskKind::Resolve => {
                let source = result.and_then(|out| match out {
                    TaskOutput::Resolved(source) => Ok(source),
                    _ => Err(mismatched(kind)),
                });
                if let Err(e) = self.playback.on_resolved(handle, source) {
                    self.report(e);
                }
            }
            TaskKind::RelatedTracks => {
                if self.queue.discovery_in_flight() != Some(handle) {
                    tracing::debug!(%handle, "ignoring stale discovery");
                    return;
                }
                let found = result.and_then(|out| match out {
                    TaskOutput::Related(tracks) => Ok(tracks),
                    _ => Err(mismatched(kind)),
                });
                match self.queue.complete_discovery(handle, found) {
                    Some(track) => self.start(track),
                    None => self.exhausted(),
                }
            }
            TaskKind::Search => {
                if self.search != Some(handle) {
                    tracing::debug!(%handle, "dropping superseded search results");
                    return;
                }
                self.search = None;
                match result {
                    Ok(TaskOutput::Search { query, page, tracks }) => {
                        tracing::debug!(%query, page, results = tracks.len(), "search finished");
                        self.notify(Notification::SearchResults { query, page, tracks });
                    }
                    Ok(_) => self.report(mismatched(kind)),
                    Err(e) => self.report(e),
                }
            }
            TaskKind::Thumbnail => match result {
                Ok(TaskOutput::Thumbnail { reference, thumbnail }) => {
                    self.notify(Notification::Thumbnail { reference, thumbnail });
                }
                Ok(_) => tracing::warn!("thumbnail task returned a mismatched payload"),
                Err(e) => tracing::debug!(error = %e, "thumbnail task failed"),
            },
        }
        self.publish_state();
    }

    /// Stop playback, drop any live source, clear the thumbnail cache and
    /// join the workers.
    pub fn shutdown(mut self) {
        tracing::info!("engine shutting down");
        if let Some(handle) = self.search.take() {
            self.dispatcher.cancel(handle);
        }
        self.queue.cancel_discovery(&mut self.dispatcher);
        self.playback.stop(&mut self.dispatcher);
        self.thumbnails.clear();
        self.dispatcher.shutdown();
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Enqueue(track) => {
                self.queue.enqueue(track)?;
                self.queue_changed();
            }
            Command::InsertAt { index, track } => {
                self.queue.insert_at(index, track)?;
                self.queue_changed();
            }
            Command::Remove(index) => {
                self.queue.remove_at(index).ok_or_else(|| no_track_at(index))?;
                self.queue_changed();
            }
            Command::Move { from, to } => {
                if !self.queue.move_to(from, to) {
                    return Err(Error::InvalidArgument(format!("cannot move {from} to {to}")));
                }
                self.queue_changed();
            }
            Command::Reorder(ids) => {
                self.queue.rebuild_from(&ids);
                self.queue_changed();
            }
            Command::ClearQueue => {
                self.queue.cancel_discovery(&mut self.dispatcher);
                self.queue.clear();
                self.queue_changed();
            }

            Command::Play => self.play()?,
            Command::PlayAt(index) => {
                let track = self.queue.select(index).ok_or_else(|| no_track_at(index))?;
                self.start(track);
            }
            Command::TogglePause => match self.playback.state() {
                PlaybackState::Idle | PlaybackState::Error => self.play()?,
                _ => self.playback.toggle_pause()?,
            },
            Command::Pause => self.playback.pause()?,
            Command::Resume => self.playback.resume()?,
            Command::Stop => {
                self.queue.cancel_discovery(&mut self.dispatcher);
                self.playback.stop(&mut self.dispatcher);
            }
            Command::Next => {
                self.playback.transition(&mut self.dispatcher);
                self.advance(AdvanceReason::Skip);
            }
            Command::Previous => {
                self.playback.transition(&mut self.dispatcher);
                match self.queue.previous() {
                    Some(track) => self.start(track),
                    None => self.playback.stop(&mut self.dispatcher),
                }
            }
            Command::Retry => self.retry()?,
            Command::Seek(seconds) => self.playback.seek(seconds)?,
            Command::SetSpeed(speed) => self.playback.set_speed(speed)?,
            Command::SetVolume(volume) => self.playback.set_volume(volume)?,
            Command::SetLoopStart(at) => self.playback.set_loop_start(at)?,
            Command::SetLoopEnd(at) => self.playback.set_loop_end(at)?,
            Command::ClearLoop => self.playback.clear_loop(),
            Command::SetRepeat(mode) => self.queue.set_repeat(mode),
            Command::CycleRepeat => {
                let mode = self.queue.repeat().cycle();
                self.queue.set_repeat(mode);
                self.notify(Notification::Notice(format!("Repeat: {}", mode.label())));
            }
            Command::SetShuffle(on) => self.queue.set_shuffle(on),
            Command::ToggleShuffle => {
                let on = !self.queue.shuffle();
                self.queue.set_shuffle(on);
                let label = if on { "on" } else { "off" };
                self.notify(Notification::Notice(format!("Shuffle: {label}")));
            }

            Command::Search { query, page } => self.search(query, page)?,
            Command::RequestThumbnail(reference) => self.request_thumbnail(reference),

            Command::SavePlaylist(name) => {
                self.store.save(&name, &self.queue.snapshot())?;
                self.notify(Notification::Notice(format!("Saved playlist {}", name.trim())));
                self.playlists_changed();
            }
            Command::LoadPlaylist(name) => self.load_playlist(&name)?,
            Command::DeletePlaylist(name) => {
                if !self.store.delete(&name)? {
                    return Err(Error::InvalidArgument(format!("no playlist named {name:?}")));
                }
                self.playlists_changed();
            }
            Command::ImportPlaylist(path) => {
                let name = self.store.import(&path)?;
                self.notify(Notification::Notice(format!("Imported playlist {name}")));
                self.playlists_changed();
            }
            Command::ExportPlaylist { name, path } => self.export_playlist(&name, &path)?,

            Command::Quit => {}
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        match self.playback.state() {
            PlaybackState::Paused => self.playback.resume(),
            PlaybackState::Error => self.retry(),
            PlaybackState::Idle => {
                let next = self.queue.start_current().or_else(|| self.queue.select(0));
                match next {
                    Some(track) => self.start(track),
                    None => self.advance(AdvanceReason::Skip),
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn retry(&mut self) -> Result<()> {
        self.playback
            .retry(&mut self.dispatcher, &self.resolver)
            .map(|_| ())
            .ok_or_else(|| Error::InvalidArgument("nothing to retry".to_string()))
    }

    /// Start a session for `track`, which the queue already made current.
    fn start(&mut self, track: Track) {
        self.queue.cancel_discovery(&mut self.dispatcher);
        self.playback.begin(track.clone(), &mut self.dispatcher, &self.resolver);
        self.notify(Notification::NowPlaying(track));
        self.queue_changed();
    }

    fn advance(&mut self, reason: AdvanceReason) {
        match self.queue.advance(reason, &mut self.dispatcher, &self.resolver) {
            Advance::Track(track) => self.start(track),
            Advance::Discovering(handle) => {
                tracing::debug!(%handle, ?reason, "waiting for related tracks");
                self.playback.transition(&mut self.dispatcher);
            }
            Advance::Exhausted => self.exhausted(),
        }
    }

    fn exhausted(&mut self) {
        tracing::info!("queue exhausted");
        self.playback.stop(&mut self.dispatcher);
        self.notify(Notification::QueueExhausted);
        self.queue_changed();
    }

    fn search(&mut self, query: String, page: usize) -> Result<()> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(Error::InvalidArgument("search query is empty".to_string()));
        }
        if let Err(e) = self.store.record_search(&query) {
            self.report(e);
        }
        if let Some(previous) = self.search.take() {
            self.dispatcher.cancel(previous);
        }

        let resolver = Arc::clone(&self.resolver);
        tracing::info!(%query, page, "searching");
        let handle = self.dispatcher.submit(TaskKind::Search, CancelToken::new(), move |token| {
            let tracks = resolver.search(&query, page, token)?;
            Ok(TaskOutput::Search { query, page, tracks })
        });
        self.search = Some(handle);
        Ok(())
    }

    fn request_thumbnail(&mut self, reference: String) {
        if let Some(bytes) = self.thumbnails.peek(&reference) {
            self.notify(Notification::Thumbnail {
                reference,
                thumbnail: Thumbnail::Image(bytes),
            });
            return;
        }
        let cache = self.thumbnails.clone();
        self.dispatcher.submit(TaskKind::Thumbnail, CancelToken::new(), move |_| {
            let thumbnail = cache.fetch(&reference);
            Ok(TaskOutput::Thumbnail { reference, thumbnail })
        });
    }

    /// Replace the queue with a stored playlist. Playback stops; the first
    /// track becomes current but does not start.
    fn load_playlist(&mut self, name: &str) -> Result<()> {
        let tracks = self
            .store
            .load(name)
            .ok_or_else(|| Error::InvalidArgument(format!("no playlist named {name:?}")))?;
        self.queue.cancel_discovery(&mut self.dispatcher);
        self.playback.stop(&mut self.dispatcher);
        tracing::info!(name, tracks = tracks.len(), "playlist loaded into queue");
        self.queue.replace(tracks);
        self.notify(Notification::Notice(format!("Loaded playlist {}", name.trim())));
        self.queue_changed();
        Ok(())
    }

    fn export_playlist(&mut self, name: &str, path: &Path) -> Result<()> {
        self.store.export(name, path)?;
        let message = format!("Exported {} to {}", name.trim(), path.display());
        self.notify(Notification::Notice(message));
        Ok(())
    }

    fn report(&self, error: Error) {
        match error {
            Error::Cancelled => {}
            Error::InvalidArgument(_) | Error::Persistence { .. } | Error::Config(_) => {
                tracing::warn!(error = %error, "command rejected");
                self.notify(Notification::Notice(error.user_message()));
            }
            _ => {
                tracing::error!(error = %error, "playback error");
                self.notify(Notification::Error(error.user_message()));
            }
        }
    }

    fn publish_state(&mut self) {
        let state = self.playback.state();
        if state != self.last_state {
            tracing::debug!(from = self.last_state.label(), to = state.label(), "state changed");
            self.last_state = state;
            self.notify(Notification::StateChanged(state));
        }
    }

    fn queue_changed(&self) {
        self.notify(Notification::QueueChanged {
            len: self.queue.len(),
            current: self.queue.current_index(),
        });
    }

    fn playlists_changed(&self) {
        self.notify(Notification::PlaylistsChanged(self.store.list_names()));
    }

    fn notify(&self, notification: Notification) {
        let mut pending = notification;
        loop {
            match self.events.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(n)) => {
                    // Evict the oldest undelivered notification.
                    if self.notifications.try_recv().is_ok() {
                        tracing::trace!("notification backlog full, dropped oldest");
                    }
                    pending = n;
                }
                // The engine holds a receiver itself.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

fn no_track_at(index: usize) -> Error {
    Error::InvalidArgument(format!("no track at position {index}"))
}

fn mismatched(kind: TaskKind) -> Error {
    Error::TaskPanicked(format!("{kind:?} task returned a mismatched payload"))
}
