//! The live, ordered play queue.
//!
//! `QueueManager` owns its track sequence and a notion of "current" that is
//! tied to track identity: reordering recomputes the index by id instead of
//! assuming it is stable. When playback runs off the end, the queue asks the
//! dispatcher for related tracks and appends whatever comes back.

mod model;

pub use model::*;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dispatch::{CancelToken, TaskDispatcher, TaskHandle, TaskKind, TaskOutput};
use crate::error::{Error, Result};
use crate::resolver::TrackResolver;
use crate::track::{Track, TrackId};

/// What `advance` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Track(Track),
    /// Related-track discovery was dispatched; the answer arrives as a
    /// completion for this handle.
    Discovering(TaskHandle),
    /// Nothing left to play.
    Exhausted,
}

pub struct QueueManager {
    tracks: Vec<Track>,
    current: Option<usize>,
    /// `current` points at a track that has not started yet (it was made
    /// current by removal of its predecessor or by enqueueing into an
    /// unset queue), so the next advance must yield it rather than skip it.
    current_unplayed: bool,
    /// Most recent track that was current, kept even after removal.
    seed: Option<Track>,
    repeat: RepeatMode,
    shuffle: bool,
    auto_refill: bool,
    discovery: Option<TaskHandle>,
    rng: StdRng,
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new(RepeatMode::Off, false, true)
    }
}

impl QueueManager {
    pub fn new(repeat: RepeatMode, shuffle: bool, auto_refill: bool) -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            current_unplayed: false,
            seed: None,
            repeat,
            shuffle,
            auto_refill,
            discovery: None,
            rng: StdRng::seed_from_u64(rand::random()),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    pub fn position_of(&self, id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| &t.id == id)
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
    }

    pub fn set_auto_refill(&mut self, auto_refill: bool) {
        self.auto_refill = auto_refill;
    }

    pub fn discovery_in_flight(&self) -> Option<TaskHandle> {
        self.discovery
    }

    /// Independent copy of the sequence, e.g. for saving as a playlist.
    pub fn snapshot(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    pub fn enqueue(&mut self, track: Track) -> Result<()> {
        let at = self.tracks.len();
        self.insert_at(at, track)
    }

    pub fn insert_at(&mut self, index: usize, track: Track) -> Result<()> {
        if index > self.tracks.len() {
            return Err(Error::InvalidArgument(format!(
                "insert position {index} beyond queue length {}",
                self.tracks.len()
            )));
        }
        if self.position_of(&track.id).is_some() {
            return Err(Error::InvalidArgument(format!("track {} is already queued", track.id)));
        }

        self.tracks.insert(index, track);
        match self.current {
            Some(cur) if cur >= index => self.current = Some(cur + 1),
            Some(_) => {}
            None => {
                self.current = Some(index);
                self.current_unplayed = true;
            }
        }
        Ok(())
    }

    /// Remove the track at `index`. If it was current, the successor becomes
    /// current (or nothing, when it was the last one).
    pub fn remove_at(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(index);

        if let Some(cur) = self.current {
            if index < cur {
                self.current = Some(cur - 1);
            } else if index == cur {
                self.seed = Some(removed.clone());
                if index < self.tracks.len() {
                    self.current_unplayed = true;
                } else {
                    self.current = None;
                    self.current_unplayed = false;
                }
            }
        }
        Some(removed)
    }

    /// Move one track; the current track stays current.
    pub fn move_to(&mut self, from: usize, to: usize) -> bool {
        let len = self.tracks.len();
        if from >= len || to >= len {
            return false;
        }
        if from == to {
            return true;
        }
        let current_id = self.current().map(|t| t.id.clone());
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        self.current = current_id.and_then(|id| self.position_of(&id));
        true
    }

    /// Reconcile with an externally specified order.
    ///
    /// Ids not in the queue are ignored, queued tracks missing from `order`
    /// are dropped. The current track is found again by id; if it was
    /// dropped, its nearest surviving successor becomes current.
    pub fn rebuild_from(&mut self, order: &[TrackId]) {
        let old_ids: Vec<TrackId> = self.tracks.iter().map(|t| t.id.clone()).collect();
        let current_pos = self.current;

        let mut by_id: HashMap<TrackId, Track> =
            self.tracks.drain(..).map(|t| (t.id.clone(), t)).collect();
        self.tracks = order.iter().filter_map(|id| by_id.remove(id)).collect();

        let Some(cur) = current_pos else {
            return;
        };
        if let Some(pos) = self.position_of(&old_ids[cur]) {
            self.current = Some(pos);
            return;
        }

        if let Some(removed) = by_id.remove(&old_ids[cur]) {
            self.seed = Some(removed);
        }
        let survivor = old_ids[cur + 1..]
            .iter()
            .find_map(|id| self.position_of(id));
        self.current = survivor;
        self.current_unplayed = survivor.is_some();
        tracing::debug!(current = ?self.current, "current track dropped by reorder");
    }

    /// Replace the whole sequence (e.g. loading a playlist). The first
    /// track becomes current but has not started.
    pub fn replace(&mut self, tracks: Vec<Track>) {
        let mut seen = HashSet::new();
        self.tracks = tracks
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect();
        self.current = if self.tracks.is_empty() { None } else { Some(0) };
        self.current_unplayed = self.current.is_some();
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
        self.current_unplayed = false;
    }

    /// Make `index` current for immediate playback.
    pub fn select(&mut self, index: usize) -> Option<Track> {
        let track = self.tracks.get(index)?.clone();
        self.current = Some(index);
        self.mark_started(&track);
        Some(track)
    }

    /// The current track, marked as started. Used for a plain "play".
    pub fn start_current(&mut self) -> Option<Track> {
        let track = self.current()?.clone();
        self.mark_started(&track);
        Some(track)
    }

    /// Step back one track; wraps under repeat-all, otherwise stays at the
    /// head.
    pub fn previous(&mut self) -> Option<Track> {
        if self.tracks.is_empty() {
            return None;
        }
        let prev = match self.current {
            Some(0) | None if self.repeat == RepeatMode::All => self.tracks.len() - 1,
            Some(0) | None => 0,
            Some(i) => i - 1,
        };
        self.select(prev)
    }

    /// Move to the next track.
    ///
    /// Past the end, repeat-all wraps; otherwise, with auto-refill on,
    /// related-track discovery is dispatched and its result must be handed
    /// to [`QueueManager::complete_discovery`].
    pub fn advance(
        &mut self,
        reason: AdvanceReason,
        dispatcher: &mut TaskDispatcher,
        resolver: &Arc<TrackResolver>,
    ) -> Advance {
        if self.current_unplayed {
            if let Some(track) = self.start_current() {
                return Advance::Track(track);
            }
        }

        if reason == AdvanceReason::TrackEnded && self.repeat == RepeatMode::One {
            if let Some(track) = self.start_current() {
                return Advance::Track(track);
            }
        }

        let len = self.tracks.len();
        let next = if self.shuffle && len > 1 {
            self.random_other_index()
        } else {
            match self.current {
                Some(i) => i + 1,
                None if self.seed.is_some() => len,
                None => 0,
            }
        };

        if next < len {
            return self.select(next).map_or(Advance::Exhausted, Advance::Track);
        }
        if self.repeat == RepeatMode::All && len > 0 {
            return self.select(0).map_or(Advance::Exhausted, Advance::Track);
        }
        if self.auto_refill {
            return Advance::Discovering(self.discover(dispatcher, resolver));
        }
        Advance::Exhausted
    }

    /// Apply the result of a discovery task. Returns the first appended
    /// track, now current, or `None` for a stale handle, a failure or an
    /// empty result.
    pub fn complete_discovery(
        &mut self,
        handle: TaskHandle,
        result: Result<Vec<Track>>,
    ) -> Option<Track> {
        if self.discovery != Some(handle) {
            tracing::debug!(%handle, "ignoring stale discovery result");
            return None;
        }
        self.discovery = None;

        let found = match result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "related-track discovery failed");
                return None;
            }
        };

        let first = self.tracks.len();
        for track in found {
            if track.is_valid() && self.position_of(&track.id).is_none() {
                self.tracks.push(track);
            }
        }
        tracing::info!(appended = self.tracks.len() - first, "queue refilled with related tracks");
        self.select(first)
    }

    pub fn cancel_discovery(&mut self, dispatcher: &mut TaskDispatcher) {
        if let Some(h) = self.discovery.take() {
            dispatcher.cancel(h);
        }
    }

    fn discover(
        &mut self,
        dispatcher: &mut TaskDispatcher,
        resolver: &Arc<TrackResolver>,
    ) -> TaskHandle {
        if let Some(h) = self.discovery {
            return h;
        }
        let seed = self.current().cloned().or_else(|| self.seed.clone());
        let resolver = Arc::clone(resolver);
        tracing::info!(
            seed = ?seed.as_ref().map(|t| &t.id),
            "queue exhausted, discovering related tracks"
        );

        let handle = dispatcher.submit(TaskKind::RelatedTracks, CancelToken::new(), move |token| {
            resolver.related(seed.as_ref(), token).map(TaskOutput::Related)
        });
        self.discovery = Some(handle);
        handle
    }

    fn mark_started(&mut self, track: &Track) {
        self.current_unplayed = false;
        self.seed = Some(track.clone());
    }

    fn random_other_index(&mut self) -> usize {
        let len = self.tracks.len();
        match self.current {
            Some(cur) => {
                let pick = self.rng.random_range(0..len - 1);
                if pick >= cur { pick + 1 } else { pick }
            }
            None => self.rng.random_range(0..len),
        }
    }
}
