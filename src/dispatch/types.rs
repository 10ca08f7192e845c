//! Task tags, handles, cancellation tokens and completion messages.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::thumbnails::Thumbnail;
use crate::track::{ResolvedSource, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Turn a track into a playable source.
    Resolve,
    /// Related-track discovery for queue auto-refill.
    RelatedTracks,
    Thumbnail,
    Search,
}

/// Opaque identity of one submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Cooperative cancellation flag, checked by tasks at safe points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled, for use with `?`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Tagged result payload of a finished task.
#[derive(Debug)]
pub enum TaskOutput {
    Resolved(ResolvedSource),
    Related(Vec<Track>),
    Thumbnail {
        reference: String,
        thumbnail: Thumbnail,
    },
    Search {
        query: String,
        page: usize,
        tracks: Vec<Track>,
    },
}

/// Message delivered to the orchestrating thread when a task finishes.
#[derive(Debug)]
pub struct Completion {
    pub handle: TaskHandle,
    pub kind: TaskKind,
    pub result: Result<TaskOutput>,
}
