//! Deduplicated, content-addressed background fetch of thumbnails.
//!
//! Entries live in memory (bounded, least-recently-used eviction) and as
//! files named by their cache key inside a temporary directory. Concurrent
//! requests for the same key share one underlying fetch.

mod fetch;

pub use fetch::{HttpThumbnailFetcher, ThumbnailFetcher};

use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Outcome of a thumbnail request. Failure is a value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Thumbnail {
    Image(Arc<Vec<u8>>),
    Unavailable,
}

impl Thumbnail {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Image(b) => Some(b.as_slice()),
            Self::Unavailable => None,
        }
    }
}

/// Stable cache key for a thumbnail reference.
pub fn cache_key(reference: &str) -> String {
    let digest = Sha256::digest(reference.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Default)]
struct Pending {
    result: Mutex<Option<Thumbnail>>,
    ready: Condvar,
}

impl Pending {
    fn complete(&self, thumbnail: Thumbnail) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(thumbnail);
        self.ready.notify_all();
    }

    fn wait(&self) -> Thumbnail {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(t) = slot.as_ref() {
                return t.clone();
            }
            slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct State {
    entries: LruCache<String, Arc<Vec<u8>>>,
    in_flight: HashMap<String, Arc<Pending>>,
}

struct Inner {
    dir: PathBuf,
    fetcher: Arc<dyn ThumbnailFetcher>,
    state: Mutex<State>,
}

/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<Inner>,
}

impl ThumbnailCache {
    pub fn open(
        dir: impl Into<PathBuf>,
        capacity: usize,
        fetcher: Arc<dyn ThumbnailFetcher>,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                fetcher,
                state: Mutex::new(State {
                    entries: LruCache::new(capacity),
                    in_flight: HashMap::new(),
                }),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Blocking fetch; call it from a dispatched task.
    pub fn fetch(&self, reference: &str) -> Thumbnail {
        let key = cache_key(reference);

        let (pending, leader) = {
            let mut state = self.state();
            if let Some(bytes) = state.entries.get(&key) {
                return Thumbnail::Image(bytes.clone());
            }
            match state.in_flight.get(&key) {
                Some(p) => (p.clone(), false),
                None => {
                    let p = Arc::new(Pending::default());
                    state.in_flight.insert(key.clone(), p.clone());
                    (p, true)
                }
            }
        };

        if !leader {
            tracing::trace!(%key, "joining in-flight thumbnail fetch");
            return pending.wait();
        }

        let mut leader = Leader {
            cache: self,
            key: &key,
            pending,
            thumbnail: Thumbnail::Unavailable,
        };
        leader.thumbnail = self.load(&key, reference);
        leader.thumbnail.clone()
    }

    /// Memory-only lookup; never fetches.
    pub fn peek(&self, reference: &str) -> Option<Arc<Vec<u8>>> {
        self.state().entries.peek(&cache_key(reference)).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove files left behind by earlier runs that this cache does not track.
    pub fn prune_orphans(&self) -> usize {
        let Ok(read) = fs::read_dir(&self.inner.dir) else {
            return 0;
        };
        let mut removed = 0;
        for entry in read.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            let tracked = {
                let state = self.state();
                state.entries.contains(&name) || state.in_flight.contains_key(&name)
            };
            if !tracked && entry.path().is_file() && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "pruned orphaned thumbnails");
        }
        removed
    }

    /// Drop every entry and its file. Called on normal shutdown.
    pub fn clear(&self) {
        let keys: Vec<String> = {
            let mut state = self.state();
            let keys = state.entries.iter().map(|(k, _)| k.clone()).collect();
            state.entries.clear();
            keys
        };
        for key in keys {
            self.remove_file(&key);
        }
        self.prune_orphans();
    }

    fn load(&self, key: &str, reference: &str) -> Thumbnail {
        let path = self.inner.dir.join(key);
        if let Ok(bytes) = fs::read(&path) {
            if !bytes.is_empty() {
                return Thumbnail::Image(Arc::new(bytes));
            }
        }

        match self.inner.fetcher.fetch(reference) {
            Ok(bytes) if !bytes.is_empty() => {
                if let Err(e) = fs::write(&path, &bytes) {
                    tracing::warn!(%key, error = %e, "could not write thumbnail to disk");
                }
                Thumbnail::Image(Arc::new(bytes))
            }
            Ok(_) => Thumbnail::Unavailable,
            Err(e) => {
                tracing::debug!(%key, error = %e, "thumbnail fetch failed");
                Thumbnail::Unavailable
            }
        }
    }

    fn remove_file(&self, key: &str) {
        let _ = fs::remove_file(self.inner.dir.join(key));
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The fetching side of a coalesced request. Dropping it publishes the
/// result and retires the in-flight entry, also when the fetcher unwinds,
/// so followers never wait forever.
struct Leader<'a> {
    cache: &'a ThumbnailCache,
    key: &'a str,
    pending: Arc<Pending>,
    thumbnail: Thumbnail,
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::warn!(key = %self.key, "thumbnail fetcher panicked");
        }
        {
            let mut state = self.cache.state();
            if let Thumbnail::Image(bytes) = &self.thumbnail {
                let evicted = state.entries.push(self.key.to_string(), bytes.clone());
                if let Some((evicted, _)) = evicted.filter(|(k, _)| k != self.key) {
                    self.cache.remove_file(&evicted);
                }
            }
            state.in_flight.remove(self.key);
        }
        self.pending.complete(self.thumbnail.clone());
    }
}

#[cfg(test)]
mod tests;
