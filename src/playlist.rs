//! Persistence of named playlists and search history.
//!
//! Both live in JSON files that are replaced atomically. A failed write
//! leaves the in-memory state exactly as it was before the call.

mod history;
mod store;

pub use history::{SearchHistory, SearchHistoryEntry};
pub use store::Playlists;

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::StorageSettings;
use crate::error::{Error, Result};
use crate::track::Track;

pub struct PlaylistStore {
    playlists: Playlists,
    history: SearchHistory,
}

impl PlaylistStore {
    pub fn open(settings: &StorageSettings) -> Result<Self> {
        Ok(Self {
            playlists: Playlists::open(settings.playlists_path())?,
            history: SearchHistory::open(settings.history_path(), settings.history_limit)?,
        })
    }

    /// Files that were unreadable at open and moved aside.
    pub fn quarantined(&self) -> Vec<&Path> {
        [self.playlists.quarantined(), self.history.quarantined()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn save(&mut self, name: &str, snapshot: &[Track]) -> Result<()> {
        self.playlists.save(name, snapshot)
    }

    pub fn load(&self, name: &str) -> Option<Vec<Track>> {
        self.playlists.load(name)
    }

    pub fn delete(&mut self, name: &str) -> Result<bool> {
        self.playlists.delete(name)
    }

    pub fn list_names(&self) -> Vec<String> {
        self.playlists.list_names()
    }

    pub fn import(&mut self, file: &Path) -> Result<String> {
        self.playlists.import(file)
    }

    pub fn export(&self, name: &str, file: &Path) -> Result<()> {
        self.playlists.export(name, file)
    }

    pub fn record_search(&mut self, query: &str) -> Result<()> {
        self.history.record(query)
    }

    pub fn recent_searches(&self, limit: usize) -> Vec<SearchHistoryEntry> {
        self.history.recent(limit)
    }

    pub fn playlists(&self) -> &Playlists {
        &self.playlists
    }

    pub fn history(&self) -> &SearchHistory {
        &self.history
    }
}

/// Move an unparseable document to `<file>.corrupt` so the next write
/// does not destroy it. Returns where it went, if the rename worked.
pub(crate) fn quarantine(path: &Path, error: &Error) -> Option<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    let target = PathBuf::from(target);
    match std::fs::rename(path, &target) {
        Ok(()) => {
            tracing::warn!(
                path = %path.display(),
                moved_to = %target.display(),
                %error,
                "unreadable file moved aside, starting empty"
            );
            Some(target)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                %error,
                rename_error = %e,
                "unreadable file could not be moved aside, starting empty"
            );
            None
        }
    }
}

/// Serialize `value` as pretty JSON into a sibling temp file, then rename it
/// over `path`.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| Error::persistence(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(path, e))?;
    serde_json::to_writer_pretty(&mut tmp, value).map_err(|e| Error::persistence(path, e))?;
    tmp.write_all(b"\n").map_err(|e| Error::persistence(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::persistence(path, e))?;
    tmp.persist(path).map_err(|e| Error::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests;
