//! Named playlists in one aggregate JSON document.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::track::Track;

use super::{quarantine, write_json_atomic};

/// Export file shape: `{"name": ..., "tracks": [...]}`.
#[derive(Serialize)]
struct Exported<'a> {
    name: &'a str,
    tracks: &'a [Track],
}

#[derive(Debug)]
pub struct Playlists {
    path: PathBuf,
    lists: BTreeMap<String, Vec<Track>>,
    quarantined: Option<PathBuf>,
}

impl Playlists {
    /// Read `path`; a missing file is an empty store. An unparseable file
    /// is moved to `<path>.corrupt` and the store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut quarantined = None;
        let lists = match fs::read_to_string(&path) {
            Ok(text) => parse_document(&path, &text).unwrap_or_else(|e| {
                quarantined = quarantine(&path, &e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::persistence(&path, e)),
        };
        tracing::debug!(path = %path.display(), count = lists.len(), "playlists loaded");
        Ok(Self {
            path,
            lists,
            quarantined,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable file found at open was moved.
    pub fn quarantined(&self) -> Option<&Path> {
        self.quarantined.as_deref()
    }

    /// Snapshot `tracks` under `name`, replacing any playlist of that name.
    pub fn save(&mut self, name: &str, tracks: &[Track]) -> Result<()> {
        let name = checked_name(name)?;
        if tracks.is_empty() {
            return Err(Error::InvalidArgument("cannot save an empty playlist".to_string()));
        }
        let mut next = self.lists.clone();
        next.insert(name.to_string(), tracks.to_vec());
        self.commit(next)?;
        tracing::info!(name, tracks = tracks.len(), "playlist saved");
        Ok(())
    }

    pub fn load(&self, name: &str) -> Option<Vec<Track>> {
        self.lists.get(name.trim()).cloned()
    }

    /// Returns whether a playlist was removed.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let name = name.trim();
        if !self.lists.contains_key(name) {
            return Ok(false);
        }
        let mut next = self.lists.clone();
        next.remove(name);
        self.commit(next)?;
        tracing::info!(name, "playlist deleted");
        Ok(true)
    }

    /// Names in sorted order.
    pub fn list_names(&self) -> Vec<String> {
        self.lists.keys().cloned().collect()
    }

    /// Import a playlist file: either `{"name", "tracks"}` or a bare array of
    /// tracks, which gets an `Imported_<unix-ts>` name. Malformed entries are
    /// skipped. Returns the stored name.
    pub fn import(&mut self, file: &Path) -> Result<String> {
        let text = fs::read_to_string(file).map_err(|e| Error::persistence(file, e))?;
        let payload: Value = serde_json::from_str(&text).map_err(|e| Error::persistence(file, e))?;

        let (name, tracks) = match &payload {
            Value::Object(obj) => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(imported_name);
                let tracks = obj.get("tracks").and_then(|t| parse_tracks(file, &name, t));
                (name, tracks)
            }
            Value::Array(_) => {
                let name = imported_name();
                let tracks = parse_tracks(file, &name, &payload);
                (name, tracks)
            }
            _ => (String::new(), None),
        };
        let tracks = tracks.ok_or_else(|| Error::persistence(file, "invalid playlist format"))?;

        let mut next = self.lists.clone();
        next.insert(name.clone(), tracks);
        self.commit(next)?;
        tracing::info!(name = %name, file = %file.display(), "playlist imported");
        Ok(name)
    }

    pub fn export(&self, name: &str, file: &Path) -> Result<()> {
        let name = name.trim();
        let tracks = self
            .lists
            .get(name)
            .ok_or_else(|| Error::InvalidArgument(format!("no playlist named {name:?}")))?;
        write_json_atomic(file, &Exported { name, tracks })?;
        tracing::info!(name, file = %file.display(), "playlist exported");
        Ok(())
    }

    /// Persist first; memory only changes once the file is written.
    fn commit(&mut self, next: BTreeMap<String, Vec<Track>>) -> Result<()> {
        write_json_atomic(&self.path, &next)?;
        self.lists = next;
        Ok(())
    }
}

fn checked_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("playlist name is empty".to_string()));
    }
    Ok(name)
}

fn imported_name() -> String {
    format!("Imported_{}", chrono::Utc::now().timestamp())
}

fn parse_document(path: &Path, text: &str) -> Result<BTreeMap<String, Vec<Track>>> {
    let doc: Value = serde_json::from_str(text).map_err(|e| Error::persistence(path, e))?;
    let Value::Object(map) = doc else {
        return Err(Error::persistence(path, "expected an object of playlists"));
    };
    Ok(map
        .iter()
        .filter_map(|(name, value)| Some((name.clone(), parse_tracks(path, name, value)?)))
        .collect())
}

/// Valid tracks of a JSON array, or `None` if `value` is not an array.
fn parse_tracks(path: &Path, playlist: &str, value: &Value) -> Option<Vec<Track>> {
    let entries = value.as_array()?;
    let tracks: Vec<Track> = entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<Track>(entry.clone()).ok())
        .filter(Track::is_valid)
        .collect();
    let skipped = entries.len() - tracks.len();
    if skipped > 0 {
        tracing::warn!(
            path = %path.display(),
            playlist,
            skipped,
            "skipped malformed playlist entries"
        );
    }
    Some(tracks)
}
