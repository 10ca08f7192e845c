//! Recent searches, most recent first.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::{quarantine, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub query_text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SearchHistory {
    path: PathBuf,
    limit: usize,
    entries: Vec<SearchHistoryEntry>,
    quarantined: Option<PathBuf>,
}

impl SearchHistory {
    /// Read `path`; a missing file is an empty history. A plain list of
    /// strings (oldest first) is accepted too. An unparseable file is moved
    /// to `<path>.corrupt` and the history starts empty.
    pub fn open(path: impl Into<PathBuf>, limit: usize) -> Result<Self> {
        let path = path.into();
        let limit = limit.max(1);
        let mut quarantined = None;
        let mut entries = match fs::read_to_string(&path) {
            Ok(text) => parse(&path, &text).unwrap_or_else(|e| {
                quarantined = quarantine(&path, &e);
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::persistence(&path, e)),
        };
        entries.truncate(limit);
        Ok(Self {
            path,
            limit,
            entries,
            quarantined,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn quarantined(&self) -> Option<&Path> {
        self.quarantined.as_deref()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Put `query` at the front. A repeated query is moved, not duplicated;
    /// past the limit the oldest entry is dropped.
    pub fn record(&mut self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("search query is empty".to_string()));
        }

        let mut next: Vec<SearchHistoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.query_text != query)
            .cloned()
            .collect();
        next.insert(
            0,
            SearchHistoryEntry {
                query_text: query.to_string(),
                timestamp: Utc::now(),
            },
        );
        next.truncate(self.limit);

        write_json_atomic(&self.path, &next)?;
        self.entries = next;
        Ok(())
    }

    /// Up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<SearchHistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }
}

fn parse(path: &Path, text: &str) -> Result<Vec<SearchHistoryEntry>> {
    let doc: Value = serde_json::from_str(text).map_err(|e| Error::persistence(path, e))?;
    let Value::Array(items) = doc else {
        return Err(Error::persistence(path, "expected a list of searches"));
    };

    if items.iter().all(Value::is_string) {
        let now = Utc::now();
        return Ok(items
            .iter()
            .rev()
            .filter_map(Value::as_str)
            .map(|q| SearchHistoryEntry {
                query_text: q.to_string(),
                timestamp: now,
            })
            .collect());
    }

    Ok(items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<SearchHistoryEntry>(v).ok())
        .filter(|e| !e.query_text.trim().is_empty())
        .collect())
}
