//! Track identity and resolved playable sources.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tempfile::TempPath;

/// Session-unique track identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single addressable audio item. `source_ref` is resolved lazily.
///
/// Deserialization also accepts the `duration`, `webpage_url` and
/// `thumbnail` keys written by older playlist files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    #[serde(default, alias = "duration", deserialize_with = "whole_seconds")]
    pub duration_seconds: u64,
    #[serde(alias = "webpage_url")]
    pub source_ref: String,
    #[serde(default, alias = "thumbnail", skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
}

impl Track {
    pub fn new(
        id: impl Into<TrackId>,
        title: impl Into<String>,
        source_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            duration_seconds: 0,
            source_ref: source_ref.into(),
            thumbnail_ref: None,
            uploader: None,
        }
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_ref: impl Into<String>) -> Self {
        self.thumbnail_ref = Some(thumbnail_ref.into());
        self
    }

    /// Required fields are present and non-blank.
    pub fn is_valid(&self) -> bool {
        !self.id.0.trim().is_empty() && !self.source_ref.trim().is_empty()
    }
}

/// Accepts integers, floats and null.
fn whole_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let secs = Option::<f64>::deserialize(d)?;
    Ok(secs
        .filter(|s| s.is_finite() && *s > 0.0)
        .map_or(0, |s| s.round() as u64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Stream,
    LocalFile,
}

/// What the resolver learned about the chosen encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatInfo {
    pub format_id: Option<String>,
    pub codec: Option<String>,
    pub bitrate_kbps: Option<f64>,
    pub extension: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// A concrete playable locator for one playback attempt.
///
/// Local files are owned through a `TempPath` and removed from disk when the
/// source is dropped.
#[derive(Debug)]
pub struct ResolvedSource {
    pub track_id: TrackId,
    pub kind: SourceKind,
    pub locator: String,
    pub format: FormatInfo,
    local_file: Option<TempPath>,
}

impl ResolvedSource {
    pub fn stream(track_id: TrackId, url: impl Into<String>, format: FormatInfo) -> Self {
        Self {
            track_id,
            kind: SourceKind::Stream,
            locator: url.into(),
            format,
            local_file: None,
        }
    }

    pub fn local_file(track_id: TrackId, file: TempPath, format: FormatInfo) -> Self {
        let locator = file.to_string_lossy().into_owned();
        Self {
            track_id,
            kind: SourceKind::LocalFile,
            locator,
            format,
            local_file: Some(file),
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_file.as_deref()
    }
}
