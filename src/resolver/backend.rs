//! The injected extraction capability.
//!
//! Implementations talk to whatever site or tool actually knows how to find
//! audio; the core only consumes this boundary.

use std::path::Path;

use crate::dispatch::CancelToken;
use crate::error::Result;
use crate::track::{FormatInfo, Track};

/// One encoding a track is available in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFormat {
    pub format_id: String,
    /// Direct locator; formats without one cannot be streamed.
    pub url: Option<String>,
    /// `None` or `"none"` means no audio.
    pub audio_codec: Option<String>,
    /// `None` or `"none"` means audio-only.
    pub video_codec: Option<String>,
    /// Audio bitrate in kbit/s.
    pub audio_bitrate: Option<f64>,
    /// Total bitrate in kbit/s, used when the audio bitrate is unknown.
    pub total_bitrate: Option<f64>,
    pub extension: Option<String>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamLookup {
    Formats(Vec<StreamFormat>),
    /// The capability knows the track but cannot offer a streamable format.
    NoStream,
}

/// Errors should be classified: [`crate::Error::TransientNetwork`] for
/// retryable network trouble, [`crate::Error::PermanentResolution`] for
/// unavailable content, [`crate::Error::Download`] for failed transfers.
pub trait MediaBackend: Send + Sync {
    fn search(&self, query: &str, page: usize) -> Result<Vec<Track>>;

    fn lookup_stream(&self, track: &Track) -> Result<StreamLookup>;

    /// Download the full track into `dest`. Implementations should call
    /// `token.check()` between chunks.
    fn download(&self, track: &Track, dest: &Path, token: &CancelToken) -> Result<FormatInfo>;

    /// Tracks related to `seed`; with no seed, general recommendations.
    fn related_tracks(&self, seed: Option<&Track>) -> Result<Vec<Track>>;
}
