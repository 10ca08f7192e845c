//! Turning tracks into playable sources.
//!
//! [`TrackResolver`] wraps a [`MediaBackend`] with the fallback and retry
//! policy: prefer a direct stream, fall back to a full download into a
//! temporary file, retry transient failures with backoff, never retry
//! permanent ones. It is always called from inside a dispatched task.

mod backend;
mod format;
mod retry;

pub use backend::{MediaBackend, StreamFormat, StreamLookup};
pub use format::best_audio_format;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResolverSettings;
use crate::dispatch::CancelToken;
use crate::error::{Error, Result};
use crate::track::{FormatInfo, ResolvedSource, Track};

use retry::{backoff_for, sleep_cancellable};

#[derive(Debug, Clone)]
pub struct ResolverPolicy {
    /// Extra attempts after a transient network failure.
    pub max_retries: u32,
    pub backoff: Duration,
    /// Extra attempts after a failed download.
    pub download_retries: u32,
    pub download_dir: PathBuf,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(250),
            download_retries: 1,
            download_dir: std::env::temp_dir(),
        }
    }
}

impl From<&ResolverSettings> for ResolverPolicy {
    fn from(s: &ResolverSettings) -> Self {
        Self {
            max_retries: s.max_retries,
            backoff: Duration::from_millis(s.backoff_ms),
            download_retries: s.download_retries,
            download_dir: s
                .download_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

pub struct TrackResolver {
    backend: Arc<dyn MediaBackend>,
    policy: ResolverPolicy,
}

impl TrackResolver {
    pub fn new(backend: Arc<dyn MediaBackend>, policy: ResolverPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    /// Resolve `track` into a stream locator or, failing that, a downloaded
    /// local file.
    pub fn resolve(&self, track: &Track, token: &CancelToken) -> Result<ResolvedSource> {
        let lookup = self.with_retries("lookup", token, || self.backend.lookup_stream(track))?;

        if let StreamLookup::Formats(formats) = &lookup {
            if let Some(best) = best_audio_format(formats) {
                tracing::info!(
                    track_id = %track.id,
                    format_id = %best.format_id,
                    "resolved stream locator"
                );
                let url = best.url.clone().unwrap_or_default();
                return Ok(ResolvedSource::stream(track.id.clone(), url, format_info(best)));
            }
        }

        tracing::info!(track_id = %track.id, "no streamable format, downloading");
        self.download(track, token)
    }

    pub fn related(&self, seed: Option<&Track>, token: &CancelToken) -> Result<Vec<Track>> {
        let tracks = self.with_retries("related", token, || self.backend.related_tracks(seed))?;
        Ok(tracks.into_iter().filter(Track::is_valid).collect())
    }

    pub fn search(&self, query: &str, page: usize, token: &CancelToken) -> Result<Vec<Track>> {
        let tracks = self.with_retries("search", token, || self.backend.search(query, page))?;
        Ok(tracks.into_iter().filter(Track::is_valid).collect())
    }

    fn download(&self, track: &Track, token: &CancelToken) -> Result<ResolvedSource> {
        let mut attempt = 0;
        loop {
            token.check()?;
            let dest = tempfile::Builder::new()
                .prefix("cadenza_")
                .suffix(".part")
                .tempfile_in(&self.policy.download_dir)
                .map_err(|e| Error::Download(format!("cannot create temporary file: {e}")))?
                .into_temp_path();

            // `dest` is removed on every early return below.
            let outcome = self
                .with_retries("download", token, || self.backend.download(track, &dest, token))
                .and_then(|format| token.check().map(|_| format));

            match outcome {
                Ok(format) => {
                    tracing::info!(
                        track_id = %track.id,
                        path = %dest.display(),
                        "download complete"
                    );
                    return Ok(ResolvedSource::local_file(track.id.clone(), dest, format));
                }
                Err(e) if e.is_retryable() && attempt < self.policy.download_retries => {
                    tracing::warn!(
                        track_id = %track.id,
                        attempt,
                        error = %e,
                        "download failed, retrying"
                    );
                    drop(dest);
                    sleep_cancellable(backoff_for(self.policy.backoff, attempt), token)?;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(track_id = %track.id, error = %e, "download abandoned");
                    return Err(e);
                }
            }
        }
    }

    fn with_retries<T>(
        &self,
        what: &str,
        token: &CancelToken,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            token.check()?;
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = backoff_for(self.policy.backoff, attempt);
                    tracing::warn!(
                        operation = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    sleep_cancellable(delay, token)?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn format_info(f: &StreamFormat) -> FormatInfo {
    FormatInfo {
        format_id: Some(f.format_id.clone()),
        codec: f.audio_codec.clone(),
        bitrate_kbps: f.audio_bitrate.or(f.total_bitrate),
        extension: f.extension.clone(),
        duration_seconds: f.duration_seconds,
    }
}

#[cfg(test)]
mod tests;
