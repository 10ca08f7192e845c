//! Crate-wide error type.
//!
//! Task failures travel inside completion messages as values of this type;
//! they are never thrown across a thread boundary.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Network hiccup worth retrying (timeouts, connection resets, 5xx).
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Content unavailable or no compatible format; never retried.
    #[error("cannot resolve track: {0}")]
    PermanentResolution(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("playback error: {0}")]
    SinkPlayback(String),

    #[error("could not persist {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("task was cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a retry policy may try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Download(_))
    }

    /// Short description suitable for a status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::TransientNetwork(_) => "Network problem, please try again".to_string(),
            Self::PermanentResolution(msg) => format!("Track unavailable: {msg}"),
            Self::Download(_) => "Download failed".to_string(),
            Self::SinkPlayback(msg) => format!("Playback error: {msg}"),
            Self::Persistence { path, .. } => format!("Could not save {}", path.display()),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
