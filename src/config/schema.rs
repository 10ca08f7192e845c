use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::queue::RepeatMode;

/// Top-level engine settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/cadenza/config.toml` or
/// `~/.config/cadenza/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `CADENZA__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub dispatcher: DispatcherSettings,
    pub resolver: ResolverSettings,
    pub playback: PlaybackSettings,
    pub thumbnails: ThumbnailSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Number of worker threads running blocking tasks.
    pub pool_size: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self { pool_size: 4 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Extra attempts after a transient network failure.
    pub max_retries: u32,
    /// Initial backoff between retries (milliseconds); doubles per attempt.
    pub backoff_ms: u64,
    /// Extra attempts after a failed download.
    pub download_retries: u32,
    /// Where downloads are written. Defaults to the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 250,
            download_retries: 1,
            download_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Initial volume in `[0, 1]`.
    pub volume: f64,
    /// Initial speed factor in `[0.5, 2]`.
    pub speed: f64,
    /// Whether shuffle starts enabled.
    pub shuffle: bool,
    /// Default repeat mode.
    pub repeat: RepeatSetting,
    /// Fetch related tracks when the queue runs out.
    pub auto_refill: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 0.68,
            speed: 1.0,
            shuffle: false,
            repeat: RepeatSetting::Off,
            auto_refill: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatSetting {
    #[serde(alias = "none", alias = "no-repeat", alias = "no_repeat")]
    Off,
    #[serde(alias = "repeat-all", alias = "repeat_all", alias = "loop-all")]
    All,
    #[serde(alias = "repeat-one", alias = "repeat_one", alias = "loop-one")]
    One,
}

impl From<RepeatSetting> for RepeatMode {
    fn from(s: RepeatSetting) -> Self {
        match s {
            RepeatSetting::Off => RepeatMode::Off,
            RepeatSetting::All => RepeatMode::All,
            RepeatSetting::One => RepeatMode::One,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Directory for cached thumbnails. Defaults to `<tmp>/cadenza_thumbs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Entries kept before least-recently-used eviction.
    pub max_entries: usize,
    /// HTTP timeout for one fetch (seconds).
    pub timeout_secs: u64,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_entries: 256,
            timeout_secs: 8,
        }
    }
}

impl ThumbnailSettings {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cadenza_thumbs"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base directory for the files below. Defaults to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub playlists_file: String,
    pub history_file: String,
    /// Maximum number of remembered searches.
    pub history_limit: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            playlists_file: "playlists.json".to_string(),
            history_file: "search_history.json".to_string(),
            history_limit: 50,
        }
    }
}

impl StorageSettings {
    fn base(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn playlists_path(&self) -> PathBuf {
        self.base().join(&self.playlists_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.base().join(&self.history_file)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub directive: String,
    /// Write daily-rotated log files here instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directive: "cadenza=info,warn".to_string(),
            log_dir: None,
        }
    }
}
