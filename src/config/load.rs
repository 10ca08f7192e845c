use std::{env, fs, path::Path, path::PathBuf};

use super::schema::Settings;
use crate::error::{Error, Result};
use crate::playback::{MAX_SPEED, MIN_SPEED};

/// Configuration loading helpers.
///
/// `Settings::load` reads an optional config file, lets environment variables
/// (prefix `CADENZA__`) override it and falls back to struct defaults.
impl Settings {
    /// Load settings from environment and optional config file.
    pub fn load() -> std::result::Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("CADENZA")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidArgument(msg.to_string()));
        if self.dispatcher.pool_size == 0 {
            return invalid("dispatcher.pool_size must be >= 1");
        }
        if self.storage.history_limit == 0 {
            return invalid("storage.history_limit must be >= 1");
        }
        if self.thumbnails.max_entries == 0 {
            return invalid("thumbnails.max_entries must be >= 1");
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.playback.speed) {
            return invalid("playback.speed must be within [0.5, 2.0]");
        }
        if !(0.0..=1.0).contains(&self.playback.volume) {
            return invalid("playback.volume must be within [0, 1]");
        }
        Ok(())
    }

    /// Write these settings as TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::persistence(path, e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, e))?;
        }
        fs::write(path, text).map_err(|e| Error::persistence(path, e))
    }
}

/// Resolve the config path from `CADENZA_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("CADENZA_CONFIG_PATH") {
        let p = PathBuf::from(p);
        return Some(p);
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/cadenza/config.toml`
/// or `~/.config/cadenza/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|d| d.join("cadenza").join("config.toml"))
}
