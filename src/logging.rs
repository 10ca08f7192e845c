//! Tracing setup for hosts embedding the engine.
//!
//! Logs go to stderr by default. With `logging.log_dir` set they are written
//! to `<log_dir>/cadenza.YYYY-MM-DD.log` with daily rotation instead, which is
//! what a terminal UI host wants. `RUST_LOG` overrides the configured filter.

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

const LOG_FILE_PREFIX: &str = "cadenza";

/// Install the global subscriber.
///
/// Keep the returned guard alive for as long as file logging should flush.
/// A second call leaves the existing subscriber in place.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(settings);

    let Some(dir) = settings.log_dir.as_ref() else {
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init();
        if installed.is_err() {
            tracing::debug!("global subscriber already installed");
        }
        return Ok(None);
    };

    fs::create_dir_all(dir).map_err(|e| Error::persistence(dir, e))?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init();

    match installed {
        Ok(()) => {
            tracing::info!(dir = %dir.display(), "logging to file");
            Ok(Some(guard))
        }
        Err(_) => {
            tracing::debug!("global subscriber already installed");
            Ok(None)
        }
    }
}

fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.directive))
        .unwrap_or_else(|_| EnvFilter::new(LoggingSettings::default().directive))
}
