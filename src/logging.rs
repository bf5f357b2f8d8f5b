use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "tutor-backend.log";
const FALLBACK_FILTER: &str = "info";

/// Keeps the non-blocking file writer flushing until dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// An unparseable `RUST_LOG` falls back to `info` instead of silencing output.
pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

fn file_writer(dir: &Path) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("failed to create log directory {}: {err}", dir.display());
        return None;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber: stdout always, plus a daily-rolling file
/// when `config.log_dir` is set and writable.
pub fn init_tracing(config: &Config) -> Option<FileLogGuard> {
    let (file_layer, guard) = match config.log_dir.as_deref().and_then(file_writer) {
        Some((writer, guard)) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false).with_target(true)),
            Some(FileLogGuard { _guard: guard }),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}
