//! Global tracing subscriber.
//!
//! Everything allowed by `RUST_LOG` (default `info`) goes to the log file as
//! plain text. Warnings and errors are echoed to stderr as well, so failures
//! show up next to the console prompts.

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::Path,
    sync::Mutex,
};

use tracing::warn;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Opens `path` for appending, creating missing parent directories.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber writing to `log_file`. When the file
/// cannot be opened, stderr takes the full log instead.
pub fn init_logging(log_file: &Path) {
    match open_log_file(log_file) {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(env_filter());
            let stderr_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_filter(LevelFilter::WARN);
            tracing_subscriber::registry()
                .with(file_layer)
                .with(stderr_layer)
                .init();
        }
        Err(err) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(io::stderr)
                .init();
            warn!(path = %log_file.display(), "log file unavailable: {}", err);
        }
    }
}
