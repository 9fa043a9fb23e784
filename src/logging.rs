//! Tracing setup: stderr always, plus an optional append-only log file that
//! receives the same events (including the `relnotes::llm` audit records).

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info";

/// Open `path` for appending, creating parent directories
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Registry with a stderr layer and, when given, a plain-text file layer
pub fn subscriber(filter: EnvFilter, log_file: Option<File>) -> impl Subscriber + Send + Sync {
    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
}

/// Install the global subscriber; `RUST_LOG` overrides the default filter
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file = log_file.map(open_log_file).transpose()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    subscriber(filter, file)
        .try_init()
        .context("Failed to install tracing subscriber")
}
