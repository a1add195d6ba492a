//! Application logging
//!
//! Human-readable output goes to stderr; the same events are appended to a
//! daily file under ~/.config/pssgfont/logs/ when that directory is usable.

use crate::core::config_file::ConfigFile;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "pssgfont.log";

/// Default filter when `RUST_LOG` is not set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "pssgfont=debug"
    } else {
        "pssgfont=info"
    }
}

fn file_writer(logs_dir: &Path) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber
///
/// The returned guard flushes the log file when dropped; keep it alive for
/// the whole run.
pub fn init(verbose: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let (file_layer, guard) = match file_writer(&ConfigFile::logs_dir()) {
        Ok((writer, guard)) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        Err(e) => {
            eprintln!("File logging disabled: {e}");
            (None, None)
        }
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
    }

    tracing::debug!(
        "Logging started at {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    guard
}
