//! # Logging Initialization
//!
//! One-time setup of the `tracing` subscriber for the `bio_exec` binary and tests.
//!
//! - **Environment filter**: `RUST_LOG` wins; otherwise `<level>,bio_exec=debug`.
//! - **File logging (default)**: daily rolling `bio_exec.log` in the platform cache
//!   directory (via `directories`), non-blocking, no ANSI colors.
//! - **Stderr logging**: when file logging is off, or when the cache directory cannot be
//!   determined or written, logs go to stderr with ANSI colors.
//!
//! Logs never go to stdout; the CLI prints JSON there.

use anyhow::Result;
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Initialize the global subscriber. Later calls are no-ops.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},bio_exec=debug")));

        if log_to_file && let Some(proj_dirs) = ProjectDirs::from("org", "BioMcp", "bio_exec") {
            let log_dir = proj_dirs.cache_dir();

            // tracing_appender::rolling::daily panics on permission errors.
            let file_appender_result = if can_write(log_dir) {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    tracing_appender::rolling::daily(log_dir, "bio_exec.log")
                }))
            } else {
                Err(Box::new("Cannot write to log directory") as Box<dyn std::any::Any + Send>)
            };

            if let Ok(file_appender) = file_appender_result {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false));
                if subscriber.try_init().is_ok() {
                    // Leaked so buffered lines are flushed at exit.
                    Box::leak(Box::new(guard));
                }
                return;
            }
        }

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .try_init();
    });

    Ok(())
}

/// Create `dir` if needed and check that a file can be written in it.
fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".bio_exec_log_test");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
