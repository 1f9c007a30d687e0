use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Overrides the log directory (default `~/.portico/logs`).
pub const LOG_DIR_ENV: &str = "PORTICO_LOG_DIR";

pub fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".portico/logs")
}

/// Install the process subscriber. Keep the returned guard alive until exit,
/// dropping it flushes the file writer.
pub fn init_logging(component: &str, to_stderr: bool) -> WorkerGuard {
    let directory = log_dir();
    if let Err(err) = std::fs::create_dir_all(&directory) {
        eprintln!("Cannot create log directory {}: {err}", directory.display());
    }

    // One file per component and day, e.g. `serve.2026-10-15`.
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&directory, component));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let console = to_stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file)
        .with(console)
        .init();
    guard
}
