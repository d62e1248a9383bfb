//! Subscriber setup: human-readable stderr plus a JSON log file.

use sol_core::SolError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Build a filter from a plain level (`info`) or a full directive list
/// (`sol_core=debug,warn`).
pub fn level_filter(level: &str) -> Result<EnvFilter, SolError> {
    let invalid = |e: &dyn std::fmt::Display| {
        SolError::config(format!("invalid log level '{level}': {e}"))
    };
    // A bare word would otherwise be read as a target name.
    if !level.contains(['=', ',']) {
        level.trim().parse::<LevelFilter>().map_err(|e| invalid(&e))?;
    }
    EnvFilter::try_new(level).map_err(|e| invalid(&e))
}

/// Install the global subscriber. Keep the returned guard alive until exit so the
/// file writer gets flushed.
pub fn init(level: &str, log_file: &Path) -> Result<WorkerGuard, SolError> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .with_filter(level_filter(level)?);

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file.file_name().ok_or_else(|| {
        SolError::config(format!("log path {} has no file name", log_file.display()))
    })?;
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(level_filter(level)?);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| SolError::config(format!("logging already initialised: {e}")))?;
    Ok(guard)
}
