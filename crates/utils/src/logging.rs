//! provides logging helpers

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Directory for rolling log files, stderr only when unset.
pub const LOG_PATH_ENV_VAR: &str = "POWER_LOG_PATH";

const LOG_FILE_PREFIX: &str = "power-controller.log";

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// initiate the global tracing subscriber
///
/// Logs always go to stderr. When [`LOG_PATH_ENV_VAR`] names a directory the
/// same events are also written to a daily rotated file there; keep the
/// returned guard alive for as long as the process logs.
pub fn init() -> Option<WorkerGuard> {
    let stderr_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let log_dir = env::var(LOG_PATH_ENV_VAR).ok();
    let file_output = log_dir.as_deref().and_then(|dir| {
        match rolling_file_writer(Path::new(dir)) {
            Ok(output) => Some(output),
            Err(e) => {
                eprintln!("failed to open log directory {dir}: {e}, logging to stderr only");
                None
            }
        }
    });

    match file_output {
        Some((writer, guard)) => {
            let file_layer = layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            registry().with(stderr_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            registry().with(stderr_layer).init();
            None
        }
    }
}

fn rolling_file_writer(
    dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), String> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(3)
        .build(dir)
        .map_err(|e| e.to_string())?;

    Ok(tracing_appender::non_blocking(appender))
}
