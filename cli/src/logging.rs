//! Logging for the REPL
//!
//! Console output goes to stderr so it never interleaves with command
//! output. With a log directory, records are also written to
//! `routegrid.log` there with 10 MB size-based rotation. Set
//! `DEBUG_LOGGING=1` for debug output from the routegrid crates; `RUST_LOG`
//! overrides both.

use std::path::Path;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE: &str = "routegrid.log";
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

fn filter() -> EnvFilter {
    let debug_logging = std::env::var("DEBUG_LOGGING").is_ok();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug_logging {
            "warn,routegrid_core=debug,routegrid_cli=debug"
        } else {
            "warn"
        })
    })
}

/// Initialize console logging, plus file logging when `log_dir` is given.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the program. `None` means console-only logging.
pub fn init(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let Some(log_dir) = log_dir else {
        init_console_only();
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        // Subscriber not installed yet
        eprintln!("Failed to create log directory {}: {e}, logging to console only", log_dir.display());
        init_console_only();
        return None;
    }

    let log_path = log_dir.join(LOG_FILE);
    let appender = match BasicRollingFileAppender::new(
        &log_path,
        RollingConditionBasic::new().max_size(MAX_LOG_SIZE),
        1,
    ) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}, logging to console only", log_path.display());
            init_console_only();
            return None;
        }
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!(log_file = %log_path.display(), "Logging initialized");
    Some(guard)
}

fn init_console_only() {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry().with(filter()).with(console_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logging_creates_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let guard = init(Some(&log_dir));

        assert!(guard.is_some());
        assert!(log_dir.join(LOG_FILE).exists());
    }
}
