//! Error types for the table engine
//!
//! Nothing here is fatal to the table: worker errors fall back to local
//! aggregation and config errors fall back to defaults. The types exist so
//! the fallback paths can log what went wrong.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors talking to the aggregation worker process
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn aggregation worker {path}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("aggregation worker io failed")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode worker message")]
    Codec(#[from] serde_json::Error),

    #[error("aggregation worker timed out after {0:?}")]
    Timeout(Duration),

    #[error("aggregation worker is not running")]
    Closed,

    #[error("aggregation worker reported: {0}")]
    Remote(String),

    #[error("worker response did not match the request type")]
    UnexpectedResult,
}

/// Errors loading or validating the table configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: confy::ConfyError,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Area of the table a recovered failure came from. Logged as the
/// `category` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Table,
    Render,
    Scroll,
    Ui,
    State,
    Worker,
    Config,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Table => "table",
            ErrorCategory::Render => "render",
            ErrorCategory::Scroll => "scroll",
            ErrorCategory::Ui => "ui",
            ErrorCategory::State => "state",
            ErrorCategory::Worker => "worker",
            ErrorCategory::Config => "config",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
