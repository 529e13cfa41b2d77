//! Table configuration
//!
//! Loaded from a TOML file with confy. A missing file is created with the
//! defaults; a present file may omit any field.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default path of the aggregation worker binary, relative to the working directory.
pub const DEFAULT_WORKER_PATH: &str = "routegrid-aggregation-worker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Estimated row height in px until a real row is measured.
    pub row_height: f64,
    /// Rows rendered above and below the viewport.
    pub buffer_size: usize,
    /// Scroll container height in px.
    pub viewport_height: f64,
    pub refresh_debounce_ms: u64,
    pub header_debounce_ms: u64,
    pub worker_timeout_ms: u64,
    /// Worker binary. `None` runs every aggregation in-process.
    pub worker_path: Option<PathBuf>,
    /// Scale the buffer with scroll speed.
    pub dynamic_buffer: bool,
    /// Never adopt measured row heights.
    pub fixed_row_height: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            row_height: 40.0,
            buffer_size: 5,
            viewport_height: 600.0,
            refresh_debounce_ms: 24,
            header_debounce_ms: 16,
            worker_timeout_ms: 10_000,
            worker_path: Some(PathBuf::from(DEFAULT_WORKER_PATH)),
            dynamic_buffer: true,
            fixed_row_height: false,
        }
    }
}

impl TableConfig {
    /// Load and validate a config file, writing the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = confy::load_path(path)
            .map_err(|source| ConfigError::Load { path: path.to_path_buf(), source })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded table config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.row_height.is_nan() || self.row_height <= 0.0 {
            return Err(ConfigError::Invalid { field: "row_height", reason: format!("must be positive, got {}", self.row_height) });
        }
        if self.viewport_height.is_nan() || self.viewport_height <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "viewport_height",
                reason: format!("must be positive, got {}", self.viewport_height),
            });
        }
        Ok(())
    }

    /// Copy with the buffer tuned for a dataset of `len` visible rows.
    pub fn optimized_for(&self, len: usize) -> Self {
        Self { buffer_size: optimized_buffer(self.buffer_size, len), ..self.clone() }
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    pub fn header_debounce(&self) -> Duration {
        Duration::from_millis(self.header_debounce_ms)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }
}

/// Larger datasets get a larger buffer, never more than 24 rows.
pub fn optimized_buffer(base: usize, len: usize) -> usize {
    if len > 5000 {
        base.clamp(16, 24)
    } else if len > 1000 {
        base.clamp(12, 16)
    } else {
        base.max(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_grows_with_data_size() {
        assert_eq!(optimized_buffer(5, 10), 10);
        assert_eq!(optimized_buffer(30, 10), 30);
        assert_eq!(optimized_buffer(5, 1001), 12);
        assert_eq!(optimized_buffer(20, 1001), 16);
        assert_eq!(optimized_buffer(5, 5001), 16);
        assert_eq!(optimized_buffer(40, 5001), 24);
    }

    #[test]
    fn optimized_for_keeps_other_fields() {
        let config = TableConfig { row_height: 32.0, ..Default::default() };
        let tuned = config.optimized_for(2000);
        assert_eq!(tuned.buffer_size, 12);
        assert_eq!(tuned.row_height, 32.0);
    }

    #[test]
    fn validate_rejects_non_positive_sizes() {
        let bad = TableConfig { row_height: 0.0, ..Default::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid { field: "row_height", .. })));

        let bad = TableConfig { viewport_height: f64::NAN, ..Default::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid { field: "viewport_height", .. })));

        assert!(TableConfig::default().validate().is_ok());
    }

    #[test]
    fn load_creates_defaults_and_reads_overrides() {
        let dir = tempfile::tempdir().unwrap();

        let fresh = dir.path().join("fresh.toml");
        assert_eq!(TableConfig::load(&fresh).unwrap(), TableConfig::default());
        assert!(fresh.exists());

        let custom = dir.path().join("custom.toml");
        std::fs::write(&custom, "row_height = 28.0\nbuffer_size = 8\ndynamic_buffer = false\n").unwrap();
        let config = TableConfig::load(&custom).unwrap();
        assert_eq!(config.row_height, 28.0);
        assert_eq!(config.buffer_size, 8);
        assert!(!config.dynamic_buffer);
        assert_eq!(config.refresh_debounce_ms, 24);
    }

    #[test]
    fn load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "viewport_height = -1.0\n").unwrap();
        assert!(matches!(TableConfig::load(&path), Err(ConfigError::Invalid { .. })));
    }
}
