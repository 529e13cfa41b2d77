use std::path::Path;

use routegrid_core::error::ErrorCategory;
use routegrid_core::{
    Aggregator, HeadlessHost, TableConfig, TracingObserver, VirtualTableManager, WorkerStrategy,
};

/// Everything a REPL command can touch.
pub struct CliContext {
    pub manager: VirtualTableManager<HeadlessHost>,
    pub aggregator: Aggregator<WorkerStrategy>,
}

impl CliContext {
    /// Build the context from `config_path` (created with defaults if
    /// missing) or from the built-in defaults.
    ///
    /// Must run inside a tokio runtime: the worker's reader task is spawned
    /// on it.
    pub fn new(config_path: Option<&Path>) -> Self {
        let config = match config_path.map(TableConfig::load) {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                tracing::warn!(category = %ErrorCategory::Config, error = %e, "Using default config");
                TableConfig::default()
            }
            None => TableConfig::default(),
        };
        Self::with_config(config)
    }

    pub fn with_config(config: TableConfig) -> Self {
        let aggregator = match config.worker_path.as_deref() {
            Some(path) if path.exists() => match WorkerStrategy::spawn(path, config.worker_timeout()) {
                Ok(worker) => Aggregator::with_primary(worker),
                Err(e) => {
                    tracing::warn!(category = %ErrorCategory::Worker, error = %e, "Aggregating in-process");
                    Aggregator::local()
                }
            },
            Some(path) => {
                tracing::info!(path = %path.display(), "No worker binary, aggregating in-process");
                Aggregator::local()
            }
            None => Aggregator::local(),
        };

        let mut host = HeadlessHost::new();
        host.viewport_height = config.viewport_height;
        host.row_height = Some(config.row_height);

        let mut manager = VirtualTableManager::new(host, config);
        manager.subscribe(Box::new(TracingObserver));
        manager.initialize();
        Self { manager, aggregator }
    }
}
