pub mod adapter;
pub mod aggregation;
pub mod cache;
pub mod config;
pub mod error;
pub mod expansion;
pub mod filter;
pub mod format;
pub mod header;
pub mod host;
pub mod index;
pub mod manager;
pub mod scheduler;
pub mod signals;
pub mod sort;
pub mod visible;
pub mod window;

// Re-exports for convenience
pub use adapter::{RenderedRow, RowView, render_table_row};
pub use aggregation::{AggregationStrategy, Aggregator, LocalStrategy, WorkerClient, WorkerStrategy};
pub use config::TableConfig;
pub use error::{ConfigError, ErrorCategory, WorkerError};
pub use expansion::{ExpansionChange, ExpansionLevel, ExpansionState};
pub use host::{Anchor, HeadlessHost, TableHost};
pub use index::{GroupIndexEntry, HierarchicalIndex, TableData};
pub use manager::{BulkOp, Lifecycle, LivePayload, ManagerStatus, ViewState, VirtualTableManager};
pub use signals::{SignalHandler, TableSignal, TracingObserver};
pub use visible::VisibleRow;
pub use window::{VirtualWindow, WindowRange};
