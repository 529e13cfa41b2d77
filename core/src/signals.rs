//! In-process signals between the table and the rest of the page

use routegrid_types::TableState;

use crate::expansion::ExpansionChange;

#[derive(Debug, Clone, PartialEq)]
pub enum TableSignal {
    /// Published by the manager for every effective expand/collapse.
    ExpansionChanged(ExpansionChange),
    /// Filters or sort changed. Carries the new snapshot.
    TableStateChanged(TableState),
    ReverseModeChanged { reverse: bool },
    YVisibilityChanged { visible: bool },
}

impl TableSignal {
    pub fn name(&self) -> &'static str {
        match self {
            TableSignal::ExpansionChanged(_) => "expansion_changed",
            TableSignal::TableStateChanged(_) => "table_state_changed",
            TableSignal::ReverseModeChanged { .. } => "reverse_mode_changed",
            TableSignal::YVisibilityChanged { .. } => "y_visibility_changed",
        }
    }
}

pub trait SignalHandler {
    fn handle_signal(&mut self, signal: &TableSignal);

    /// Handle multiple signals (default implementation calls handle_signal for each)
    fn handle_signals(&mut self, signals: &[TableSignal]) {
        for signal in signals {
            self.handle_signal(signal);
        }
    }
}

/// Logs every signal it sees at debug level.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl SignalHandler for TracingObserver {
    fn handle_signal(&mut self, signal: &TableSignal) {
        match signal {
            TableSignal::ExpansionChanged(change) => {
                tracing::debug!(level = ?change.level, group_id = %change.id, expanded = change.expanded, "Expansion changed")
            }
            other => tracing::debug!(signal = other.name(), "Table signal"),
        }
    }
}
