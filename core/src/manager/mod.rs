//! Virtual table manager
//!
//! Owns every piece of table state and drives the host:
//!
//! - lifecycle (`Uninitialized → Active → Destroyed`)
//! - the dataset, its index and the per-signature caches
//! - expansion, bulk show/hide (queued until data arrives)
//! - the virtual window and the rendered slice
//! - debounced refresh on state signals and per-frame scroll syncs
//! - the floating header
//!
//! Nothing here blocks or locks; time enters through explicit `now` values
//! in [`tick`](VirtualTableManager::tick) and
//! [`on_frame`](VirtualTableManager::on_frame).

use std::sync::Arc;

use routegrid_types::{FooterAggregates, MetricRow, RowLevel, TableState, ZoomRange};
use serde::Serialize;
use tokio::time::Instant;

use crate::adapter::{RenderedRow, RowView, render_table_row, toggle_label};
use crate::aggregation::{AggregationStrategy, Aggregator, compute_aggregates};
use crate::cache::{CacheSet, Signature};
use crate::config::TableConfig;
use crate::error::ErrorCategory;
use crate::expansion::ExpansionState;
use crate::header::FloatingHeader;
use crate::host::{Anchor, TableHost};
use crate::index::{HierarchicalIndex, TableData};
use crate::scheduler::{Debouncer, FrameScheduler};
use crate::signals::{SignalHandler, TableSignal};
use crate::sort::SortEngine;
use crate::visible::{Selector, VisibleRow};
use crate::window::{VirtualWindow, WindowRange, WindowStatus};


pub const SHOW_ALL_LABEL: &str = "Show All";
pub const HIDE_ALL_LABEL: &str = "Hide All";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Active,
    Destroyed,
}

/// Show All / Hide All requested before the data was ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOp {
    Expand,
    Collapse,
}

/// Page-level state the table reacts to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub table: TableState,
    pub reverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagerStatus {
    pub active: bool,
    /// Raw rows across all three levels.
    pub data_count: usize,
    pub visible_rows: usize,
    pub window: WindowStatus,
}

/// What the page shows next to the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePayload {
    pub visible_rows: usize,
    pub aggregates: FooterAggregates,
}

pub struct VirtualTableManager<H: TableHost> {
    host: H,
    config: TableConfig,
    lifecycle: Lifecycle,
    view: ViewState,
    expansion: ExpansionState,

    /// Main rows as handed in, before sorting.
    raw_main: Arc<Vec<MetricRow>>,
    /// `None` until the first render.
    data: Option<TableData>,
    index: HierarchicalIndex,
    caches: CacheSet,
    sorter: SortEngine,
    window: VirtualWindow,
    visible: Vec<VisibleRow>,
    footer: FooterAggregates,
    /// Dataset from before the first zoom, restored by `reset_zoom`.
    unzoomed: Option<TableData>,

    queued: Option<BulkOp>,
    header: FloatingHeader,
    refresh: Debouncer,
    header_resync: Debouncer,
    frame: FrameScheduler,
    pending_resort: bool,
    pending_reverse: bool,

    observers: Vec<Box<dyn SignalHandler>>,
}

impl<H: TableHost> VirtualTableManager<H> {
    pub fn new(host: H, config: TableConfig) -> Self {
        Self {
            window: VirtualWindow::new(&config),
            refresh: Debouncer::new(config.refresh_debounce()),
            header_resync: Debouncer::new(config.header_debounce()),
            host,
            config,
            lifecycle: Lifecycle::Uninitialized,
            view: ViewState::default(),
            expansion: ExpansionState::new(),
            raw_main: Arc::default(),
            data: None,
            index: HierarchicalIndex::default(),
            caches: CacheSet::default(),
            sorter: SortEngine::new(),
            visible: Vec::new(),
            footer: FooterAggregates::default(),
            unzoomed: None,
            queued: None,
            header: FloatingHeader::new(),
            frame: FrameScheduler::default(),
            pending_resort: false,
            pending_reverse: false,
            observers: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    pub fn data(&self) -> Option<&TableData> {
        self.data.as_ref()
    }

    pub fn index(&self) -> &HierarchicalIndex {
        &self.index
    }

    pub fn visible_rows(&self) -> &[VisibleRow] {
        &self.visible
    }

    pub fn queued_bulk_op(&self) -> Option<BulkOp> {
        self.queued
    }

    pub fn is_zoomed(&self) -> bool {
        self.unzoomed.is_some()
    }

    /// Register an observer for [`TableSignal::ExpansionChanged`].
    pub fn subscribe(&mut self, observer: Box<dyn SignalHandler>) {
        self.observers.push(observer);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Check the host anchors and become active. Stays uninitialized when
    /// any anchor is missing.
    pub fn initialize(&mut self) -> bool {
        match self.lifecycle {
            Lifecycle::Active => return true,
            Lifecycle::Destroyed => {
                tracing::warn!(category = %ErrorCategory::Table, "Initialize called after destroy");
                return false;
            }
            Lifecycle::Uninitialized => {}
        }

        let missing: Vec<Anchor> = Anchor::ALL.into_iter().filter(|a| !self.host.has_anchor(*a)).collect();
        if !missing.is_empty() {
            tracing::warn!(category = %ErrorCategory::Ui, ?missing, "Required table elements not found");
            return false;
        }

        self.window.set_viewport_height(self.host.viewport_height());
        self.lifecycle = Lifecycle::Active;
        tracing::info!("Virtual table initialized");
        true
    }

    /// Tear down the header, drop the dataset and turn every later call into
    /// a no-op.
    pub fn destroy(&mut self) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.header.unbind(&mut self.host);
        self.refresh.cancel();
        self.header_resync.cancel();
        self.frame.take();
        self.data = None;
        self.raw_main = Arc::default();
        self.unzoomed = None;
        self.index = HierarchicalIndex::default();
        self.caches.reset();
        self.sorter.clear();
        self.visible.clear();
        self.window.set_len(0);
        self.queued = None;
        self.lifecycle = Lifecycle::Destroyed;
        tracing::info!("Virtual table destroyed");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the dataset and render it. Clears any active zoom.
    pub fn render_virtual_table(&mut self, main: Vec<MetricRow>, peer: Vec<MetricRow>, hourly: Vec<MetricRow>) -> bool {
        if !self.is_active() {
            tracing::warn!(category = %ErrorCategory::Table, "Not active, cannot render");
            return false;
        }
        self.unzoomed = None;
        self.install(main, peer, hourly, None)
    }

    fn install(
        &mut self,
        main: Vec<MetricRow>,
        peer: Vec<MetricRow>,
        hourly: Vec<MetricRow>,
        footer: Option<FooterAggregates>,
    ) -> bool {
        self.raw_main = Arc::new(main);
        let sorted = self.sorter.sort_main_rows(&self.raw_main, &self.view.table.multi_sort);
        self.footer = footer.unwrap_or_else(|| compute_aggregates(&sorted));
        self.data = Some(TableData { main: sorted, peer: Arc::new(peer), hourly: Arc::new(hourly) });
        self.initialize_lazy_data();
        self.recompute_visible();
        self.render_window(Instant::now(), true);

        if let Some(op) = self.queued.take() {
            tracing::debug!(?op, "Running queued bulk operation");
            self.apply_bulk(op);
        }
        self.sync_expand_all_label();
        tracing::info!(
            main = self.raw_main.len(),
            visible = self.visible.len(),
            "Rendered virtual table"
        );
        true
    }

    /// Recompute the visible list and re-render, keeping the scroll position.
    pub fn refresh_virtual_table(&mut self) {
        if !self.is_active() || self.data.is_none() {
            return;
        }
        let scroll_top = self.host.scroll_top();
        self.recompute_visible();
        self.render_window(Instant::now(), true);
        self.sync_expand_all_label();
        self.host.set_scroll_top(scroll_top);
    }

    /// Rebuild the group index from the current rows and drop every cached
    /// filter result. Call after the rows change order.
    pub fn initialize_lazy_data(&mut self) {
        if let Some(data) = &self.data {
            self.index = HierarchicalIndex::build(data);
        }
        self.caches.reset();
    }

    fn resort(&mut self) {
        if let Some(data) = &mut self.data {
            data.main = self.sorter.sort_main_rows(&self.raw_main, &self.view.table.multi_sort);
        }
    }

    fn recompute_visible(&mut self) {
        let Some(data) = &self.data else {
            return;
        };
        let signature = Signature::from_state(&self.view.table);
        let mut selector = Selector::new(data, &self.index, &self.expansion, &signature, &mut self.caches);
        self.visible = selector.lazy_visible_data();
        self.window.set_len(self.visible.len());
    }

    /// Render the window for the host's scroll position. Returns false when
    /// the previous slice still covers the viewport.
    fn render_window(&mut self, now: Instant, force: bool) -> bool {
        let Some(range) = self.window.compute(self.host.scroll_top(), now, force) else {
            return false;
        };
        self.paint(range);

        if self.window.note_render()
            && let Some(measured) = self.host.measure_row_height()
            && self.window.adopt_measured_height(measured)
            && let Some(range) = self.window.compute(self.host.scroll_top(), now, true)
        {
            self.paint(range);
        }
        self.sync_header();
        true
    }

    fn paint(&mut self, range: WindowRange) {
        let Some(data) = &self.data else {
            return;
        };
        let rows = build_rows(data, &self.index, &self.expansion, &self.visible, range);
        if rows.len() != range.len() {
            tracing::error!(
                category = %ErrorCategory::Render,
                expected = range.len(),
                rendered = rows.len(),
                "Visible rows missing from dataset"
            );
        }
        self.host.set_spacer_height(range.spacer_height);
        self.host.render_rows(range.offset_top, rows);
    }

    fn sync_header(&mut self) {
        if self.header.sync(&mut self.host).is_none() {
            tracing::debug!(category = %ErrorCategory::Ui, "Floating header skipped, no table geometry");
        }
    }

    fn sync_expand_all_label(&mut self) {
        let label = if self.expansion.any_expanded() { HIDE_ALL_LABEL } else { SHOW_ALL_LABEL };
        self.host.set_expand_all_label(label);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expansion
    // ─────────────────────────────────────────────────────────────────────────

    /// Toggle the main or peer group behind a clicked button.
    pub fn handle_toggle(&mut self, group_id: &str) -> bool {
        if !self.is_active() || self.data.is_none() {
            return false;
        }
        let expanded = match self.index.level_of(group_id) {
            Some(RowLevel::Main) => {
                self.expansion.toggle_main(group_id);
                self.expansion.is_main_expanded(group_id)
            }
            Some(RowLevel::Peer) => {
                self.expansion.toggle_peer(group_id);
                self.expansion.is_peer_expanded(group_id)
            }
            Some(RowLevel::Hourly) | None => {
                tracing::debug!(group_id, "Toggle ignored, not an expandable group");
                return false;
            }
        };
        self.publish_expansion();
        self.refresh_virtual_table();
        self.host.set_toggle_label(group_id, toggle_label(expanded));
        true
    }

    /// Expand every main group (peers only). Queued until data is ready.
    pub fn show_all_rows(&mut self) {
        self.bulk(BulkOp::Expand);
    }

    /// Collapse everything. Queued until data is ready.
    pub fn hide_all_rows(&mut self) {
        self.bulk(BulkOp::Collapse);
    }

    fn bulk(&mut self, op: BulkOp) {
        if !self.is_active() {
            return;
        }
        if self.data.is_none() {
            tracing::debug!(?op, "Data not ready, queueing bulk operation");
            self.queued = Some(op);
            return;
        }
        self.apply_bulk(op);
    }

    fn apply_bulk(&mut self, op: BulkOp) {
        self.expansion.collapse_all();
        if op == BulkOp::Expand {
            self.expansion.expand_all_main(self.index.main_ids());
        }
        self.publish_expansion();
        self.recompute_visible();
        self.render_window(Instant::now(), true);
        self.host.set_expand_all_label(match op {
            BulkOp::Expand => HIDE_ALL_LABEL,
            BulkOp::Collapse => SHOW_ALL_LABEL,
        });
    }

    fn publish_expansion(&mut self) {
        let signals: Vec<TableSignal> = self
            .expansion
            .drain_changes()
            .into_iter()
            .map(TableSignal::ExpansionChanged)
            .collect();
        if signals.is_empty() {
            return;
        }
        for observer in &mut self.observers {
            observer.handle_signals(&signals);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Table state
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply new filters and sort immediately.
    pub fn set_table_state(&mut self, state: TableState) {
        if !self.is_active() {
            return;
        }
        self.view.table = state;
        self.resort();
        self.initialize_lazy_data();
        self.refresh_virtual_table();
    }

    /// Scroll so that visible row `index` sits at the top.
    pub fn scroll_to_row(&mut self, index: usize) {
        if !self.is_active() {
            return;
        }
        self.host.set_scroll_top(self.window.offset_of(index));
        self.render_window(Instant::now(), false);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timing
    // ─────────────────────────────────────────────────────────────────────────

    /// Debounce a refresh. Repeated calls push the deadline out.
    pub fn schedule_refresh(&mut self, now: Instant) {
        if self.is_active() {
            self.refresh.schedule(now);
        }
    }

    /// Run whatever debounced work is due. Returns true if anything ran.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.is_active() {
            return false;
        }
        let mut ran = false;
        if self.refresh.poll(now) {
            if std::mem::take(&mut self.pending_reverse) {
                self.expansion.collapse_all();
                self.publish_expansion();
                self.host.set_expand_all_label(SHOW_ALL_LABEL);
                self.initialize_lazy_data();
            }
            if std::mem::take(&mut self.pending_resort) {
                self.resort();
                self.initialize_lazy_data();
            }
            self.refresh_virtual_table();
            ran = true;
        }
        if self.header_resync.poll(now) {
            self.sync_header();
            ran = true;
        }
        ran
    }

    /// Earliest instant at which [`tick`](Self::tick) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.refresh.deadline(), self.header_resync.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Scroll event. Returns false when a frame is already pending.
    pub fn on_scroll(&mut self) -> bool {
        self.is_active() && self.frame.request()
    }

    /// Viewport resized.
    pub fn on_resize(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.window.set_viewport_height(self.host.viewport_height());
        self.frame.request()
    }

    /// Animation frame. Renders the window if a scroll or resize is pending.
    pub fn on_frame(&mut self, now: Instant) -> bool {
        if !self.is_active() || !self.frame.take() {
            return false;
        }
        if !self.render_window(now, false) {
            // Horizontal scrolls still move the floating header.
            self.sync_header();
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Zoom
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-aggregate the unzoomed hourly rows for `range` and render the
    /// result.
    pub async fn apply_zoom<S: AggregationStrategy>(&mut self, aggregator: &Aggregator<S>, range: ZoomRange) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some(data) = &self.data else {
            tracing::warn!(category = %ErrorCategory::State, "Zoom requested before data was loaded");
            return false;
        };
        let original = self
            .unzoomed
            .get_or_insert_with(|| TableData { main: self.raw_main.clone(), ..data.clone() });
        let hourly = original.hourly.as_ref().clone();

        let result = aggregator.full_reaggregation(hourly, range).await;
        tracing::info!(
            from_ts = range.from_ts,
            to_ts = range.to_ts,
            hourly = result.hourly_rows.len(),
            main = result.main_rows.len(),
            "Applied zoom"
        );
        // The dataset can be torn down while the aggregation runs.
        if !self.is_active() {
            return false;
        }
        self.install(result.main_rows, result.peer_rows, result.hourly_rows, Some(result.aggregates))
    }

    /// Restore the dataset from before the first zoom.
    pub fn reset_zoom(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some(original) = self.unzoomed.take() else {
            return false;
        };
        self.install(
            Arc::unwrap_or_clone(original.main),
            Arc::unwrap_or_clone(original.peer),
            Arc::unwrap_or_clone(original.hourly),
            None,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reporting
    // ─────────────────────────────────────────────────────────────────────────

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            active: self.is_active(),
            data_count: self.data.as_ref().map_or(0, TableData::total_count),
            visible_rows: self.visible.len(),
            window: self.window.status(),
        }
    }

    pub fn live_payload(&self) -> LivePayload {
        LivePayload { visible_rows: self.visible.len(), aggregates: self.footer }
    }
}

impl<H: TableHost> SignalHandler for VirtualTableManager<H> {
    fn handle_signal(&mut self, signal: &TableSignal) {
        if !self.is_active() {
            return;
        }
        let now = Instant::now();
        match signal {
            // Outbound only.
            TableSignal::ExpansionChanged(_) => {}
            TableSignal::TableStateChanged(state) => {
                self.view.table = state.clone();
                self.pending_resort = true;
                self.refresh.schedule(now);
            }
            TableSignal::ReverseModeChanged { reverse } => {
                self.view.reverse = *reverse;
                self.pending_reverse = true;
                self.refresh.schedule(now);
            }
            TableSignal::YVisibilityChanged { visible } => {
                self.view.table.y_columns_visible = *visible;
                self.header_resync.schedule(now);
            }
        }
    }
}

fn build_rows(
    data: &TableData,
    index: &HierarchicalIndex,
    expansion: &ExpansionState,
    visible: &[VisibleRow],
    range: WindowRange,
) -> Vec<RenderedRow> {
    let slice = visible.get(range.start..range.end).unwrap_or_default();
    slice
        .iter()
        .enumerate()
        .filter_map(|(offset, v)| {
            let row = v.row(data)?;
            let entry = index.entry(v.level, v.index);
            let expanded = match v.level {
                RowLevel::Main => expansion.is_main_expanded(&v.group_id),
                RowLevel::Peer => expansion.is_peer_expanded(&v.group_id),
                RowLevel::Hourly => false,
            };
            let view = RowView {
                level: v.level,
                group_id: &v.group_id,
                row,
                date: entry.and_then(|e| e.date.as_deref()),
                expanded,
            };
            Some(RenderedRow {
                key: v.group_id.clone(),
                class: v.level.row_class(),
                parent_id: entry.and_then(|e| e.parent_id.clone()),
                virtual_index: range.start + offset,
                cells: render_table_row(&view),
            })
        })
        .collect()
}
