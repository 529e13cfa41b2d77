//! Visible row list: filters, expansion and sort applied over the index
//!
//! Rows are referenced by `(level, raw index)` so nothing is copied until the
//! adapter renders the rows inside the virtual window.

use std::sync::Arc;

use hashbrown::HashSet;
use routegrid_types::{FieldRef, MetricRow, RowLevel};

use crate::cache::{CacheSet, Signature};
use crate::expansion::ExpansionState;
use crate::index::{GroupIndexEntry, HierarchicalIndex, TableData};
use crate::sort::sort_indices;

/// Columns probed for the time component of an hourly row's output key.
const HOURLY_KEY_FIELDS: [&str; 5] = ["time", "hour", "date", "datetime", "timestamp"];

/// One row of the flattened, visible hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleRow {
    pub level: RowLevel,
    /// Index into the matching [`TableData`] array.
    pub index: usize,
    pub group_id: Arc<str>,
}

impl VisibleRow {
    pub fn row<'a>(&self, data: &'a TableData) -> Option<&'a MetricRow> {
        data.row(self.level, self.index)
    }
}

fn norm(value: Option<FieldRef<'_>>) -> String {
    value.map(|f| f.as_text().trim().to_lowercase()).unwrap_or_default()
}

fn norm_str(value: &str) -> String {
    value.trim().to_lowercase()
}

fn peer_key(row: &MetricRow) -> String {
    format!("{}|{}|{}", norm_str(&row.main), norm_str(row.peer_text()), norm_str(&row.destination))
}

/// Borrowed view over everything needed to compute visibility.
pub struct Selector<'a> {
    data: &'a TableData,
    index: &'a HierarchicalIndex,
    expansion: &'a ExpansionState,
    signature: &'a Signature,
    caches: &'a mut CacheSet,
}

impl<'a> Selector<'a> {
    /// Validates the caches against `signature` before handing out the selector.
    pub fn new(
        data: &'a TableData,
        index: &'a HierarchicalIndex,
        expansion: &'a ExpansionState,
        signature: &'a Signature,
        caches: &'a mut CacheSet,
    ) -> Self {
        caches.ensure(signature);
        Self { data, index, expansion, signature, caches }
    }

    /// Ordered, deduplicated rows for the current filter, sort and expansion state.
    pub fn lazy_visible_data(&mut self) -> Vec<VisibleRow> {
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let (mut mains, mut peers, mut hours) = (0usize, 0usize, 0usize);
        let (data, index) = (self.data, self.index);

        for entry in &index.main {
            let Some(row) = data.main.get(entry.index) else {
                continue;
            };
            let mut pass = self.main_passes(entry, row);
            if !pass {
                pass = !self.peer_rows_lazy(&entry.group_id).is_empty();
            }
            if !pass {
                continue;
            }

            let key = format!("m|{}|{}", norm_str(&row.main), norm_str(&row.destination));
            if seen.insert(key) {
                out.push(VisibleRow { level: RowLevel::Main, index: entry.index, group_id: Arc::clone(&entry.group_id) });
            }
            mains += 1;

            if !self.expansion.is_main_expanded(&entry.group_id) {
                continue;
            }

            let peer_rows = self.peer_rows_lazy(&entry.group_id);
            peers += peer_rows.len();
            for &peer_idx in peer_rows.iter() {
                let (Some(peer_entry), Some(peer_row)) = (index.peer.get(peer_idx), data.peer.get(peer_idx))
                else {
                    continue;
                };
                if seen.insert(format!("p|{}", peer_key(peer_row))) {
                    out.push(VisibleRow {
                        level: RowLevel::Peer,
                        index: peer_idx,
                        group_id: Arc::clone(&peer_entry.group_id),
                    });
                }

                if !self.expansion.is_peer_expanded(&peer_entry.group_id) {
                    continue;
                }

                let hourly_rows = self.hourly_rows_lazy(&peer_entry.group_id);
                hours += hourly_rows.len();
                for &hour_idx in hourly_rows.iter() {
                    let (Some(hour_entry), Some(hour_row)) =
                        (index.hourly.get(hour_idx), data.hourly.get(hour_idx))
                    else {
                        continue;
                    };
                    let time = hour_row
                        .first_present(&HOURLY_KEY_FIELDS)
                        .map(|f| f.as_text().trim().to_lowercase())
                        .unwrap_or_default();
                    if seen.insert(format!("h|{}|{time}", peer_key(hour_row))) {
                        out.push(VisibleRow {
                            level: RowLevel::Hourly,
                            index: hour_idx,
                            group_id: Arc::clone(&hour_entry.group_id),
                        });
                    }
                }
            }
        }

        tracing::debug!(rows = out.len(), main = mains, peer = peers, hourly = hours, "Computed visible rows");
        out
    }

    /// Does a main row pass the filters on its own? Memoized per group.
    fn main_passes(&mut self, entry: &GroupIndexEntry, row: &MetricRow) -> bool {
        if let Some(pass) = self.caches.main_pass.get(&entry.group_id) {
            return pass;
        }

        let filters = &self.signature.filters;
        let contains = |text: &str, key: &str| {
            filters.column(key).is_none_or(|f| text.to_lowercase().contains(&f.to_lowercase()))
        };

        let mut pass = contains(&row.main, "main") && contains(&row.destination, "destination");
        pass = pass && filters.columns_pass(row, true);
        if pass && let Some(peer_filter) = filters.column("peer") {
            let needle = peer_filter.to_lowercase();
            pass = self
                .index
                .peer_children(&entry.group_id)
                .iter()
                .filter_map(|&i| self.index.peer.get(i))
                .any(|p| p.peer.as_deref().unwrap_or("").to_lowercase().contains(&needle));
        }
        pass = pass && filters.global_pass(row);

        self.caches.main_pass.insert(Arc::clone(&entry.group_id), pass);
        pass
    }

    /// Filtered, sorted, deduplicated peer rows under a main group.
    ///
    /// A peer that fails the filters itself is still kept when any of its
    /// hourly rows pass.
    pub fn peer_rows_lazy(&mut self, main_id: &Arc<str>) -> Arc<[usize]> {
        if let Some(rows) = self.caches.peer_children.get(main_id) {
            return rows;
        }

        let (data, index, signature) = (self.data, self.index, self.signature);
        let mut seen = HashSet::new();
        let candidates: Vec<usize> = index
            .peer_children(main_id)
            .iter()
            .copied()
            .filter(|&i| data.peer.get(i).is_some_and(|row| seen.insert(peer_key(row))))
            .collect();

        let mut kept = Vec::with_capacity(candidates.len());
        for i in candidates {
            let (Some(row), Some(entry)) = (data.peer.get(i), index.peer.get(i)) else {
                continue;
            };
            if signature.filters.row_passes(row) || !self.hourly_rows_lazy(&entry.group_id).is_empty() {
                kept.push(i);
            }
        }

        sort_indices(&data.peer, &mut kept, &signature.multi_sort);
        let rows: Arc<[usize]> = kept.into();
        self.caches.peer_children.insert(Arc::clone(main_id), Arc::clone(&rows));
        rows
    }

    /// Filtered, sorted, deduplicated hourly rows under a peer group.
    pub fn hourly_rows_lazy(&mut self, peer_id: &Arc<str>) -> Arc<[usize]> {
        if let Some(rows) = self.caches.hourly_children.get(peer_id) {
            return rows;
        }

        let (data, index, signature) = (self.data, self.index, self.signature);
        let children = index.hourly_children(peer_id);
        let time_key = match children.first().and_then(|&i| data.hourly.get(i)) {
            Some(first) if first.extra.contains_key("time") => "time",
            _ => "hour",
        };

        let mut seen = HashSet::new();
        let mut kept: Vec<usize> = children
            .iter()
            .copied()
            .filter(|&i| {
                data.hourly.get(i).is_some_and(|row| {
                    let key = format!("{}|{}", peer_key(row), norm(row.get(time_key)));
                    seen.insert(key) && signature.filters.row_passes(row)
                })
            })
            .collect();

        sort_indices(&data.hourly, &mut kept, &signature.multi_sort);
        let rows: Arc<[usize]> = kept.into();
        self.caches.hourly_children.insert(Arc::clone(peer_id), Arc::clone(&rows));
        rows
    }
}
