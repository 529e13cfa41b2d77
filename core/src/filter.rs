//! Column and global filter matching
//!
//! A column filter is either a comparison (`>=10`, `<5`, `!=0`, `=3`), a
//! bare number (treated as `>=` when the cell is numeric) or plain text
//! (case-insensitive substring). Comparisons never exclude a row whose cell
//! or operand is not numeric.

use std::collections::BTreeMap;

use routegrid_types::{FieldRef, MetricRow, TableState};

use crate::format::{parse_float, parse_num};

/// Does a single cell satisfy a column filter expression?
pub fn passes_column_filter(value: Option<FieldRef<'_>>, filter: &str) -> bool {
    let trimmed = filter.trim();
    let cell = parse_num(value);

    let compare = |rest: &str, op: fn(f64, f64) -> bool| {
        let operand = parse_float(rest.trim());
        if operand.is_nan() || cell.is_nan() {
            return true;
        }
        op(cell, operand)
    };

    if let Some(rest) = trimmed.strip_prefix(">=") {
        return compare(rest, |a, b| a >= b);
    }
    if let Some(rest) = trimmed.strip_prefix("<=") {
        return compare(rest, |a, b| a <= b);
    }
    if let Some(rest) = trimmed.strip_prefix("!=") {
        return compare(rest, |a, b| a != b);
    }
    if let Some(rest) = trimmed.strip_prefix('>') {
        return compare(rest, |a, b| a > b);
    }
    if let Some(rest) = trimmed.strip_prefix('<') {
        return compare(rest, |a, b| a < b);
    }
    if let Some(rest) = trimmed.strip_prefix('=') {
        return compare(rest, |a, b| a == b);
    }

    let bare = parse_float(trimmed);
    if !bare.is_nan() && !cell.is_nan() {
        return cell >= bare;
    }

    let text = value.map(|f| f.as_text().to_lowercase()).unwrap_or_default();
    text.contains(&trimmed.to_lowercase())
}

/// The active filters, normalized once per visible-list computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    /// Non-empty column filters, trimmed, in key order.
    pub columns: BTreeMap<String, String>,
    /// Global query, trimmed and lowercased.
    pub global: String,
}

impl FilterSet {
    pub fn from_state(state: &TableState) -> Self {
        let columns = state
            .column_filters
            .iter()
            .map(|(k, v)| (k.clone(), v.trim().to_string()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Self { columns, global: state.global_filter_query.trim().to_lowercase() }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.global.is_empty()
    }

    pub fn column(&self, key: &str) -> Option<&str> {
        self.columns.get(key).map(String::as_str)
    }

    /// Every column filter passes, optionally ignoring the `peer` column.
    pub fn columns_pass(&self, row: &MetricRow, skip_peer: bool) -> bool {
        self.columns
            .iter()
            .filter(|(key, _)| !(skip_peer && key.as_str() == "peer"))
            .all(|(key, filter)| passes_column_filter(row.get(key), filter))
    }

    /// The global query matches `main`, `peer` or `destination`.
    pub fn global_pass(&self, row: &MetricRow) -> bool {
        if self.global.is_empty() {
            return true;
        }
        [row.main.as_str(), row.peer_text(), row.destination.as_str()]
            .iter()
            .any(|text| text.to_lowercase().contains(&self.global))
    }

    /// Full filter set for peer and hourly rows.
    pub fn row_passes(&self, row: &MetricRow) -> bool {
        self.columns_pass(row, false) && self.global_pass(row)
    }
}
