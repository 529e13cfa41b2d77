//! Shared data types for routegrid
//!
//! This crate contains the serializable row, table-state and worker-protocol
//! types shared between the table engine (routegrid-core), the aggregation
//! worker process and the CLI.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

// ─────────────────────────────────────────────────────────────────────────────
// Cell Values
// ─────────────────────────────────────────────────────────────────────────────

/// A raw cell value as delivered by the metrics endpoint.
///
/// Metric columns arrive as numbers most of the time, but some exports carry
/// them as formatted strings ("1 204,5"), so parsing is deferred to the
/// formatter instead of being forced at ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Flag(bool),
    Null,
}

impl MetricValue {
    /// Text form of the value, matching how a browser would stringify it.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            MetricValue::Number(n) => Cow::Owned(number_to_text(*n)),
            MetricValue::Text(s) => Cow::Borrowed(s.as_str()),
            MetricValue::Flag(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            MetricValue::Null => Cow::Borrowed(""),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Number(value as f64)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Format a number without a trailing `.0`, with JS spellings for infinities.
pub fn number_to_text(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

/// Borrowed view of any column of a [`MetricRow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Text(&'a str),
    Value(&'a MetricValue),
}

impl<'a> FieldRef<'a> {
    pub fn as_text(&self) -> Cow<'a, str> {
        match self {
            FieldRef::Text(s) => Cow::Borrowed(s),
            FieldRef::Value(v) => v.as_text(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldRef::Value(MetricValue::Null))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Rows
// ─────────────────────────────────────────────────────────────────────────────

/// Metric columns rendered by the table, in display order.
pub const METRIC_FAMILIES: [&str; 5] = ["Min", "ACD", "ASR", "SCall", "TCall"];

/// One row of call metrics at any hierarchy level.
///
/// Main rows carry `(main, destination)`, peer rows add `peer`, hourly rows
/// add a time column (kept in `extra` under whatever name the source used).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(default)]
    pub main: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default)]
    pub destination: String,

    #[serde(rename = "Min", default, skip_serializing_if = "Option::is_none")]
    pub min: Option<MetricValue>,
    #[serde(rename = "ACD", default, skip_serializing_if = "Option::is_none")]
    pub acd: Option<MetricValue>,
    #[serde(rename = "ASR", default, skip_serializing_if = "Option::is_none")]
    pub asr: Option<MetricValue>,
    #[serde(rename = "SCall", default, skip_serializing_if = "Option::is_none")]
    pub scall: Option<MetricValue>,
    #[serde(rename = "TCall", default, skip_serializing_if = "Option::is_none")]
    pub tcall: Option<MetricValue>,
    #[serde(rename = "PDD", default, skip_serializing_if = "Option::is_none")]
    pub pdd: Option<MetricValue>,
    #[serde(rename = "ATime", default, skip_serializing_if = "Option::is_none")]
    pub atime: Option<MetricValue>,

    // Yesterday mirrors
    #[serde(rename = "YMin", default, skip_serializing_if = "Option::is_none")]
    pub y_min: Option<MetricValue>,
    #[serde(rename = "YACD", default, skip_serializing_if = "Option::is_none")]
    pub y_acd: Option<MetricValue>,
    #[serde(rename = "YASR", default, skip_serializing_if = "Option::is_none")]
    pub y_asr: Option<MetricValue>,
    #[serde(rename = "YSCall", default, skip_serializing_if = "Option::is_none")]
    pub y_scall: Option<MetricValue>,
    #[serde(rename = "YTCall", default, skip_serializing_if = "Option::is_none")]
    pub y_tcall: Option<MetricValue>,

    /// Everything else: time columns, `<Metric>_delta`, server extras.
    #[serde(flatten)]
    pub extra: BTreeMap<String, MetricValue>,
}

impl MetricRow {
    pub fn new(main: impl Into<String>, peer: Option<&str>, destination: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            peer: peer.map(str::to_string),
            destination: destination.into(),
            ..Default::default()
        }
    }

    /// Builder-style setter for any column.
    pub fn with(mut self, key: &str, value: impl Into<MetricValue>) -> Self {
        self.set(key, value.into());
        self
    }

    fn slot(&self, key: &str) -> Option<&Option<MetricValue>> {
        Some(match key {
            "Min" => &self.min,
            "ACD" => &self.acd,
            "ASR" => &self.asr,
            "SCall" => &self.scall,
            "TCall" => &self.tcall,
            "PDD" => &self.pdd,
            "ATime" => &self.atime,
            "YMin" => &self.y_min,
            "YACD" => &self.y_acd,
            "YASR" => &self.y_asr,
            "YSCall" => &self.y_scall,
            "YTCall" => &self.y_tcall,
            _ => return None,
        })
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<MetricValue>> {
        Some(match key {
            "Min" => &mut self.min,
            "ACD" => &mut self.acd,
            "ASR" => &mut self.asr,
            "SCall" => &mut self.scall,
            "TCall" => &mut self.tcall,
            "PDD" => &mut self.pdd,
            "ATime" => &mut self.atime,
            "YMin" => &mut self.y_min,
            "YACD" => &mut self.y_acd,
            "YASR" => &mut self.y_asr,
            "YSCall" => &mut self.y_scall,
            "YTCall" => &mut self.y_tcall,
            _ => return None,
        })
    }

    /// Look up a column by its wire name.
    pub fn get(&self, key: &str) -> Option<FieldRef<'_>> {
        match key {
            "main" => Some(FieldRef::Text(&self.main)),
            "destination" => Some(FieldRef::Text(&self.destination)),
            "peer" => self.peer.as_deref().map(FieldRef::Text),
            _ => match self.slot(key) {
                Some(slot) => slot.as_ref().map(FieldRef::Value),
                None => self.extra.get(key).map(FieldRef::Value),
            },
        }
    }

    /// First non-null column among `keys`.
    pub fn first_present(&self, keys: &[&str]) -> Option<FieldRef<'_>> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|f| !f.is_null())
    }

    /// Set a column by its wire name.
    pub fn set(&mut self, key: &str, value: MetricValue) {
        match key {
            "main" => self.main = value.as_text().into_owned(),
            "destination" => self.destination = value.as_text().into_owned(),
            "peer" => self.peer = Some(value.as_text().into_owned()),
            _ => match self.slot_mut(key) {
                Some(slot) => *slot = Some(value),
                None => {
                    self.extra.insert(key.to_string(), value);
                }
            },
        }
    }

    pub fn peer_text(&self) -> &str {
        self.peer.as_deref().unwrap_or("")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hierarchy Levels
// ─────────────────────────────────────────────────────────────────────────────

/// Level of a row in the main → peer → hourly hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowLevel {
    Main,
    Peer,
    Hourly,
}

impl RowLevel {
    /// CSS class of the `<tr>` wrapping a row of this level.
    pub fn row_class(self) -> &'static str {
        match self {
            RowLevel::Main => "main-row",
            RowLevel::Peer => "peer-row",
            RowLevel::Hourly => "hour-row",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Table State (filters + sort)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// One key of a multi-column sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    #[serde(default)]
    pub dir: SortDir,
}

impl SortSpec {
    pub fn asc(key: &str) -> Self {
        Self { key: key.to_string(), dir: SortDir::Asc }
    }

    pub fn desc(key: &str) -> Self {
        Self { key: key.to_string(), dir: SortDir::Desc }
    }
}

fn default_multi_sort() -> Vec<SortSpec> {
    vec![SortSpec::asc("destination"), SortSpec::asc("main")]
}

fn default_true() -> bool {
    true
}

/// Snapshot of the user-controlled filter and sort state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableState {
    #[serde(default)]
    pub column_filters: BTreeMap<String, String>,
    #[serde(default)]
    pub global_filter_query: String,
    #[serde(default = "default_multi_sort")]
    pub multi_sort: Vec<SortSpec>,
    #[serde(default = "default_true")]
    pub y_columns_visible: bool,
}

impl Default for TableState {
    fn default() -> Self {
        Self {
            column_filters: BTreeMap::new(),
            global_filter_query: String::new(),
            multi_sort: default_multi_sort(),
            y_columns_visible: true,
        }
    }
}

impl TableState {
    /// Set or clear (empty value) a column filter.
    pub fn set_column_filter(&mut self, key: &str, value: &str) {
        if value.trim().is_empty() {
            self.column_filters.remove(key);
        } else {
            self.column_filters.insert(key.to_string(), value.to_string());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregates
// ─────────────────────────────────────────────────────────────────────────────

/// Inclusive time window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomRange {
    pub from_ts: i64,
    pub to_ts: i64,
}

impl ZoomRange {
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.from_ts && ts <= self.to_ts
    }
}

/// One block of footer totals (current day, yesterday, or delta percent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsBlock {
    pub total_minutes: f64,
    pub total_successful_calls: f64,
    pub total_calls: f64,
    pub acd_avg: f64,
    pub asr_avg: f64,
}

/// Footer aggregates over the main rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FooterAggregates {
    pub curr: TotalsBlock,
    pub y: TotalsBlock,
    pub delta: TotalsBlock,
}

/// Output of the zoom → peer → main pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaggregation {
    pub hourly_rows: Vec<MetricRow>,
    pub peer_rows: Vec<MetricRow>,
    pub main_rows: Vec<MetricRow>,
    pub aggregates: FooterAggregates,
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Message type of a worker request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    FilterByZoom,
    AggregatePeerRows,
    AggregateMainRows,
    ComputeAggregates,
    FullReaggregation,
}

/// Request payload. Which fields are set depends on the [`RequestType`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rows: Option<Vec<MetricRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_rows: Option<Vec<MetricRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_rows: Option<Vec<MetricRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_ts: Option<i64>,
}

/// `{ type, payload, requestId }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    #[serde(rename = "type")]
    pub kind: RequestType,
    #[serde(default)]
    pub payload: RequestPayload,
    pub request_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Result body of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerResult {
    Rows(Vec<MetricRow>),
    Reaggregation(Reaggregation),
    Aggregates(FooterAggregates),
}

/// `{ type: SUCCESS|ERROR, requestId, result|error }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    #[serde(rename = "type")]
    pub status: ResponseStatus,
    pub request_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkerResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    pub fn success(request_id: u64, result: WorkerResult) -> Self {
        Self {
            status: ResponseStatus::Success,
            request_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(request_id: u64, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            request_id,
            result: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trips_known_and_extra_columns() {
        let json = r#"{"main":"Acme","peer":"Carrier X","destination":"US",
            "Min":12.5,"SCall":"3","time":"2024-05-01 10:00:00","Min_delta":4}"#;
        let row: MetricRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.main, "Acme");
        assert_eq!(row.peer_text(), "Carrier X");
        assert_eq!(row.min, Some(MetricValue::Number(12.5)));
        assert_eq!(row.scall, Some(MetricValue::Text("3".into())));
        assert_eq!(
            row.get("time").map(|f| f.as_text().into_owned()),
            Some("2024-05-01 10:00:00".to_string())
        );
        assert_eq!(row.get("Min_delta"), Some(FieldRef::Value(&MetricValue::Number(4.0))));
        assert!(row.get("ACD").is_none());
    }

    #[test]
    fn null_metric_reads_as_absent() {
        let row: MetricRow = serde_json::from_str(r#"{"main":"a","destination":"b","ASR":null}"#).unwrap();
        assert!(row.asr.is_none());
    }

    #[test]
    fn request_uses_wire_names() {
        let req = WorkerRequest {
            kind: RequestType::AggregatePeerRows,
            payload: RequestPayload {
                hourly_rows: Some(vec![]),
                ..Default::default()
            },
            request_id: 7,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"type":"AGGREGATE_PEER_ROWS","payload":{"hourlyRows":[]},"requestId":7}"#
        );
    }

    #[test]
    fn response_result_shapes_are_distinguished() {
        let rows: WorkerResponse =
            serde_json::from_str(r#"{"type":"SUCCESS","requestId":1,"result":[]}"#).unwrap();
        assert_eq!(rows.result, Some(WorkerResult::Rows(vec![])));

        let err: WorkerResponse =
            serde_json::from_str(r#"{"type":"ERROR","requestId":2,"error":"boom"}"#).unwrap();
        assert_eq!(err.status, ResponseStatus::Error);
        assert_eq!(err.error.as_deref(), Some("boom"));
    }

    #[test]
    fn default_sort_is_destination_then_main() {
        let state = TableState::default();
        assert_eq!(state.multi_sort[0].key, "destination");
        assert_eq!(state.multi_sort[1].key, "main");
    }
}
