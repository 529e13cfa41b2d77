//! Hourly → peer → main roll-up aggregation
//!
//! ```text
//!   hourly rows ──filter_by_zoom──▶ zoomed hourly
//!        │
//!        └──aggregate_peer_rows──▶ peer rows ──aggregate_main_rows──▶ main rows
//!                                                                     │
//!                                              compute_aggregates ◀───┘
//! ```
//!
//! The functions in this module are pure and are the single source of truth
//! for the formulas. The [`Aggregator`] decides whether they run in-process
//! or inside the `routegrid-aggregation-worker` process; both paths produce
//! identical rows.

mod strategy;
pub mod worker;

#[cfg(test)]
mod aggregation_tests;

pub use strategy::{AggregationStrategy, Aggregator, LocalStrategy};
pub use worker::{WorkerClient, WorkerStrategy};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use hashbrown::HashMap;
use routegrid_types::{
    FieldRef, FooterAggregates, MetricRow, MetricValue, Reaggregation, RequestPayload,
    RequestType, TotalsBlock, WorkerRequest, WorkerResponse, WorkerResult, ZoomRange,
};

use crate::format::{float_or_zero, int_or_zero, round1};

/// Columns probed, in order, for an hourly row's timestamp.
pub const TIMESTAMP_FIELDS: [&str; 12] = [
    "time", "Time", "timestamp", "Timestamp", "slot", "Slot", "hour", "Hour", "datetime",
    "DateTime", "ts", "TS",
];

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

/// Epoch milliseconds of an hourly row. Rows without a usable timestamp
/// sort to the epoch (0).
pub fn row_timestamp(row: &MetricRow) -> f64 {
    match row.first_present(&TIMESTAMP_FIELDS) {
        Some(FieldRef::Value(MetricValue::Number(n))) => *n,
        Some(FieldRef::Value(MetricValue::Text(s))) => {
            parse_timestamp(s).map(|ms| ms as f64).unwrap_or(0.0)
        }
        Some(FieldRef::Text(s)) => parse_timestamp(s).map(|ms| ms as f64).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Parse an RFC 3339 or naive (UTC) date-time string into epoch millis.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }

    let naive = s.strip_suffix('Z').unwrap_or(s);
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

// ─────────────────────────────────────────────────────────────────────────────
// Roll-ups
// ─────────────────────────────────────────────────────────────────────────────

/// Keep the hourly rows whose timestamp falls inside `range` (inclusive).
pub fn filter_by_zoom(hourly: &[MetricRow], range: ZoomRange) -> Vec<MetricRow> {
    let (from, to) = (range.from_ts as f64, range.to_ts as f64);
    hourly
        .iter()
        .filter(|row| {
            let ts = row_timestamp(row);
            ts >= from && ts <= to
        })
        .cloned()
        .collect()
}

#[derive(Default)]
struct Group {
    main: String,
    peer: Option<String>,
    destination: String,
    minutes: f64,
    successful: f64,
    attempts: f64,
    pdd_weighted: f64,
    atime_weighted: f64,
}

impl Group {
    fn seed(row: &MetricRow, with_peer: bool) -> Self {
        Self {
            main: row.main.clone(),
            peer: if with_peer { row.peer.clone() } else { None },
            destination: row.destination.clone(),
            ..Default::default()
        }
    }

    fn add(&mut self, row: &MetricRow) {
        let scall = int_or_zero(row.scall.as_ref());
        let tcall = int_or_zero(row.tcall.as_ref());
        self.minutes += float_or_zero(row.min.as_ref());
        self.successful += scall;
        self.attempts += tcall;
        self.pdd_weighted += float_or_zero(row.pdd.as_ref()) * tcall;
        self.atime_weighted += float_or_zero(row.atime.as_ref()) * scall;
    }

    fn into_row(self, with_quality: bool) -> MetricRow {
        let asr = if self.attempts > 0.0 {
            round1(self.successful / self.attempts * 100.0).min(100.0)
        } else {
            0.0
        };
        let acd = if self.successful > 0.0 { round1(self.minutes / self.successful) } else { 0.0 };

        let mut row = MetricRow {
            main: self.main,
            peer: self.peer,
            destination: self.destination,
            min: Some(round1(self.minutes).into()),
            scall: Some(self.successful.into()),
            tcall: Some(self.attempts.into()),
            asr: Some(asr.into()),
            acd: Some(acd.into()),
            ..Default::default()
        };
        if with_quality {
            let pdd = if self.attempts > 0.0 { round1(self.pdd_weighted / self.attempts) } else { 0.0 };
            let atime =
                if self.successful > 0.0 { round1(self.atime_weighted / self.successful) } else { 0.0 };
            row.pdd = Some(pdd.into());
            row.atime = Some(atime.into());
        }
        row
    }
}

/// Group rows by `key`, preserving first-appearance order.
fn group_rows<'a, K, F>(rows: &'a [MetricRow], with_peer: bool, key: F) -> Vec<Group>
where
    K: std::hash::Hash + Eq,
    F: Fn(&'a MetricRow) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for row in rows {
        let idx = *slots.entry(key(row)).or_insert_with(|| {
            groups.push(Group::seed(row, with_peer));
            groups.len() - 1
        });
        groups[idx].add(row);
    }
    groups
}

/// Roll hourly rows up to one row per `(main, peer, destination)`.
pub fn aggregate_peer_rows(hourly: &[MetricRow]) -> Vec<MetricRow> {
    group_rows(hourly, true, |r| (r.main.as_str(), r.peer_text(), r.destination.as_str()))
        .into_iter()
        .map(|g| g.into_row(true))
        .collect()
}

/// Roll peer (or hourly) rows up to one row per `(main, destination)`.
pub fn aggregate_main_rows(peer: &[MetricRow]) -> Vec<MetricRow> {
    group_rows(peer, false, |r| (r.main.as_str(), r.destination.as_str()))
        .into_iter()
        .map(|g| g.into_row(false))
        .collect()
}

/// Footer totals over the main rows, for today, yesterday and the delta.
pub fn compute_aggregates(main: &[MetricRow]) -> FooterAggregates {
    let (mut t_min, mut t_scall, mut t_tcall) = (0.0, 0.0, 0.0);
    let (mut y_min, mut y_scall, mut y_tcall) = (0.0, 0.0, 0.0);

    for r in main {
        t_min += float_or_zero(r.min.as_ref());
        t_scall += int_or_zero(r.scall.as_ref());
        t_tcall += int_or_zero(r.tcall.as_ref());
        y_min += float_or_zero(r.y_min.as_ref());
        y_scall += int_or_zero(r.y_scall.as_ref());
        y_tcall += int_or_zero(r.y_tcall.as_ref());
    }

    let ratio = |num: f64, den: f64, scale: f64| if den > 0.0 { num / den * scale } else { 0.0 };
    let acd = ratio(t_min, t_scall, 1.0);
    let asr = ratio(t_scall, t_tcall, 100.0);
    let y_acd = ratio(y_min, y_scall, 1.0);
    let y_asr = ratio(y_scall, y_tcall, 100.0);
    let pct = |now: f64, prev: f64| {
        if prev.abs() > 0.0 { (now - prev) / prev.abs() * 100.0 } else { 0.0 }
    };

    FooterAggregates {
        curr: TotalsBlock {
            total_minutes: round1(t_min),
            total_successful_calls: t_scall,
            total_calls: t_tcall,
            acd_avg: round1(acd),
            asr_avg: round1(asr),
        },
        y: TotalsBlock {
            total_minutes: round1(y_min),
            total_successful_calls: y_scall,
            total_calls: y_tcall,
            acd_avg: round1(y_acd),
            asr_avg: round1(y_asr),
        },
        delta: TotalsBlock {
            total_minutes: round1(pct(t_min, y_min)),
            total_successful_calls: round1(pct(t_scall, y_scall)),
            total_calls: round1(pct(t_tcall, y_tcall)),
            acd_avg: round1(pct(acd, y_acd)),
            asr_avg: round1(pct(asr, y_asr)),
        },
    }
}

/// Zoom filter followed by the full roll-up chain.
pub fn full_reaggregation(hourly: &[MetricRow], range: ZoomRange) -> Reaggregation {
    let hourly_rows = filter_by_zoom(hourly, range);
    let peer_rows = aggregate_peer_rows(&hourly_rows);
    let main_rows = aggregate_main_rows(&peer_rows);
    let aggregates = compute_aggregates(&main_rows);
    Reaggregation { hourly_rows, peer_rows, main_rows, aggregates }
}

// ─────────────────────────────────────────────────────────────────────────────
// Protocol Dispatch
// ─────────────────────────────────────────────────────────────────────────────

fn rows(rows: &Option<Vec<MetricRow>>) -> &[MetricRow] {
    rows.as_deref().unwrap_or_default()
}

fn zoom_range(payload: &RequestPayload) -> Result<ZoomRange, String> {
    match (payload.from_ts, payload.to_ts) {
        (Some(from_ts), Some(to_ts)) => Ok(ZoomRange { from_ts, to_ts }),
        _ => Err("payload is missing fromTs/toTs".to_string()),
    }
}

/// Run one request against the pure functions.
pub fn execute(kind: RequestType, payload: &RequestPayload) -> Result<WorkerResult, String> {
    Ok(match kind {
        RequestType::FilterByZoom => {
            WorkerResult::Rows(filter_by_zoom(rows(&payload.hourly_rows), zoom_range(payload)?))
        }
        RequestType::AggregatePeerRows => {
            WorkerResult::Rows(aggregate_peer_rows(rows(&payload.hourly_rows)))
        }
        RequestType::AggregateMainRows => {
            WorkerResult::Rows(aggregate_main_rows(rows(&payload.peer_rows)))
        }
        RequestType::ComputeAggregates => {
            WorkerResult::Aggregates(compute_aggregates(rows(&payload.main_rows)))
        }
        RequestType::FullReaggregation => WorkerResult::Reaggregation(full_reaggregation(
            rows(&payload.hourly_rows),
            zoom_range(payload)?,
        )),
    })
}

/// Answer a decoded worker request.
pub fn handle_request(request: &WorkerRequest) -> WorkerResponse {
    match execute(request.kind, &request.payload) {
        Ok(result) => WorkerResponse::success(request.request_id, result),
        Err(message) => WorkerResponse::error(request.request_id, message),
    }
}
