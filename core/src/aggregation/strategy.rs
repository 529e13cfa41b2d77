use std::future::Future;

use routegrid_types::{
    FooterAggregates, MetricRow, Reaggregation, RequestPayload, RequestType, WorkerResult,
    ZoomRange,
};

use super::WorkerStrategy;
use crate::error::{ErrorCategory, WorkerError};

/// Where an aggregation request is executed.
pub trait AggregationStrategy {
    /// Short label used in log fields.
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        kind: RequestType,
        payload: &RequestPayload,
    ) -> impl Future<Output = Result<WorkerResult, WorkerError>> + Send;
}

/// Runs the pure aggregation functions on the calling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStrategy;

impl AggregationStrategy for LocalStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(
        &self,
        kind: RequestType,
        payload: &RequestPayload,
    ) -> Result<WorkerResult, WorkerError> {
        super::execute(kind, payload).map_err(WorkerError::Remote)
    }
}

/// Aggregation front-end used by the manager.
///
/// Requests go to the primary strategy when one is configured. Any failure
/// (worker missing, crashed, timed out, or returning the wrong shape) is
/// logged and the request is re-run locally, so callers always get a result
/// and never learn which path produced it.
pub struct Aggregator<S = WorkerStrategy> {
    primary: Option<S>,
    fallback: LocalStrategy,
}

impl Aggregator<WorkerStrategy> {
    /// Aggregator that only ever runs in-process.
    pub fn local() -> Self {
        Self { primary: None, fallback: LocalStrategy }
    }
}

impl<S: AggregationStrategy> Aggregator<S> {
    pub fn with_primary(primary: S) -> Self {
        Self { primary: Some(primary), fallback: LocalStrategy }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn primary(&self) -> Option<&S> {
        self.primary.as_ref()
    }

    async fn run(&self, kind: RequestType, payload: RequestPayload) -> WorkerResult {
        if let Some(primary) = &self.primary {
            match primary.execute(kind, &payload).await {
                Ok(result) if result_matches(kind, &result) => return result,
                Ok(_) => tracing::warn!(
                    category = %ErrorCategory::Worker,
                    strategy = primary.name(),
                    ?kind,
                    error = %WorkerError::UnexpectedResult,
                    "Falling back to local aggregation"
                ),
                Err(e) => tracing::warn!(
                    category = %ErrorCategory::Worker,
                    strategy = primary.name(),
                    ?kind,
                    error = %e,
                    "Falling back to local aggregation"
                ),
            }
        }

        match self.fallback.execute(kind, &payload).await {
            Ok(result) => result,
            Err(e) => {
                // Only a malformed payload gets here; the typed front-end never builds one.
                tracing::error!(category = %ErrorCategory::Worker, ?kind, error = %e, "Local aggregation failed");
                empty_result(kind)
            }
        }
    }

    pub async fn filter_by_zoom(&self, hourly: Vec<MetricRow>, range: ZoomRange) -> Vec<MetricRow> {
        let payload = RequestPayload {
            hourly_rows: Some(hourly),
            from_ts: Some(range.from_ts),
            to_ts: Some(range.to_ts),
            ..Default::default()
        };
        match self.run(RequestType::FilterByZoom, payload).await {
            WorkerResult::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub async fn aggregate_peer_rows(&self, hourly: Vec<MetricRow>) -> Vec<MetricRow> {
        let payload = RequestPayload { hourly_rows: Some(hourly), ..Default::default() };
        match self.run(RequestType::AggregatePeerRows, payload).await {
            WorkerResult::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub async fn aggregate_main_rows(&self, peer: Vec<MetricRow>) -> Vec<MetricRow> {
        let payload = RequestPayload { peer_rows: Some(peer), ..Default::default() };
        match self.run(RequestType::AggregateMainRows, payload).await {
            WorkerResult::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub async fn compute_aggregates(&self, main: Vec<MetricRow>) -> FooterAggregates {
        let payload = RequestPayload { main_rows: Some(main), ..Default::default() };
        match self.run(RequestType::ComputeAggregates, payload).await {
            WorkerResult::Aggregates(aggregates) => aggregates,
            _ => FooterAggregates::default(),
        }
    }

    pub async fn full_reaggregation(&self, hourly: Vec<MetricRow>, range: ZoomRange) -> Reaggregation {
        let payload = RequestPayload {
            hourly_rows: Some(hourly),
            from_ts: Some(range.from_ts),
            to_ts: Some(range.to_ts),
            ..Default::default()
        };
        match self.run(RequestType::FullReaggregation, payload).await {
            WorkerResult::Reaggregation(result) => result,
            _ => Reaggregation::default(),
        }
    }
}

fn result_matches(kind: RequestType, result: &WorkerResult) -> bool {
    matches!(
        (kind, result),
        (
            RequestType::FilterByZoom | RequestType::AggregatePeerRows | RequestType::AggregateMainRows,
            WorkerResult::Rows(_)
        ) | (RequestType::ComputeAggregates, WorkerResult::Aggregates(_))
            | (RequestType::FullReaggregation, WorkerResult::Reaggregation(_))
    )
}

fn empty_result(kind: RequestType) -> WorkerResult {
    match kind {
        RequestType::ComputeAggregates => WorkerResult::Aggregates(FooterAggregates::default()),
        RequestType::FullReaggregation => WorkerResult::Reaggregation(Reaggregation::default()),
        _ => WorkerResult::Rows(Vec::new()),
    }
}
