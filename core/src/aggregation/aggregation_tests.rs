//! Roll-up formula tests

use routegrid_types::{MetricRow, MetricValue, RequestType, WorkerRequest, ZoomRange};

use super::*;

fn hour(main: &str, peer: &str, dest: &str, time: &str, min: f64, scall: f64, tcall: f64) -> MetricRow {
    MetricRow::new(main, Some(peer), dest)
        .with("time", time)
        .with("Min", min)
        .with("SCall", scall)
        .with("TCall", tcall)
}

fn num(row: &MetricRow, key: &str) -> f64 {
    match row.get(key) {
        Some(routegrid_types::FieldRef::Value(MetricValue::Number(n))) => *n,
        other => panic!("{key} is not a number: {other:?}"),
    }
}

#[test]
fn test_peer_rollup_two_rows() {
    let rows = vec![
        hour("A", "P", "D", "2024-05-01 10:00:00", 10.0, 5.0, 10.0),
        hour("A", "P", "D", "2024-05-01 11:00:00", 20.0, 10.0, 20.0),
    ];

    let peers = aggregate_peer_rows(&rows);

    assert_eq!(peers.len(), 1);
    let p = &peers[0];
    assert_eq!(p.peer.as_deref(), Some("P"));
    assert_eq!(num(p, "Min"), 30.0);
    assert_eq!(num(p, "SCall"), 15.0);
    assert_eq!(num(p, "TCall"), 30.0);
    assert_eq!(num(p, "ASR"), 50.0);
    assert_eq!(num(p, "ACD"), 2.0);
}

#[test]
fn test_peer_rollup_keeps_first_appearance_order() {
    let rows = vec![
        hour("B", "P", "D", "", 1.0, 1.0, 1.0),
        hour("A", "P", "D", "", 1.0, 1.0, 1.0),
        hour("B", "P", "D", "", 1.0, 1.0, 1.0),
    ];
    let peers = aggregate_peer_rows(&rows);
    let mains: Vec<_> = peers.iter().map(|r| r.main.as_str()).collect();
    assert_eq!(mains, ["B", "A"]);
    assert_eq!(num(&peers[0], "SCall"), 2.0);
}

#[test]
fn test_zero_attempts_give_zero_ratios() {
    let rows = vec![hour("A", "P", "D", "", 12.0, 0.0, 0.0)];
    let p = &aggregate_peer_rows(&rows)[0];
    assert_eq!(num(p, "ASR"), 0.0);
    assert_eq!(num(p, "ACD"), 0.0);
    assert_eq!(num(p, "PDD"), 0.0);
    assert_eq!(num(p, "ATime"), 0.0);
}

#[test]
fn test_asr_is_capped_at_100() {
    let rows = vec![hour("A", "P", "D", "", 1.0, 30.0, 10.0)];
    assert_eq!(num(&aggregate_peer_rows(&rows)[0], "ASR"), 100.0);
}

#[test]
fn test_weighted_quality_metrics() {
    let rows = vec![
        hour("A", "P", "D", "", 1.0, 2.0, 4.0).with("PDD", 3.0).with("ATime", 10.0),
        hour("A", "P", "D", "", 1.0, 6.0, 12.0).with("PDD", 5.0).with("ATime", 20.0),
    ];
    let p = &aggregate_peer_rows(&rows)[0];
    // (3*4 + 5*12) / 16 = 4.5 ; (10*2 + 20*6) / 8 = 17.5
    assert_eq!(num(p, "PDD"), 4.5);
    assert_eq!(num(p, "ATime"), 17.5);
}

#[test]
fn test_unparseable_values_count_as_zero() {
    let rows = vec![
        hour("A", "P", "D", "", 10.0, 5.0, 10.0),
        MetricRow::new("A", Some("P"), "D")
            .with("Min", "n/a")
            .with("SCall", "7.9")
            .with("TCall", MetricValue::Null),
    ];
    let p = &aggregate_peer_rows(&rows)[0];
    assert_eq!(num(p, "Min"), 10.0);
    assert_eq!(num(p, "SCall"), 12.0);
    assert_eq!(num(p, "TCall"), 10.0);
}

#[test]
fn test_main_rollup_is_associative_for_integer_minutes() {
    let rows = vec![
        hour("A", "P1", "D1", "", 10.0, 5.0, 10.0),
        hour("A", "P2", "D1", "", 7.0, 3.0, 9.0),
        hour("A", "P1", "D2", "", 4.0, 1.0, 6.0),
        hour("B", "P1", "D1", "", 25.0, 9.0, 11.0),
        hour("A", "P1", "D1", "", 3.0, 2.0, 2.0),
    ];

    let via_peers = aggregate_main_rows(&aggregate_peer_rows(&rows));
    let direct = aggregate_main_rows(&rows);

    assert_eq!(via_peers, direct);
    assert!(via_peers.iter().all(|r| r.peer.is_none()));
    assert!(via_peers.iter().all(|r| r.pdd.is_none()));
}

#[test]
fn test_filter_by_zoom_is_inclusive() {
    let rows = vec![
        hour("A", "P", "D", "2024-05-01 10:00:00", 1.0, 1.0, 1.0),
        hour("A", "P", "D", "2024-05-01T11:00:00Z", 1.0, 1.0, 1.0),
        hour("A", "P", "D", "2024-05-01 12:00", 1.0, 1.0, 1.0),
        MetricRow::new("A", Some("P"), "D").with("ts", 1_714_564_800_000.0),
    ];
    let from = parse_timestamp("2024-05-01 10:00:00").unwrap();
    let to = parse_timestamp("2024-05-01 11:00:00").unwrap();

    let kept = filter_by_zoom(&rows, ZoomRange { from_ts: from, to_ts: to });

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0], rows[0]);
    assert_eq!(kept[1], rows[1]);
}

#[test]
fn test_timestamp_parsing() {
    assert_eq!(parse_timestamp("1970-01-01"), Some(0));
    assert_eq!(parse_timestamp("1970-01-01 00:00:01.500"), Some(1500));
    assert_eq!(parse_timestamp("1970-01-01T01:00:00+01:00"), Some(0));
    assert_eq!(parse_timestamp("yesterday"), None);

    let no_time = MetricRow::new("A", None, "D");
    assert_eq!(row_timestamp(&no_time), 0.0);
    let bad = MetricRow::new("A", None, "D").with("hour", "garbage");
    assert_eq!(row_timestamp(&bad), 0.0);
}

#[test]
fn test_footer_aggregates_with_deltas() {
    let main = vec![
        MetricRow::new("A", None, "D")
            .with("Min", 100.0)
            .with("SCall", 50.0)
            .with("TCall", 100.0)
            .with("YMin", 80.0)
            .with("YSCall", 40.0)
            .with("YTCall", 100.0),
        MetricRow::new("B", None, "D")
            .with("Min", 10.0)
            .with("SCall", 5.0)
            .with("TCall", 10.0),
    ];

    let agg = compute_aggregates(&main);

    assert_eq!(agg.curr.total_minutes, 110.0);
    assert_eq!(agg.curr.total_successful_calls, 55.0);
    assert_eq!(agg.curr.total_calls, 110.0);
    assert_eq!(agg.curr.acd_avg, 2.0);
    assert_eq!(agg.curr.asr_avg, 50.0);
    assert_eq!(agg.y.total_minutes, 80.0);
    assert_eq!(agg.y.asr_avg, 40.0);
    assert_eq!(agg.delta.total_minutes, 37.5);
    assert_eq!(agg.delta.asr_avg, 25.0);
}

#[test]
fn test_footer_delta_is_zero_without_baseline() {
    let main = vec![MetricRow::new("A", None, "D").with("Min", 5.0)];
    let agg = compute_aggregates(&main);
    assert_eq!(agg.delta.total_minutes, 0.0);
    assert_eq!(compute_aggregates(&[]), FooterAggregates::default());
}

#[test]
fn test_full_reaggregation_chains_every_step() {
    let rows = vec![
        hour("A", "P", "D", "1970-01-01 00:00:00", 10.0, 5.0, 10.0),
        hour("A", "P", "D", "1970-01-02 00:00:00", 99.0, 9.0, 9.0),
    ];
    let result = full_reaggregation(&rows, ZoomRange { from_ts: 0, to_ts: 3_600_000 });

    assert_eq!(result.hourly_rows.len(), 1);
    assert_eq!(result.peer_rows.len(), 1);
    assert_eq!(result.main_rows.len(), 1);
    assert_eq!(result.aggregates.curr.total_minutes, 10.0);
}

#[test]
fn test_handle_request_reports_errors() {
    let request = WorkerRequest {
        kind: RequestType::FullReaggregation,
        payload: Default::default(),
        request_id: 9,
    };
    let response = handle_request(&request);
    assert_eq!(response.request_id, 9);
    assert_eq!(response.status, routegrid_types::ResponseStatus::Error);
    assert!(response.result.is_none());
}

#[tokio::test]
async fn test_local_aggregator_matches_pure_functions() {
    let rows = vec![hour("A", "P", "D", "", 10.0, 5.0, 10.0)];
    let aggregator = Aggregator::local();

    assert!(!aggregator.has_primary());
    assert_eq!(aggregator.aggregate_peer_rows(rows.clone()).await, aggregate_peer_rows(&rows));
    assert_eq!(aggregator.aggregate_main_rows(rows.clone()).await, aggregate_main_rows(&rows));
}
