use std::io::Write;
use std::path::Path;

use routegrid_core::aggregation::parse_timestamp;
use routegrid_core::manager::{HIDE_ALL_LABEL, SHOW_ALL_LABEL};
use routegrid_core::{RenderedRow, TableHost};
use routegrid_types::{MetricRow, SortSpec, ZoomRange};
use serde::Deserialize;
use tokio::time::Instant;

use crate::CliContext;

/// Dataset file: the three row arrays. Missing peer or main rows are
/// aggregated from the rows below them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    pub main_rows: Vec<MetricRow>,
    pub peer_rows: Vec<MetricRow>,
    pub hourly_rows: Vec<MetricRow>,
}

impl Dataset {
    pub fn read(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("Invalid dataset {}: {e}", path.display()))
    }
}

/// Epoch milliseconds, or a date-time string.
pub fn parse_time(value: &str) -> Result<i64, String> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .or_else(|| parse_timestamp(value))
        .ok_or_else(|| format!("Not a timestamp: {value}"))
}

/// One line per rendered row, indented by level.
pub fn describe_row(row: &RenderedRow) -> String {
    let indent = match row.class {
        "peer-row" => "  ",
        "hour-row" => "    ",
        _ => "",
    };
    format!("{:>6} {indent}{}", row.virtual_index, row.key)
}

pub async fn load(path: &str, ctx: &mut CliContext) -> Result<(), String> {
    let mut dataset = Dataset::read(Path::new(path))?;
    if dataset.peer_rows.is_empty() && !dataset.hourly_rows.is_empty() {
        dataset.peer_rows = ctx.aggregator.aggregate_peer_rows(dataset.hourly_rows.clone()).await;
    }
    if dataset.main_rows.is_empty() && !dataset.peer_rows.is_empty() {
        dataset.main_rows = ctx.aggregator.aggregate_main_rows(dataset.peer_rows.clone()).await;
    }

    let counts = (dataset.main_rows.len(), dataset.peer_rows.len(), dataset.hourly_rows.len());
    let started = std::time::Instant::now();
    if !ctx
        .manager
        .render_virtual_table(dataset.main_rows, dataset.peer_rows, dataset.hourly_rows)
    {
        return Err("Table is not active".to_string());
    }
    println!(
        "loaded {} main, {} peer, {} hourly rows in {}ms",
        counts.0,
        counts.1,
        counts.2,
        started.elapsed().as_millis()
    );
    Ok(())
}

pub fn show(ctx: &CliContext, cells: bool) {
    let host = ctx.manager.host();
    if host.rows.is_empty() {
        println!("No rows rendered");
        return;
    }
    for row in &host.rows {
        println!("{}", describe_row(row));
        if cells {
            println!("       {}", row.cells);
        }
    }
    println!(
        "{} of {} rows, offset {}px, spacer {}px [{}]",
        host.rows.len(),
        ctx.manager.visible_rows().len(),
        host.offset_top,
        host.spacer_height,
        host.expand_all_label
    );
}

pub fn toggle(group: &str, ctx: &mut CliContext) -> Result<(), String> {
    if !ctx.manager.handle_toggle(group) {
        return Err(format!("Not an expandable group: {group}"));
    }
    show(ctx, false);
    Ok(())
}

pub fn expand_all(ctx: &mut CliContext) {
    ctx.manager.show_all_rows();
    report_bulk(ctx, HIDE_ALL_LABEL);
}

pub fn collapse_all(ctx: &mut CliContext) {
    ctx.manager.hide_all_rows();
    report_bulk(ctx, SHOW_ALL_LABEL);
}

fn report_bulk(ctx: &CliContext, applied_label: &str) {
    match ctx.manager.queued_bulk_op() {
        Some(op) => println!("{op:?} queued until data is loaded"),
        None if ctx.manager.host().expand_all_label == applied_label => show(ctx, false),
        None => println!("Nothing to change"),
    }
}

pub fn filter(column: &str, value: &str, ctx: &mut CliContext) {
    let mut state = ctx.manager.view().table.clone();
    state.set_column_filter(column, value);
    ctx.manager.set_table_state(state);
    show(ctx, false);
}

pub fn search(query: &str, ctx: &mut CliContext) {
    let mut state = ctx.manager.view().table.clone();
    state.global_filter_query = query.to_string();
    ctx.manager.set_table_state(state);
    show(ctx, false);
}

pub fn sort(key: &str, desc: bool, add: bool, ctx: &mut CliContext) {
    let spec = if desc { SortSpec::desc(key) } else { SortSpec::asc(key) };
    let mut state = ctx.manager.view().table.clone();
    if add {
        state.multi_sort.retain(|s| s.key != key);
        state.multi_sort.push(spec);
    } else {
        state.multi_sort = vec![spec];
    }
    ctx.manager.set_table_state(state);
    show(ctx, false);
}

pub fn scroll(row: usize, ctx: &mut CliContext) {
    let top = ctx.manager.status().window.row_height * row as f64;
    ctx.manager.host_mut().set_scroll_top(top);
    ctx.manager.on_scroll();
    ctx.manager.on_frame(Instant::now());
    show(ctx, false);
}

pub async fn zoom(from: &str, to: &str, ctx: &mut CliContext) -> Result<(), String> {
    let range = ZoomRange { from_ts: parse_time(from)?, to_ts: parse_time(to)? };
    if range.from_ts > range.to_ts {
        return Err("Zoom start is after its end".to_string());
    }
    if !ctx.manager.apply_zoom(&ctx.aggregator, range).await {
        return Err("Nothing to zoom, load a dataset first".to_string());
    }
    stats(ctx)
}

pub fn zoom_reset(ctx: &mut CliContext) -> Result<(), String> {
    if !ctx.manager.reset_zoom() {
        return Err("Not zoomed".to_string());
    }
    stats(ctx)
}

pub fn stats(ctx: &CliContext) -> Result<(), String> {
    let status = ctx.manager.status();
    println!("active:        {}", status.active);
    println!("data rows:     {}", status.data_count);
    println!("visible rows:  {}", status.visible_rows);
    println!(
        "window:        {:?} of {} (row {}px, buffer {} x{})",
        status.window.range, status.window.len, status.window.row_height, status.window.buffer, status.window.multiplier
    );
    println!("zoomed:        {}", ctx.manager.is_zoomed());
    println!("aggregation:   {}", if ctx.aggregator.has_primary() { "worker" } else { "local" });
    let payload = serde_json::to_string_pretty(&ctx.manager.live_payload()).map_err(|e| e.to_string())?;
    println!("{payload}");
    Ok(())
}

pub fn header(ctx: &CliContext) {
    match &ctx.manager.host().floating_header {
        Some(update) => println!("{update:#?}"),
        None => println!("No floating header"),
    }
}

pub fn exit(ctx: &mut CliContext) {
    ctx.manager.destroy();
    write!(std::io::stdout(), "quitting...").ok();
    std::io::stdout().flush().ok();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use routegrid_core::TableConfig;

    use super::*;

    fn context() -> CliContext {
        CliContext::with_config(TableConfig { worker_path: None, ..Default::default() })
    }

    #[test]
    fn times_accept_millis_and_dates() {
        assert_eq!(parse_time("1714557600000"), Ok(1_714_557_600_000));
        assert_eq!(parse_time("2024-05-01 10:00"), Ok(1_714_557_600_000));
        assert!(parse_time("soon").is_err());
    }

    #[test]
    fn rows_are_indented_by_level() {
        let row = RenderedRow {
            key: Arc::from("peer-Acme-X-US"),
            class: "peer-row",
            parent_id: None,
            virtual_index: 3,
            cells: String::new(),
        };
        assert_eq!(describe_row(&row), "     3   peer-Acme-X-US");
    }

    #[tokio::test]
    async fn load_aggregates_missing_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{"hourlyRows":[
                {"main":"Acme","peer":"X","destination":"US","time":"2024-05-01 10:00","Min":20,"SCall":10,"TCall":20},
                {"main":"Acme","peer":"Y","destination":"US","time":"2024-05-01 10:00","Min":10,"SCall":5,"TCall":10}
            ]}"#,
        )
        .unwrap();

        let mut ctx = context();
        load(path.to_str().unwrap(), &mut ctx).await.unwrap();

        let data = ctx.manager.data().unwrap();
        assert_eq!(data.peer.len(), 2);
        assert_eq!(data.main.len(), 1);
        assert_eq!(ctx.manager.host().row_keys(), ["main-Acme-US"]);

        toggle("main-Acme-US", &mut ctx).unwrap();
        assert_eq!(ctx.manager.visible_rows().len(), 3);
        assert!(toggle("main-Nobody-XX", &mut ctx).is_err());
    }

    #[tokio::test]
    async fn unreadable_dataset_is_an_error() {
        let mut ctx = context();
        assert!(load("/definitely/not/here.json", &mut ctx).await.is_err());
        assert!(ctx.manager.data().is_none());
    }

    #[test]
    fn bulk_before_load_is_queued() {
        let mut ctx = context();
        expand_all(&mut ctx);
        assert!(ctx.manager.queued_bulk_op().is_some());
    }
}
