//! Row → HTML cell fragments
//!
//! Output is cells only. The host owns the `<tr>` and applies the row class
//! and key carried by [`RenderedRow`].

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use routegrid_types::{METRIC_FAMILIES, MetricRow, RowLevel};

use crate::aggregation::parse_timestamp;
use crate::format::{anomaly_class, compute_delta_percent, format_metric_value, parse_num, pick_delta_display};

const EXPANDED_LABEL: &str = "\u{2212}";
const COLLAPSED_LABEL: &str = "+";

pub fn toggle_label(expanded: bool) -> &'static str {
    if expanded { EXPANDED_LABEL } else { COLLAPSED_LABEL }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Everything needed to render one row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub level: RowLevel,
    pub group_id: &'a str,
    pub row: &'a MetricRow,
    /// Display date of hourly rows.
    pub date: Option<&'a str>,
    /// Whether the row's own group is expanded.
    pub expanded: bool,
}

/// A rendered row plus what the host needs for its wrapper element.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub key: Arc<str>,
    pub class: &'static str,
    pub parent_id: Option<Arc<str>>,
    /// Position in the visible list.
    pub virtual_index: usize,
    pub cells: String,
}

/// Cells of one row, without the surrounding `<tr>`.
pub fn render_table_row(view: &RowView<'_>) -> String {
    let mut out = match view.level {
        RowLevel::Main => main_cells(view),
        RowLevel::Peer => peer_cells(view),
        RowLevel::Hourly => hourly_cells(view),
    };
    metric_cells(view.row, &mut out);
    out
}

fn toggle_button(group_id: &str, expanded: bool) -> String {
    format!(
        r#"<button class="toggle-btn" data-target-group="{}">{}</button>"#,
        escape_html(group_id),
        toggle_label(expanded)
    )
}

fn text_cell(class: &str, text: &str) -> String {
    let text = escape_html(text);
    format!(r#"<td role="cell" class="{class}" data-filter-value="{text}">{text}</td>"#)
}

fn main_cells(view: &RowView<'_>) -> String {
    let main = escape_html(&view.row.main);
    let mut out = format!(
        r#"<td role="cell" class="main-cell" data-filter-value="{main}">{} {main}</td>"#,
        toggle_button(view.group_id, view.expanded)
    );
    out.push_str(r#"<td role="cell" class="peer-cell" data-filter-value=""></td>"#);
    out.push_str(&text_cell("destination-cell", &view.row.destination));
    out
}

fn peer_cells(view: &RowView<'_>) -> String {
    let peer = escape_html(view.row.peer_text());
    let mut out = String::from(r#"<td role="cell" class="toggle-cell"></td>"#);
    let _ = write!(
        out,
        r#"<td role="cell" class="peer-cell" data-filter-value="{peer}">{} {peer}</td>"#,
        toggle_button(view.group_id, view.expanded)
    );
    out.push_str(&text_cell("destination-cell", &view.row.destination));
    out
}

fn hourly_cells(view: &RowView<'_>) -> String {
    let (date, time) = split_date_time(view.date);
    let mut out = format!(
        r#"<td role="cell" class="main-cell hour-datetime" data-filter-value="{date} {time}"><div class="hour-datetime-inner"><span class="date-part">{date}</span><span class="time-part">{time}</span></div></td>"#
    );
    out.push_str(&text_cell("peer-cell", view.row.peer_text()));
    out.push_str(&text_cell("destination-cell", &view.row.destination));
    out
}

/// `DD:MM:YYYY` and `HH:MM` in UTC. Missing or unreadable dates render as zeros.
pub fn split_date_time(date: Option<&str>) -> (String, String) {
    let parsed = date
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| parse_timestamp(s).or_else(|| s.parse::<i64>().ok()))
        .and_then(DateTime::<Utc>::from_timestamp_millis);
    match parsed {
        Some(dt) => (dt.format("%d:%m:%Y").to_string(), dt.format("%H:%M").to_string()),
        None => ("00:00:0000".to_string(), "00:00".to_string()),
    }
}

fn metric_cells(row: &MetricRow, out: &mut String) {
    for metric in METRIC_FAMILIES {
        let y_key = format!("Y{metric}");
        let value = row.get(metric);
        let y_value = row.get(&y_key);

        let delta = compute_delta_percent(parse_num(value), parse_num(y_value));
        let mut class = format!("metric-cell {}", anomaly_class(metric, delta));
        let mut attributes = String::new();
        if metric == "ASR" {
            class.push_str(" asr-cell-hover");
            attributes = format!(r#" data-pdd="{}" data-atime="{}""#, escape_html(&pdd_text(row)), atime_text(row));
        }

        let _ = write!(
            out,
            r#"<td role="cell" class="{class}"{attributes}>{}</td>"#,
            escape_html(&format_metric_value(metric, value))
        );
        let _ = write!(
            out,
            r#"<td role="cell" class="metric-cell" data-y-toggleable="true">{}</td>"#,
            escape_html(&format_metric_value(metric, y_value))
        );

        let provided = row.get(&format!("{metric}_delta"));
        let shown = pick_delta_display(value, y_value, provided);
        let _ = write!(out, r#"<td role="cell" class="metric-cell delta-cell {}">{}</td>"#, shown.class, shown.display);
    }
}

/// Raw PDD, or `N/A` when it is missing, empty or zero.
fn pdd_text(row: &MetricRow) -> String {
    match row.get("PDD") {
        Some(field) if !field.is_null() => {
            let text = field.as_text();
            if text.is_empty() || parse_num(Some(field)) == 0.0 { "N/A".to_string() } else { text.into_owned() }
        }
        _ => "N/A".to_string(),
    }
}

/// Average answer time per successful call, to two decimals.
fn atime_text(row: &MetricRow) -> String {
    let atime = parse_num(row.get("ATime"));
    let scall = parse_num(row.get("SCall"));
    if atime.is_finite() && scall.is_finite() && scall > 0.0 {
        format!("{:.2}", atime / scall)
    } else if atime.is_finite() {
        format!("{atime:.2}")
    } else {
        "N/A".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(level: RowLevel, group_id: &'a str, row: &'a MetricRow) -> RowView<'a> {
        RowView { level, group_id, row, date: None, expanded: false }
    }

    #[test]
    fn fragments_never_contain_row_tags() {
        let row = MetricRow::new("Acme", Some("Carrier X"), "US").with("Min", 10.0);
        for level in [RowLevel::Main, RowLevel::Peer, RowLevel::Hourly] {
            let html = render_table_row(&view(level, "g", &row));
            assert!(html.starts_with("<td"), "{level:?}: {html}");
            assert!(!html.contains("<tr"));
            // 3 label cells + 5 metric families x 3 cells
            assert_eq!(html.matches("<td ").count(), 18);
        }
    }

    #[test]
    fn main_row_has_toggle_and_empty_peer_cell() {
        let row = MetricRow::new("Acme", None, "US");
        let mut v = view(RowLevel::Main, "main-Acme-US", &row);
        let html = render_table_row(&v);
        assert!(html.starts_with(
            r#"<td role="cell" class="main-cell" data-filter-value="Acme"><button class="toggle-btn" data-target-group="main-Acme-US">+</button> Acme</td><td role="cell" class="peer-cell" data-filter-value=""></td>"#
        ));

        v.expanded = true;
        assert!(render_table_row(&v).contains(">\u{2212}</button>"));
    }

    #[test]
    fn peer_row_toggle_sits_in_peer_cell() {
        let row = MetricRow::new("Acme", Some("Carrier X"), "US");
        let html = render_table_row(&view(RowLevel::Peer, "peer-Acme-Carrier-X-US", &row));
        assert!(html.starts_with(r#"<td role="cell" class="toggle-cell"></td><td role="cell" class="peer-cell" data-filter-value="Carrier X"><button"#));
    }

    #[test]
    fn hourly_row_splits_date_and_time() {
        let row = MetricRow::new("Acme", Some("X"), "US");
        let mut v = view(RowLevel::Hourly, "hour-Acme-X-US-0", &row);
        v.date = Some("2024-05-01 09:30:00");
        let html = render_table_row(&v);
        assert!(html.contains(r#"<span class="date-part">01:05:2024</span><span class="time-part">09:30</span>"#));

        assert_eq!(split_date_time(None), ("00:00:0000".to_string(), "00:00".to_string()));
        assert_eq!(split_date_time(Some("later")), ("00:00:0000".to_string(), "00:00".to_string()));
    }

    #[test]
    fn text_is_escaped() {
        let row = MetricRow::new("<b>Acme & Co</b>", None, "\"US\"");
        let html = render_table_row(&view(RowLevel::Main, "main-bAcme--Cob-US", &row));
        assert!(html.contains("&lt;b&gt;Acme &amp; Co&lt;/b&gt;"));
        assert!(html.contains("&quot;US&quot;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn metric_cells_carry_classes_and_deltas() {
        let row = MetricRow::new("Acme", None, "US")
            .with("ASR", 55.0)
            .with("YASR", 50.0)
            .with("Min", 100.4)
            .with("YMin", 100.0)
            .with("PDD", 3.2)
            .with("ATime", 90.0)
            .with("SCall", 30.0);
        let html = render_table_row(&view(RowLevel::Main, "main-Acme-US", &row));

        assert!(html.contains(
            r#"<td role="cell" class="metric-cell cell-positive asr-cell-hover" data-pdd="3.2" data-atime="3.00">55</td>"#
        ));
        assert!(html.contains(r#"<td role="cell" class="metric-cell delta-cell cell-positive">10</td>"#));
        assert!(html.contains(r#"<td role="cell" class="metric-cell" data-y-toggleable="true">50</td>"#));
        // Min moved 0.4%: rounds to no delta
        assert!(html.contains(r#"<td role="cell" class="metric-cell ">100</td>"#));
    }

    #[test]
    fn asr_tooltip_defaults() {
        let row = MetricRow::new("Acme", None, "US").with("ATime", 12.5);
        assert_eq!(pdd_text(&row), "N/A");
        assert_eq!(atime_text(&row), "12.50");
        assert_eq!(atime_text(&MetricRow::new("Acme", None, "US")), "N/A");
    }
}
