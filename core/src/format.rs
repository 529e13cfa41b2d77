//! Numeric parsing and cell formatting
//!
//! Metric cells arrive as numbers or as loosely formatted text. Everything
//! that turns a cell into a number, a delta percentage, a display string or
//! a CSS class lives here so the aggregation and rendering paths agree on
//! exactly the same rules.

use routegrid_types::{FieldRef, MetricValue, number_to_text};

// ─────────────────────────────────────────────────────────────────────────────
// Rounding
// ─────────────────────────────────────────────────────────────────────────────

/// Round half toward positive infinity (`-2.5 → -2`, `2.5 → 3`).
pub fn js_round(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let r = x.floor();
    if x - r >= 0.5 { r + 1.0 } else { r }
}

/// Round to one decimal place using [`js_round`].
pub fn round1(x: f64) -> f64 {
    js_round(x * 10.0) / 10.0
}

/// Round to one decimal the way a fixed-point rendering to one digit does:
/// nearest by the exact binary value, exact ties away from zero.
///
/// `0.15` is stored just below the tie and goes down; `0.25` is an exact tie
/// and goes up.
fn to_fixed1(n: f64) -> f64 {
    // Exact one-decimal ties are odd multiples of 0.05; the binary-exact ones
    // are odd quarters.
    let quarters = n.abs() * 4.0;
    if quarters.fract() == 0.0 && quarters % 2.0 == 1.0 {
        return n.signum() * ((n.abs() * 10.0).floor() + 1.0) / 10.0;
    }
    // std formatting rounds from the exact expansion, so only ties differ
    format!("{n:.1}").parse().unwrap_or(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse the longest numeric prefix of `s`. Returns NaN when there is none.
///
/// Leading whitespace is skipped, `Infinity` is recognised, and trailing
/// garbage is ignored (`"12.5 min"` → `12.5`).
pub fn parse_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        return if bytes.first() == Some(&b'-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;

    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        digits += j - frac_start;
        if digits > 0 {
            i = j;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }

    // Exponent only counts when it has at least one digit
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    s[..i].parse().unwrap_or(f64::NAN)
}

/// Parse the leading base-10 integer of `s`, truncating any fraction.
/// Returns NaN when there is none.
pub fn parse_int(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == start {
        return f64::NAN;
    }
    s[..i].parse().unwrap_or(f64::NAN)
}

/// Float value of a cell used by the aggregation sums. Unparseable → 0.
pub fn float_or_zero(value: Option<&MetricValue>) -> f64 {
    let n = match value {
        Some(MetricValue::Number(n)) => *n,
        Some(MetricValue::Text(s)) => parse_float(s),
        _ => f64::NAN,
    };
    if n.is_nan() { 0.0 } else { n }
}

/// Integer value of a cell used by the aggregation sums. Unparseable → 0.
pub fn int_or_zero(value: Option<&MetricValue>) -> f64 {
    let n = match value {
        Some(MetricValue::Number(n)) if n.is_finite() && n.abs() < 1e21 => n.trunc(),
        Some(MetricValue::Number(n)) => parse_int(&number_to_text(*n)),
        Some(MetricValue::Text(s)) => parse_int(s),
        _ => f64::NAN,
    };
    if n.is_nan() { 0.0 } else { n }
}

/// Lenient number parse for display: whitespace and thousands separators
/// are stripped before parsing. Missing values are NaN.
pub fn parse_num(value: Option<FieldRef<'_>>) -> f64 {
    match value {
        None | Some(FieldRef::Value(MetricValue::Null)) => f64::NAN,
        Some(FieldRef::Value(MetricValue::Number(n))) => *n,
        Some(field) => {
            let cleaned: String = field
                .as_text()
                .chars()
                .filter(|c| !c.is_whitespace() && *c != ',')
                .collect();
            parse_float(&cleaned)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Deltas
// ─────────────────────────────────────────────────────────────────────────────

/// Percentage change of `curr` against `prev`, unrounded.
///
/// `None` when either side is not a finite number. A zero baseline yields
/// `0` when the current value is also zero and `100` otherwise.
pub fn compute_delta_percent(curr: f64, prev: f64) -> Option<f64> {
    if !curr.is_finite() || !prev.is_finite() {
        return None;
    }
    if prev.abs() == 0.0 {
        return Some(if curr == 0.0 { 0.0 } else { 100.0 });
    }
    Some((curr - prev) / prev.abs() * 100.0)
}

/// Rendered delta cell: absolute rounded percentage plus sign class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaDisplay {
    pub display: String,
    pub class: &'static str,
}

/// Delta to show in a delta cell.
///
/// The delta computed from the current and yesterday values wins. When it
/// cannot be computed the server-provided `<Metric>_delta` is used instead.
/// A rounded value of zero renders as an empty cell.
pub fn pick_delta_display(
    curr: Option<FieldRef<'_>>,
    prev: Option<FieldRef<'_>>,
    provided: Option<FieldRef<'_>>,
) -> DeltaDisplay {
    let rounded = match compute_delta_percent(parse_num(curr), parse_num(prev)) {
        Some(dp) => Some(js_round(dp)),
        None => {
            let p = parse_num(provided);
            p.is_finite().then(|| js_round(p))
        }
    };

    match rounded {
        Some(r) if r != 0.0 => DeltaDisplay {
            display: number_to_text(r.abs()),
            class: if r > 0.0 { "cell-positive" } else { "cell-negative" },
        },
        _ => DeltaDisplay::default(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display
// ─────────────────────────────────────────────────────────────────────────────

/// Display text of a metric cell.
///
/// `Min` is rounded to an integer, `ACD`/`ASR` keep one decimal unless the
/// value is already integral. Anything unparseable is shown as-is.
pub fn format_metric_value(metric: &str, value: Option<FieldRef<'_>>) -> String {
    let n = parse_num(value);
    if n.is_finite() {
        let shown = match metric {
            "Min" => js_round(n),
            "ACD" | "ASR" if n.fract() != 0.0 => to_fixed1(n),
            _ => n,
        };
        return number_to_text(shown);
    }
    value.map(|f| f.as_text().into_owned()).unwrap_or_default()
}

/// Anomaly highlight for a metric value cell. Volume metrics are never
/// highlighted; quality metrics are when they moved by 10% or more.
pub fn anomaly_class(metric: &str, delta_percent: Option<f64>) -> &'static str {
    if matches!(metric, "Min" | "SCall" | "TCall") {
        return "";
    }
    match delta_percent {
        Some(d) if d <= -10.0 => "cell-negative",
        Some(d) if d >= 10.0 => "cell-positive",
        _ => "",
    }
}
