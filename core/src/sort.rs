//! Multi-key row ordering
//!
//! Numeric when both sides parse as numbers, lowercase text otherwise, with
//! missing values treated as the empty string. Every sort is stable.

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use routegrid_types::{FieldRef, MetricRow, MetricValue, SortDir, SortSpec};

use crate::format::parse_float;

/// Move `main`/`destination` to the front when both are sorted on and one
/// of them is the primary key. The primary of the pair stays first.
pub fn normalize_multi_sort(multi_sort: &[SortSpec]) -> Vec<SortSpec> {
    let Some(primary) = multi_sort.first() else {
        return Vec::new();
    };
    let main = multi_sort.iter().find(|s| s.key == "main");
    let dest = multi_sort.iter().find(|s| s.key == "destination");

    match (main, dest) {
        (Some(main), Some(dest)) if primary.key == "main" || primary.key == "destination" => {
            let pair = if primary.key == "destination" { [dest, main] } else { [main, dest] };
            pair.into_iter()
                .chain(multi_sort.iter().filter(|s| s.key != "main" && s.key != "destination"))
                .cloned()
                .collect()
        }
        _ => multi_sort.to_vec(),
    }
}

fn numeric(value: Option<FieldRef<'_>>) -> f64 {
    match value {
        Some(FieldRef::Value(MetricValue::Number(n))) => *n,
        Some(FieldRef::Value(MetricValue::Null)) | None => f64::NAN,
        Some(field) => parse_float(&field.as_text()),
    }
}

fn lower_text(value: Option<FieldRef<'_>>) -> String {
    match value {
        Some(field) if !field.is_null() => field.as_text().to_lowercase(),
        _ => String::new(),
    }
}

/// Compare two rows under an already-normalized sort order.
pub fn compare_rows(a: &MetricRow, b: &MetricRow, order: &[SortSpec]) -> Ordering {
    for spec in order {
        let (av, bv) = (a.get(&spec.key), b.get(&spec.key));
        let (an, bn) = (numeric(av), numeric(bv));

        let ord = if !an.is_nan() && !bn.is_nan() {
            an.partial_cmp(&bn).unwrap_or(Ordering::Equal)
        } else {
            lower_text(av).cmp(&lower_text(bv))
        };

        if ord != Ordering::Equal {
            return match spec.dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            };
        }
    }
    Ordering::Equal
}

/// Stable-sort raw row indices by the rows they point at.
pub fn sort_indices(rows: &[MetricRow], indices: &mut [usize], order: &[SortSpec]) {
    if order.is_empty() {
        return;
    }
    let mut buf = Vec::with_capacity(indices.len());
    let mut cmp = |a: &usize, b: &usize| match (rows.get(*a), rows.get(*b)) {
        (Some(ra), Some(rb)) => compare_rows(ra, rb, order),
        _ => Ordering::Equal,
    };
    merge_sort(indices, &mut buf, &mut cmp);
}

/// Sorted copy of `rows`.
pub fn apply_order_sort(rows: &[MetricRow], order: &[SortSpec]) -> Vec<MetricRow> {
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    sort_indices(rows, &mut indices, order);
    indices.into_iter().map(|i| rows[i].clone()).collect()
}

// Mixed numeric/text keys make the comparator intransitive, and std's sort
// may panic on that. This merge sort tolerates any comparator.
fn merge_sort<F>(v: &mut [usize], buf: &mut Vec<usize>, cmp: &mut F)
where
    F: FnMut(&usize, &usize) -> Ordering,
{
    let n = v.len();
    if n <= 16 {
        for i in 1..n {
            let mut j = i;
            while j > 0 && cmp(&v[j - 1], &v[j]) == Ordering::Greater {
                v.swap(j - 1, j);
                j -= 1;
            }
        }
        return;
    }

    let mid = n / 2;
    merge_sort(&mut v[..mid], buf, cmp);
    merge_sort(&mut v[mid..], buf, cmp);
    if cmp(&v[mid - 1], &v[mid]) != Ordering::Greater {
        return;
    }

    buf.clear();
    buf.extend_from_slice(v);
    let (mut i, mut j) = (0, mid);
    for slot in v.iter_mut() {
        let take_right = i >= mid || (j < n && cmp(&buf[j], &buf[i]) == Ordering::Less);
        if take_right {
            *slot = buf[j];
            j += 1;
        } else {
            *slot = buf[i];
            i += 1;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main-row memo
// ─────────────────────────────────────────────────────────────────────────────

/// Caches the sorted main rows for one input array and sort order.
#[derive(Debug, Default)]
pub struct SortEngine {
    main_memo: Option<MainMemo>,
}

#[derive(Debug)]
struct MainMemo {
    input: Weak<Vec<MetricRow>>,
    order: Vec<SortSpec>,
    output: Arc<Vec<MetricRow>>,
}

impl SortEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort main rows, reusing the previous result when called again with the
    /// same `Arc` and the same normalized order.
    pub fn sort_main_rows(&mut self, rows: &Arc<Vec<MetricRow>>, multi_sort: &[SortSpec]) -> Arc<Vec<MetricRow>> {
        let order = normalize_multi_sort(multi_sort);
        if let Some(memo) = &self.main_memo
            && memo.order == order
            && Weak::ptr_eq(&memo.input, &Arc::downgrade(rows))
        {
            tracing::debug!(rows = rows.len(), "Main sort memo hit");
            return Arc::clone(&memo.output);
        }

        let output = if order.is_empty() { Arc::clone(rows) } else { Arc::new(apply_order_sort(rows, &order)) };
        self.main_memo = Some(MainMemo { input: Arc::downgrade(rows), order, output: Arc::clone(&output) });
        output
    }

    pub fn clear(&mut self) {
        self.main_memo = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(order: &[SortSpec]) -> Vec<&str> {
        order.iter().map(|s| s.key.as_str()).collect()
    }

    fn mains(rows: &[MetricRow]) -> Vec<&str> {
        rows.iter().map(|r| r.main.as_str()).collect()
    }

    #[test]
    fn normalize_moves_main_destination_pair_to_front() {
        let order = normalize_multi_sort(&[
            SortSpec::asc("destination"),
            SortSpec::desc("ASR"),
            SortSpec::asc("main"),
        ]);
        assert_eq!(keys(&order), ["destination", "main", "ASR"]);

        let order = normalize_multi_sort(&[SortSpec::asc("main"), SortSpec::asc("Min"), SortSpec::asc("destination")]);
        assert_eq!(keys(&order), ["main", "destination", "Min"]);

        let order = normalize_multi_sort(&[SortSpec::asc("ASR"), SortSpec::asc("main"), SortSpec::asc("destination")]);
        assert_eq!(keys(&order), ["ASR", "main", "destination"]);

        assert!(normalize_multi_sort(&[]).is_empty());
    }

    #[test]
    fn numeric_values_compare_as_numbers() {
        let rows = vec![
            MetricRow::new("a", None, "D").with("Min", "10"),
            MetricRow::new("b", None, "D").with("Min", 9.0),
            MetricRow::new("c", None, "D").with("Min", "100.5"),
        ];
        assert_eq!(mains(&apply_order_sort(&rows, &[SortSpec::asc("Min")])), ["b", "a", "c"]);
        assert_eq!(mains(&apply_order_sort(&rows, &[SortSpec::desc("Min")])), ["c", "a", "b"]);
    }

    #[test]
    fn text_is_case_insensitive_and_missing_sorts_first() {
        let rows = vec![
            MetricRow::new("beta", None, "D"),
            MetricRow::new("Alpha", None, "D"),
            MetricRow::new("", None, "D"),
        ];
        assert_eq!(mains(&apply_order_sort(&rows, &[SortSpec::asc("main")])), ["", "Alpha", "beta"]);
    }

    #[test]
    fn ties_fall_through_to_next_key_and_stay_stable() {
        let rows = vec![
            MetricRow::new("x", None, "UK").with("tag", 1.0),
            MetricRow::new("y", None, "US").with("tag", 2.0),
            MetricRow::new("z", None, "UK").with("tag", 3.0),
            MetricRow::new("w", None, "UK").with("tag", 4.0),
        ];
        let sorted = apply_order_sort(&rows, &[SortSpec::asc("destination")]);
        assert_eq!(mains(&sorted), ["x", "z", "w", "y"]);

        let sorted = apply_order_sort(&rows, &[SortSpec::asc("destination"), SortSpec::asc("main")]);
        assert_eq!(mains(&sorted), ["w", "x", "z", "y"]);
    }

    #[test]
    fn mixed_comparators_do_not_panic_on_large_inputs() {
        let rows: Vec<MetricRow> = (0..500)
            .map(|i| {
                let value = if i % 3 == 0 { MetricValue::Text(format!("n{i}")) } else { MetricValue::Number((i * 7 % 13) as f64) };
                MetricRow::new(format!("m{i}"), None, "D").with("Min", value)
            })
            .collect();
        let sorted = apply_order_sort(&rows, &[SortSpec::desc("Min")]);
        assert_eq!(sorted.len(), rows.len());
    }

    #[test]
    fn main_sort_is_memoized_per_input_and_order() {
        let rows = Arc::new(vec![MetricRow::new("b", None, "D"), MetricRow::new("a", None, "D")]);
        let mut engine = SortEngine::new();
        let order = [SortSpec::asc("main")];

        let first = engine.sort_main_rows(&rows, &order);
        let second = engine.sort_main_rows(&rows, &order);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mains(&first), ["a", "b"]);

        let third = engine.sort_main_rows(&rows, &[SortSpec::desc("main")]);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(mains(&third), ["b", "a"]);

        let copy = Arc::new(rows.as_ref().clone());
        let fourth = engine.sort_main_rows(&copy, &[SortSpec::desc("main")]);
        assert!(!Arc::ptr_eq(&third, &fourth));
    }
}
