//! Virtual window: scroll position → slice of the visible row list
//!
//! `start = floor(scroll_top / h) - buffer` and
//! `end = floor(scroll_top / h) + ceil(viewport / h) + buffer`, both clamped to
//! the row count. The spacer is always `len * h` tall so the scrollbar
//! reflects the full list.

use tokio::time::Instant;

use crate::config::{TableConfig, optimized_buffer};

const MAX_MULTIPLIER: f64 = 3.0;
const TALL_ROW_MAX_MULTIPLIER: f64 = 3.5;
const TALL_ROW_THRESHOLD: f64 = 60.0;
/// Renders between two row-height measurements.
const MEASURE_EVERY: u32 = 5;

/// Buffer multiplier for a scroll speed in px/ms.
pub fn buffer_multiplier(speed: f64, row_height: f64) -> f64 {
    let cap = if row_height > TALL_ROW_THRESHOLD { TALL_ROW_MAX_MULTIPLIER } else { MAX_MULTIPLIER };
    let mult: f64 = if speed > 2.0 {
        2.5
    } else if speed > 1.0 {
        2.0
    } else if speed > 0.5 {
        1.5
    } else {
        1.0
    };
    mult.min(cap)
}

/// Slice of the visible list to materialize, plus its placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRange {
    pub start: usize,
    pub end: usize,
    /// Translate applied to the rendered rows, `start * row_height`.
    pub offset_top: f64,
    pub spacer_height: f64,
}

impl WindowRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Snapshot for status reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStatus {
    pub len: usize,
    pub row_height: f64,
    pub buffer: usize,
    pub multiplier: f64,
    pub range: Option<(usize, usize)>,
}

#[derive(Debug)]
pub struct VirtualWindow {
    row_height: f64,
    base_buffer: usize,
    buffer: usize,
    viewport_height: f64,
    dynamic_buffer: bool,
    fixed_row_height: bool,

    len: usize,
    last: Option<WindowRange>,
    last_scroll_top: f64,
    last_scroll_at: Option<Instant>,
    multiplier: f64,
    renders_since_measure: u32,
}

impl VirtualWindow {
    pub fn new(config: &TableConfig) -> Self {
        Self {
            row_height: config.row_height,
            base_buffer: config.buffer_size,
            buffer: config.buffer_size,
            viewport_height: config.viewport_height,
            dynamic_buffer: config.dynamic_buffer,
            fixed_row_height: config.fixed_row_height,
            len: 0,
            last: None,
            last_scroll_top: 0.0,
            last_scroll_at: None,
            multiplier: 1.0,
            renders_since_measure: 0,
        }
    }

    /// Replace the row count. The next [`compute`](Self::compute) always renders.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        self.buffer = optimized_buffer(self.base_buffer, len);
        self.last = None;
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        if height > 0.0 && height != self.viewport_height {
            self.viewport_height = height;
            self.last = None;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    pub fn spacer_height(&self) -> f64 {
        self.len as f64 * self.row_height
    }

    pub fn last_range(&self) -> Option<WindowRange> {
        self.last
    }

    fn visible_rows(&self) -> usize {
        (self.viewport_height / self.row_height).ceil().max(0.0) as usize
    }

    /// Range for `scroll_top`, or `None` when the previous range still covers
    /// the viewport and the first row moved less than half a viewport.
    pub fn compute(&mut self, scroll_top: f64, now: Instant, force: bool) -> Option<WindowRange> {
        let scroll_top = scroll_top.max(0.0);
        let speed = match self.last_scroll_at {
            Some(at) => {
                let elapsed_ms = now.saturating_duration_since(at).as_secs_f64() * 1000.0;
                (scroll_top - self.last_scroll_top).abs() / elapsed_ms.max(1.0)
            }
            None => 0.0,
        };
        self.last_scroll_top = scroll_top;
        self.last_scroll_at = Some(now);

        self.multiplier = if self.dynamic_buffer { buffer_multiplier(speed, self.row_height) } else { 1.0 };
        let buffer = (self.buffer as f64 * self.multiplier).ceil() as usize;

        let visible = self.visible_rows();
        // Float to usize casts saturate, so offsets past the end stay huge
        let first = (scroll_top / self.row_height).floor() as usize;
        let start = first.saturating_sub(buffer).min(self.len);
        let end = first.saturating_add(visible).saturating_add(buffer).clamp(start, self.len);

        if !force && let Some(last) = self.last {
            let min_delta = (visible / 2).max(1);
            let covered = first >= last.start && first.saturating_add(visible).min(self.len) <= last.end;
            if covered && last.start.abs_diff(start) < min_delta {
                return None;
            }
        }

        let range = WindowRange {
            start,
            end,
            offset_top: start as f64 * self.row_height,
            spacer_height: self.spacer_height(),
        };
        tracing::debug!(start, end, len = self.len, buffer, multiplier = self.multiplier, "Window range");
        self.last = Some(range);
        Some(range)
    }

    /// Count a render; true when the host should measure a real row.
    pub fn note_render(&mut self) -> bool {
        if self.fixed_row_height {
            return false;
        }
        self.renders_since_measure += 1;
        if self.renders_since_measure >= MEASURE_EVERY {
            self.renders_since_measure = 0;
            return true;
        }
        false
    }

    /// Adopt a measured row height. Returns true when it differed, in which
    /// case the spacer must be resized and the window re-rendered.
    pub fn adopt_measured_height(&mut self, measured: f64) -> bool {
        if self.fixed_row_height {
            return false;
        }
        let real = measured.round();
        if real <= 0.0 || real.is_nan() || real == self.row_height {
            return false;
        }
        tracing::debug!(from = self.row_height, to = real, "Adopted measured row height");
        self.row_height = real;
        self.last = None;
        true
    }

    /// Scroll offset that puts `index` at the top of the viewport.
    pub fn offset_of(&self, index: usize) -> f64 {
        index.min(self.len.saturating_sub(1)) as f64 * self.row_height
    }

    pub fn status(&self) -> WindowStatus {
        WindowStatus {
            len: self.len,
            row_height: self.row_height,
            buffer: self.buffer,
            multiplier: self.multiplier,
            range: self.last.map(|r| (r.start, r.end)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn window(len: usize) -> VirtualWindow {
        let config = TableConfig { dynamic_buffer: false, ..Default::default() };
        let mut w = VirtualWindow::new(&config);
        w.set_len(len);
        w
    }

    #[test]
    fn range_follows_formula() {
        // 600 / 40 = 15 visible rows, buffer tuned up to 10 for small data
        let mut w = window(1000);
        let now = Instant::now();

        let r = w.compute(0.0, now, false).unwrap();
        assert_eq!((r.start, r.end), (0, 25));
        assert_eq!(r.spacer_height, 40_000.0);
        assert_eq!(r.offset_top, 0.0);

        let r = w.compute(4000.0, now, true).unwrap();
        assert_eq!((r.start, r.end), (90, 125));
        assert_eq!(r.offset_top, 3600.0);
    }

    #[test]
    fn range_is_clamped_to_len() {
        let mut w = window(12);
        let r = w.compute(10_000.0, Instant::now(), false).unwrap();
        assert_eq!((r.start, r.end), (12, 12));
        assert!(r.is_empty());

        let mut w = window(0);
        let r = w.compute(0.0, Instant::now(), false).unwrap();
        assert_eq!((r.start, r.end, r.spacer_height), (0, 0, 0.0));
    }

    #[test]
    fn huge_scroll_offsets_clamp_instead_of_overflowing() {
        let mut w = window(100);
        let now = Instant::now();

        let r = w.compute(1e30, now, true).unwrap();
        assert_eq!((r.start, r.end), (100, 100));

        // What scrolling to row usize::MAX asks for
        let r = w.compute(40.0 * usize::MAX as f64, now, true).unwrap();
        assert_eq!((r.start, r.end), (100, 100));
        assert!(w.compute(f64::INFINITY, now, false).is_none());
    }

    #[test]
    fn small_scrolls_reuse_previous_range() {
        let mut w = window(1000);
        let now = Instant::now();
        w.compute(4000.0, now, false).unwrap();

        // 3 rows down: less than half a viewport (7 rows)
        assert!(w.compute(4120.0, now, false).is_none());
        // 8 rows down from the last render
        assert!(w.compute(4320.0, now, false).is_some());
        // forced renders always run
        assert!(w.compute(4320.0, now, true).is_some());
    }

    #[test]
    fn length_change_forces_rerun() {
        let mut w = window(1000);
        let now = Instant::now();
        w.compute(0.0, now, false).unwrap();
        w.set_len(900);
        assert!(w.compute(0.0, now, false).is_some());
    }

    #[test]
    fn fast_scrolling_widens_buffer() {
        assert_eq!(buffer_multiplier(0.2, 40.0), 1.0);
        assert_eq!(buffer_multiplier(0.8, 40.0), 1.5);
        assert_eq!(buffer_multiplier(1.5, 40.0), 2.0);
        assert_eq!(buffer_multiplier(9.0, 80.0), 2.5);

        let mut w = VirtualWindow::new(&TableConfig::default());
        w.set_len(10_000);
        let t0 = Instant::now();
        w.compute(0.0, t0, true);
        let r = w.compute(30_000.0, t0 + Duration::from_millis(10), true).unwrap();
        assert_eq!(w.status().multiplier, 2.5);
        // buffer 16 * 2.5 = 40
        assert_eq!(r.start, 750 - 40);
    }

    #[test]
    fn measured_height_is_adopted_unless_fixed() {
        let mut w = window(100);
        assert!(!w.adopt_measured_height(40.2));
        assert!(w.adopt_measured_height(33.6));
        assert_eq!(w.row_height(), 34.0);
        assert_eq!(w.spacer_height(), 3400.0);

        let config = TableConfig { fixed_row_height: true, ..Default::default() };
        let mut fixed = VirtualWindow::new(&config);
        assert!(!fixed.adopt_measured_height(20.0));
        assert!(!fixed.note_render());
    }

    #[test]
    fn measurement_cadence() {
        let mut w = window(10);
        let due: Vec<bool> = (0..10).map(|_| w.note_render()).collect();
        assert_eq!(due.iter().filter(|d| **d).count(), 2);
        assert!(due[4] && due[9]);
    }
}
