//! The boundary between the table engine and whatever displays it
//!
//! The engine never touches a display directly. It reads measurements from a
//! [`TableHost`] and hands it spacer sizes, row fragments and header updates.
//! [`HeadlessHost`] keeps everything in memory for tests and the CLI.

use crate::adapter::RenderedRow;

/// Elements the table cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    ScrollContainer,
    Spacer,
    Tbody,
    Table,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [Anchor::ScrollContainer, Anchor::Spacer, Anchor::Tbody, Anchor::Table];
}

/// Viewport-relative box of the table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub bottom: f64,
}

/// Column geometry of the floating header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderLayout {
    pub left: f64,
    pub width: f64,
    pub column_widths: Vec<f64>,
}

/// One floating-header sync. Only `visible` and `translate_x` are always set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatingHeaderUpdate {
    pub visible: bool,
    /// New header labels when the live header changed.
    pub reclone: Option<Vec<String>>,
    pub layout: Option<HeaderLayout>,
    pub translate_x: f64,
}

pub trait TableHost {
    fn has_anchor(&self, anchor: Anchor) -> bool;

    fn scroll_top(&self) -> f64;
    fn scroll_left(&self) -> f64;
    fn viewport_height(&self) -> f64;
    fn table_rect(&self) -> Option<Rect>;
    fn header_height(&self) -> f64;
    fn header_labels(&self) -> Vec<String>;
    fn header_widths(&self) -> Vec<f64>;
    /// Height of a rendered row, if one is on screen.
    fn measure_row_height(&self) -> Option<f64>;

    fn set_spacer_height(&mut self, height: f64);
    /// Replace the rendered rows. `offset_top` positions the first one.
    fn render_rows(&mut self, offset_top: f64, rows: Vec<RenderedRow>);
    fn set_scroll_top(&mut self, top: f64);
    fn set_toggle_label(&mut self, group_id: &str, label: &str);
    fn set_expand_all_label(&mut self, label: &str);
    fn update_floating_header(&mut self, update: FloatingHeaderUpdate);
    fn remove_floating_header(&mut self);
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory host
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HeadlessHost {
    pub missing: Vec<Anchor>,
    pub scroll_top: f64,
    pub scroll_left: f64,
    pub viewport_height: f64,
    pub table_rect: Option<Rect>,
    pub header_height: f64,
    pub header_labels: Vec<String>,
    pub header_widths: Vec<f64>,
    pub row_height: Option<f64>,

    pub spacer_height: f64,
    pub offset_top: f64,
    pub rows: Vec<RenderedRow>,
    pub expand_all_label: String,
    pub floating_header: Option<FloatingHeaderUpdate>,
    /// Number of `render_rows` calls.
    pub render_count: usize,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self {
            missing: Vec::new(),
            scroll_top: 0.0,
            scroll_left: 0.0,
            viewport_height: 600.0,
            table_rect: Some(Rect { left: 0.0, top: 0.0, width: 1200.0, bottom: 600.0 }),
            header_height: 40.0,
            header_labels: Vec::new(),
            header_widths: Vec::new(),
            row_height: None,
            spacer_height: 0.0,
            offset_top: 0.0,
            rows: Vec::new(),
            expand_all_label: String::new(),
            floating_header: None,
            render_count: 0,
        }
    }
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(mut self, anchor: Anchor) -> Self {
        self.missing.push(anchor);
        self
    }

    pub fn row_keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| &*r.key).collect()
    }
}

impl TableHost for HeadlessHost {
    fn has_anchor(&self, anchor: Anchor) -> bool {
        !self.missing.contains(&anchor)
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn scroll_left(&self) -> f64 {
        self.scroll_left
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn table_rect(&self) -> Option<Rect> {
        self.table_rect
    }

    fn header_height(&self) -> f64 {
        self.header_height
    }

    fn header_labels(&self) -> Vec<String> {
        self.header_labels.clone()
    }

    fn header_widths(&self) -> Vec<f64> {
        self.header_widths.clone()
    }

    fn measure_row_height(&self) -> Option<f64> {
        self.row_height.filter(|_| !self.rows.is_empty())
    }

    fn set_spacer_height(&mut self, height: f64) {
        self.spacer_height = height;
    }

    fn render_rows(&mut self, offset_top: f64, rows: Vec<RenderedRow>) {
        self.offset_top = offset_top;
        self.rows = rows;
        self.render_count += 1;
    }

    fn set_scroll_top(&mut self, top: f64) {
        self.scroll_top = top;
    }

    fn set_toggle_label(&mut self, group_id: &str, label: &str) {
        let button = format!(r#"data-target-group="{group_id}">"#);
        for row in &mut self.rows {
            for current in ["+", "\u{2212}"] {
                let from = format!("{button}{current}</button>");
                if row.cells.contains(&from) {
                    row.cells = row.cells.replace(&from, &format!("{button}{label}</button>"));
                }
            }
        }
    }

    fn set_expand_all_label(&mut self, label: &str) {
        self.expand_all_label = label.to_string();
    }

    fn update_floating_header(&mut self, update: FloatingHeaderUpdate) {
        self.floating_header = Some(update);
    }

    fn remove_floating_header(&mut self) {
        self.floating_header = None;
    }
}
