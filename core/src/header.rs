//! Floating header kept in sync with the live table header
//!
//! The floating copy shows once the real header has scrolled above the
//! viewport while the table body is still on screen.

use crate::host::{FloatingHeaderUpdate, HeaderLayout, Rect, TableHost};

const DEFAULT_HEADER_HEIGHT: f64 = 40.0;

/// Placement of the floating header for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickyLayout {
    pub left: f64,
    pub width: f64,
    pub top: f64,
    pub bottom: f64,
    pub header_height: f64,
    pub show: bool,
    pub scroll_left: f64,
}

impl StickyLayout {
    /// `None` when the table has no usable width.
    pub fn compute(rect: Rect, header_height: f64, scroll_left: f64) -> Option<Self> {
        let header_height = if header_height > 0.0 { header_height } else { DEFAULT_HEADER_HEIGHT };
        let width = rect.width.round();
        if !width.is_finite() || width <= 0.0 {
            return None;
        }
        let (left, top, bottom) = (rect.left.round(), rect.top.round(), rect.bottom.round());
        Some(Self {
            left,
            width,
            top,
            bottom,
            header_height,
            show: top <= 0.0 && bottom > header_height,
            scroll_left: if scroll_left.is_finite() { scroll_left } else { 0.0 },
        })
    }
}

#[derive(Debug, Default)]
pub struct FloatingHeader {
    label_signature: Option<String>,
    last: Option<(f64, f64, bool)>,
}

impl FloatingHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure the live header and push an update to the host.
    pub fn sync<H: TableHost>(&mut self, host: &mut H) -> Option<FloatingHeaderUpdate> {
        let rect = host.table_rect()?;
        let layout = StickyLayout::compute(rect, host.header_height(), host.scroll_left())?;

        let labels: Vec<String> = host.header_labels().iter().map(|l| l.trim().to_string()).collect();
        let signature = labels.join("|");
        let reclone = if self.label_signature.as_deref() != Some(signature.as_str()) {
            self.label_signature = Some(signature);
            Some(labels)
        } else {
            None
        };

        let key = (layout.left, layout.width, layout.show);
        let layout_update = if self.last != Some(key) {
            self.last = Some(key);
            Some(HeaderLayout {
                left: layout.left,
                width: layout.width,
                column_widths: host.header_widths().into_iter().map(f64::round).collect(),
            })
        } else {
            None
        };

        let update = FloatingHeaderUpdate {
            visible: layout.show,
            reclone,
            layout: layout_update,
            translate_x: -layout.scroll_left,
        };
        host.update_floating_header(update.clone());
        Some(update)
    }

    pub fn unbind<H: TableHost>(&mut self, host: &mut H) {
        host.remove_floating_header();
        *self = Self::default();
    }
}
