//! Individual staff detection inside a group, from the right-edge ticks.

use image::RgbaImage;
use serde::Serialize;
use tracing::trace;

use super::annotate::{palette, AnnotationLayer};
use super::groups::{fraction_of, StaffGroup};
use super::raster::{column_runs, is_line_dark, mark_rows, occupied_spans, Component};
use crate::config::Thresholds;

/// One tablature staff (rows inclusive).
///
/// `top_line`/`bottom_line` are the outermost line-dark rows seen in the
/// right-edge scan columns, which is where the staff lines actually start and
/// stop. The classification flags are filled in by the page analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Staff {
    pub start: u32,
    pub end: u32,
    pub top_line: u32,
    pub bottom_line: u32,
    pub has_digits: bool,
    pub has_stems: bool,
    pub has_notes: bool,
    /// Accepted stem components below the staff.
    pub stems: Vec<Component>,
}

impl Staff {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            top_line: start,
            bottom_line: end,
            has_digits: false,
            has_stems: false,
            has_notes: false,
            stems: Vec::new(),
        }
    }

    /// Lowest row reached by any accepted stem.
    pub fn stem_bottom(&self) -> Option<u32> {
        self.stems.iter().map(|c| c.max_y).max()
    }
}

/// Find the staves of `group` by scanning columns from
/// `floor(w · staff_scan_start)` to the right edge.
pub fn detect_staves(
    img: &RgbaImage,
    group: &StaffGroup,
    t: &Thresholds,
    annot: Option<&mut AnnotationLayer>,
) -> Vec<Staff> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || group.start >= h {
        return Vec::new();
    }
    let end = group.end.min(h - 1);
    let scan_x = fraction_of(w, t.staff_scan_start).min(w);
    let min_run = fraction_of(group.height(), t.staff_run_fraction).max(1);

    let mut occupied = vec![false; (end - group.start + 1) as usize];
    for x in scan_x..w {
        for run in column_runs(img, x, group.start, end, t.line_darkness, min_run) {
            mark_rows(&mut occupied, group.start, &run);
        }
    }

    let staves: Vec<Staff> = occupied_spans(&occupied, group.start, t.min_staff_height_px.max(1))
        .into_iter()
        .map(|(start, end)| {
            let mut staff = Staff::new(start, end);
            let mut lines: Option<(u32, u32)> = None;
            for y in start..=end {
                if (scan_x..w).any(|x| is_line_dark(img.get_pixel(x, y), t.line_darkness)) {
                    lines = Some(lines.map_or((y, y), |(top, _)| (top, y)));
                }
            }
            if let Some((top, bottom)) = lines {
                staff.top_line = top;
                staff.bottom_line = bottom;
            }
            staff
        })
        .collect();

    if let Some(layer) = annot {
        for s in &staves {
            let y = s.top_line as f32;
            layer.line(0.0, y, (w - 1) as f32, y, palette::STAFF_LINE, 1.0);
        }
    }

    trace!(
        group_start = group.start,
        staves = staves.len(),
        "staves detected"
    );
    staves
}
