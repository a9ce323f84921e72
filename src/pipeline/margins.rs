//! Margin resolution: which row bands of a page survive condensing.
//!
//! The plan produced here is pure data. Blanking and left-line redraws are
//! applied by [`super::compose`] when the condensed raster is assembled, so
//! analysis never mutates the source raster.
//!
//! All ranges are half-open (`top..bottom`). After [`MarginPlan::sections`]
//! they are sorted, pairwise disjoint and lie within the page.

use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, trace};

use super::annotate::{palette, AnnotationLayer};
use super::groups::{fraction_of, StaffGroup};
use super::page::PageAnalysis;
use super::raster::{is_marked, row_has, VerticalRun};
use super::staves::Staff;
use crate::config::Thresholds;

/// Half-open band of source rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarginRange {
    pub top: u32,
    pub bottom: u32,
}

impl MarginRange {
    pub fn new(top: u32, bottom: u32) -> Self {
        Self { top, bottom }
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.bottom <= self.top
    }

    pub fn contains_row(&self, y: u32) -> bool {
        y >= self.top && y < self.bottom
    }
}

/// Vertical line redrawn at the left edge of a group's surviving staves,
/// from `start_y` to `end_y` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeftMarginLine {
    pub x: u32,
    pub start_y: u32,
    pub end_y: u32,
}

/// Area `[0, width) × [top, bottom)` painted white before copying, hiding
/// bracket fragments between a kept staff and a dropped neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlankRegion {
    pub width: u32,
    pub top: u32,
    pub bottom: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarginPlan {
    /// One range per staff with notes.
    pub kept: Vec<MarginRange>,
    /// Connective sections above each group (titles, tempo marks, ...).
    pub between: Vec<MarginRange>,
    pub blanks: Vec<BlankRegion>,
    pub lines: Vec<LeftMarginLine>,
}

impl MarginPlan {
    /// True if at least one staff survived.
    pub fn has_content(&self) -> bool {
        !self.kept.is_empty()
    }

    /// Kept and connective ranges merged into output order.
    ///
    /// Overlaps are resolved by clipping each range's top to the previous
    /// range's bottom; ranges left empty are dropped.
    pub fn sections(&self) -> Vec<MarginRange> {
        let mut all: Vec<MarginRange> = self
            .kept
            .iter()
            .chain(&self.between)
            .copied()
            .filter(|r| !r.is_empty())
            .collect();
        all.sort();

        let mut out: Vec<MarginRange> = Vec::with_capacity(all.len());
        let mut cursor = 0;
        for r in all {
            let top = r.top.max(cursor);
            if r.bottom > top {
                out.push(MarginRange::new(top, r.bottom));
                cursor = r.bottom;
            }
        }
        out
    }
}

/// Build the margin plan for an analysed page.
pub fn resolve_margins(
    img: &RgbaImage,
    analysis: &PageAnalysis,
    t: &Thresholds,
    mut annot: Option<&mut AnnotationLayer>,
) -> MarginPlan {
    let (w, h) = img.dimensions();
    let mut plan = MarginPlan::default();
    let mut prev_tail: Option<u32> = None;

    for (group, staves) in analysis.groups.iter().zip(&analysis.staves) {
        let Some(first) = staves.first() else {
            continue;
        };
        let group_top = group.start.saturating_sub(t.min_top_margin_above_group);

        // Connective section between the previous group and this one.
        let section_start = prev_tail.unwrap_or(0).min(h);
        let section_end = first
            .start
            .saturating_sub(t.min_top_margin_above_group)
            .min(group_top)
            .max(section_start);
        let section_start = trim_leading_blank(img, section_start, section_end, t);
        let section = MarginRange::new(section_start, section_end);
        if !section.is_empty() {
            if let Some(layer) = annot.as_deref_mut() {
                stroke_band(layer, w, section, palette::CONNECTIVE);
            }
            plan.between.push(section);
        }

        // Kept margins, chained so each staff starts where the previous ended.
        let mut prev_bottom = group_top;
        for (i, staff) in staves.iter().enumerate() {
            let content_bottom = staff
                .end
                .saturating_add(t.content_tolerance_above_staff)
                .max(staff.stem_bottom().unwrap_or(0));
            let bottom = content_bottom
                .saturating_add(t.extra_bottom_padding)
                .saturating_add(1)
                .min(h);
            let margin = MarginRange::new(prev_bottom.min(staff.start), bottom);

            if i > 0 {
                let prev = &staves[i - 1];
                if !(prev.has_notes && staff.has_notes) {
                    let blank = BlankRegion {
                        width: (blanking_x(prev, group, &analysis.runs, w, t)
                            .max(blanking_x(staff, group, &analysis.runs, w, t))
                            + 2)
                        .min(w),
                        top: prev.end + 1,
                        bottom: staff.start,
                    };
                    if blank.bottom > blank.top {
                        if let Some(layer) = annot.as_deref_mut() {
                            layer.fill_rect(
                                0.0,
                                blank.top as f32,
                                blank.width as f32,
                                (blank.bottom - blank.top) as f32,
                                palette::BLANKED,
                            );
                        }
                        plan.blanks.push(blank);
                    }
                }
            }

            if staff.has_notes {
                if let Some(layer) = annot.as_deref_mut() {
                    stroke_band(layer, w, margin, palette::KEPT_MARGIN);
                }
                plan.kept.push(margin);
            }
            prev_bottom = bottom;
        }

        let group_tail = group.end.saturating_add(1).saturating_add(t.extra_bottom_padding);
        prev_tail = Some(prev_bottom.max(group_tail));

        if let Some(line) = left_margin_line(group, staves, &analysis.runs, w, t) {
            if let Some(layer) = annot.as_deref_mut() {
                draw_left_line(layer, &line, t);
            }
            plan.lines.push(line);
        }
    }

    debug!(
        kept = plan.kept.len(),
        between = plan.between.len(),
        blanks = plan.blanks.len(),
        "margins resolved"
    );
    plan
}

/// Move `start` down past blank rows, keeping `inbetween_bottom_trim` rows of
/// whitespace above the first marked row. A section with no marked row at all
/// collapses to that whitespace.
fn trim_leading_blank(img: &RgbaImage, start: u32, end: u32, t: &Thresholds) -> u32 {
    let first = (start..end)
        .find(|&y| row_has(img, y, |px| is_marked(px, t.near_white)))
        .unwrap_or(end);
    first.saturating_sub(t.inbetween_bottom_trim).max(start)
}

/// Right-most bracket column next to `staff`: runs covering the whole staff
/// first, then any run touching the group.
fn blanking_x(staff: &Staff, group: &StaffGroup, runs: &[VerticalRun], w: u32, t: &Thresholds) -> u32 {
    runs.iter()
        .filter(|r| r.covers(staff.start, staff.end))
        .map(|r| r.x)
        .max()
        .or_else(|| {
            runs.iter()
                .filter(|r| r.overlaps(group.start, group.end))
                .map(|r| r.x)
                .max()
        })
        .unwrap_or_else(|| fraction_of(w, t.left_group_tolerance).saturating_sub(1))
}

/// The line joining a group's surviving staves, or `None` if none survive.
///
/// Staves with stems count as surviving here even when they are not kept,
/// which keeps the line continuous across rhythm-only staves.
fn left_margin_line(
    group: &StaffGroup,
    staves: &[Staff],
    runs: &[VerticalRun],
    w: u32,
    t: &Thresholds,
) -> Option<LeftMarginLine> {
    let surviving: Vec<&Staff> = staves.iter().filter(|s| s.has_notes || s.has_stems).collect();
    let (first, last) = (*surviving.first()?, *surviving.last()?);
    let start_y = surviving.iter().map(|s| s.top_line).min()?;
    let end_y = surviving.iter().map(|s| s.bottom_line).max()?;

    let run_x = runs
        .iter()
        .filter(|r| r.covers(first.start, last.end))
        .map(|r| r.x)
        .max()
        .or_else(|| {
            runs.iter()
                .filter(|r| r.overlaps(group.start, group.end))
                .map(|r| r.x)
                .max()
        })
        .unwrap_or_else(|| fraction_of(w, t.left_group_tolerance));

    let line = LeftMarginLine {
        x: run_x
            .saturating_add(t.left_line_offset_px)
            .min(w.saturating_sub(1)),
        start_y,
        end_y,
    };
    trace!(?line, "left margin line");
    Some(line)
}

fn stroke_band(layer: &mut AnnotationLayer, w: u32, r: MarginRange, color: [u8; 4]) {
    layer.stroke_rect(0.0, r.top as f32, w as f32, r.height() as f32, color, 2.0);
}

fn draw_left_line(layer: &mut AnnotationLayer, line: &LeftMarginLine, t: &Thresholds) {
    let shade_w = line.x.saturating_sub(t.left_line_offset_px);
    let height = line.end_y.saturating_sub(line.start_y) + 1;
    layer.fill_rect(0.0, line.start_y as f32, shade_w as f32, height as f32, palette::LEFT_SHADE);
    layer.fill_rect(line.x as f32, line.start_y as f32, 1.0, height as f32, palette::LEFT_LINE);
    layer.dot(line.x as f32 + 0.5, line.start_y as f32 + 0.5, 3.0, palette::LEFT_LINE);
    layer.dot(line.x as f32 + 0.5, line.end_y as f32 + 0.5, 3.0, palette::LEFT_LINE);
}
