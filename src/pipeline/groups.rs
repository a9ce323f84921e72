//! Staff-group detection from the tall vertical brackets in the left margin.

use image::RgbaImage;
use serde::Serialize;
use tracing::trace;

use super::annotate::{palette, AnnotationLayer};
use super::raster::{column_runs, mark_rows, occupied_spans, VerticalRun};
use crate::config::Thresholds;

/// A band of rows enclosed by one left-margin bracket (rows inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StaffGroup {
    pub start: u32,
    pub end: u32,
    /// Right-most column of any qualifying run overlapping the group.
    pub vertical_run_x: u32,
}

impl StaffGroup {
    pub fn height(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// Groups plus the raw runs they were built from. The runs are reused later
/// to place the blanking width and the left-margin line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupScan {
    pub groups: Vec<StaffGroup>,
    pub runs: Vec<VerticalRun>,
}

/// Scan columns `[0, floor(w · left_group_tolerance))` for line-dark runs of
/// at least `floor(h · min_vertical_run_fraction)` rows and coalesce the rows
/// they cover into groups of at least `floor(h · min_group_height_fraction)`.
pub fn detect_staff_groups(
    img: &RgbaImage,
    t: &Thresholds,
    mut annot: Option<&mut AnnotationLayer>,
) -> GroupScan {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return GroupScan::default();
    }
    let scan_w = fraction_of(w, t.left_group_tolerance).min(w);
    let min_run = fraction_of(h, t.min_vertical_run_fraction).max(1);
    let min_group = fraction_of(h, t.min_group_height_fraction).max(1);

    let mut occupied = vec![false; h as usize];
    let mut runs = Vec::new();
    for x in 0..scan_w {
        for run in column_runs(img, x, 0, h - 1, t.line_darkness, min_run) {
            mark_rows(&mut occupied, 0, &run);
            if let Some(layer) = annot.as_deref_mut() {
                layer.line(
                    x as f32,
                    run.start as f32,
                    x as f32,
                    run.end as f32,
                    palette::GROUP_RUN,
                    1.0,
                );
            }
            runs.push(run);
        }
    }

    let groups: Vec<StaffGroup> = occupied_spans(&occupied, 0, min_group)
        .into_iter()
        .map(|(start, end)| StaffGroup {
            start,
            end,
            vertical_run_x: runs
                .iter()
                .filter(|r| r.overlaps(start, end))
                .map(|r| r.x)
                .max()
                .unwrap_or_else(|| scan_w.saturating_sub(1)),
        })
        .collect();

    if let Some(layer) = annot {
        for g in &groups {
            layer.stroke_rect(
                0.0,
                g.start as f32,
                scan_w as f32,
                g.height() as f32,
                palette::GROUP_BOX,
                2.0,
            );
        }
    }

    trace!(groups = groups.len(), runs = runs.len(), "staff groups detected");
    GroupScan { groups, runs }
}

/// `floor(len · fraction)` for a pixel length.
pub(crate) fn fraction_of(len: u32, fraction: f32) -> u32 {
    (len as f32 * fraction).floor().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::raster::testing::{blank, ink};

    #[test]
    fn blank_page_has_no_groups() {
        let scan = detect_staff_groups(&blank(200, 300), &Thresholds::default(), None);
        assert!(scan.groups.is_empty());
        assert!(scan.runs.is_empty());
    }

    #[test]
    fn bracket_becomes_a_group() {
        let mut img = blank(200, 300);
        ink(&mut img, 5, 6, 40, 139);
        let scan = detect_staff_groups(&img, &Thresholds::default(), None);
        assert_eq!(
            scan.groups,
            vec![StaffGroup { start: 40, end: 139, vertical_run_x: 6 }]
        );
        assert_eq!(scan.runs.len(), 2);
    }

    #[test]
    fn short_runs_and_right_side_runs_are_ignored() {
        let mut img = blank(200, 300);
        // 29 rows: below floor(300 * 0.1) = 30.
        ink(&mut img, 5, 5, 10, 38);
        // Tall, but outside the left 20 %.
        ink(&mut img, 100, 100, 0, 299);
        let scan = detect_staff_groups(&img, &Thresholds::default(), None);
        assert!(scan.groups.is_empty());
    }

    #[test]
    fn separated_brackets_make_separate_groups() {
        let mut img = blank(200, 400);
        ink(&mut img, 3, 3, 20, 119);
        ink(&mut img, 8, 8, 200, 299);
        let scan = detect_staff_groups(&img, &Thresholds::default(), None);
        let bands: Vec<_> = scan.groups.iter().map(|g| (g.start, g.end)).collect();
        assert_eq!(bands, vec![(20, 119), (200, 299)]);
        assert_eq!(scan.groups[0].vertical_run_x, 3);
        assert_eq!(scan.groups[1].vertical_run_x, 8);
    }

    #[test]
    fn debug_layer_is_drawn_on() {
        let mut img = blank(200, 300);
        ink(&mut img, 5, 5, 40, 139);
        let mut layer = AnnotationLayer::from_image(&img).unwrap();
        let scan = detect_staff_groups(&img, &Thresholds::default(), Some(&mut layer));
        assert_eq!(scan.groups.len(), 1);
        assert_ne!(layer.into_image(), img);
    }
}
