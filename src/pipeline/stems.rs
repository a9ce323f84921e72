//! Rhythm-stem detection in the band below a staff.

use image::RgbaImage;
use tracing::trace;

use super::annotate::{palette, AnnotationLayer};
use super::groups::fraction_of;
use super::raster::{Component, FillBounds, InkLabeler};
use super::staves::Staff;
use crate::config::Thresholds;

/// Tall ink components hanging below `staff`.
///
/// Seeds come from rows `end ..= min(end + extra_bottom_scan,
/// next_staff_top - 1)`; fills are confined to `[end, next_staff_top)` so a
/// stem can never reach into the following staff.
pub fn detect_stems(
    img: &RgbaImage,
    staff: &Staff,
    next_staff_top: u32,
    t: &Thresholds,
    mut annot: Option<&mut AnnotationLayer>,
) -> Vec<Component> {
    let (w, h) = img.dimensions();
    let floor = next_staff_top.min(h);
    if w == 0 || staff.end >= floor {
        return Vec::new();
    }
    let x0 = fraction_of(w, t.left_ignore);
    let x1 = fraction_of(w, t.right_ignore).min(w);
    let seed_bottom = staff
        .end
        .saturating_add(t.extra_bottom_scan)
        .min(floor - 1);
    let bounds = FillBounds {
        x0,
        x1,
        y0: staff.end,
        y1: floor,
    };
    let mut labeler = InkLabeler::new(img, bounds, t.luminance_threshold);

    let mut stems = Vec::new();
    for x in x0..x1 {
        for y in staff.end..=seed_bottom {
            let Some(comp) = labeler.fill_from(x, y) else {
                continue;
            };
            if comp.height() < t.min_stem_height_px {
                continue;
            }
            if let Some(layer) = annot.as_deref_mut() {
                layer.fill_rect(
                    comp.min_x as f32,
                    comp.min_y as f32,
                    comp.width() as f32,
                    comp.height() as f32,
                    palette::STEM,
                );
            }
            stems.push(comp);
        }
    }
    trace!(staff_end = staff.end, stems = stems.len(), "stem scan");
    stems
}
