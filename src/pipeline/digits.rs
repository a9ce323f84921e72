//! Fret-number detection by flood-filling ink blobs across a staff.

use image::RgbaImage;
use tracing::trace;

use super::annotate::{palette, AnnotationLayer};
use super::groups::fraction_of;
use super::raster::{Component, FillBounds, InkLabeler};
use super::staves::Staff;
use crate::config::Thresholds;

/// True if a component has the size and proportions of a fret digit.
pub fn is_digit_shaped(c: &Component, t: &Thresholds) -> bool {
    let (w, h) = (c.width(), c.height());
    let sized = (t.min_digit_width..=t.max_digit_width).contains(&w)
        && (t.min_digit_height..=t.max_digit_height).contains(&h);
    let elongated = w > h * t.max_aspect_ratio || h > w * t.max_aspect_ratio;
    sized && !elongated
}

/// Digit-shaped components seeded from the staff's own rows.
///
/// Seeds are taken from columns `[floor(w · left_ignore), floor(w ·
/// right_ignore))` and rows `start..=end`. A fill may spill
/// `staff_edge_digit_tolerance` rows above or below the staff so a digit
/// sitting on the outer line is measured whole.
pub fn detect_digits(
    img: &RgbaImage,
    staff: &Staff,
    t: &Thresholds,
    mut annot: Option<&mut AnnotationLayer>,
) -> Vec<Component> {
    let (w, h) = img.dimensions();
    if w == 0 || staff.start >= h {
        return Vec::new();
    }
    let x0 = fraction_of(w, t.left_ignore);
    let x1 = fraction_of(w, t.right_ignore).min(w);
    let tol = t.staff_edge_digit_tolerance;
    let bounds = FillBounds {
        x0,
        x1,
        y0: staff.start.saturating_sub(tol),
        y1: staff.end.saturating_add(tol).saturating_add(1),
    };
    let mut labeler = InkLabeler::new(img, bounds, t.luminance_threshold);

    let mut digits = Vec::new();
    for y in staff.start..=staff.end.min(h - 1) {
        for x in x0..x1 {
            let Some(comp) = labeler.fill_from(x, y) else {
                continue;
            };
            if !is_digit_shaped(&comp, t) {
                continue;
            }
            if let Some(layer) = annot.as_deref_mut() {
                layer.stroke_rect(
                    comp.min_x as f32,
                    comp.min_y as f32,
                    comp.width() as f32,
                    comp.height() as f32,
                    palette::DIGIT,
                    1.0,
                );
            }
            digits.push(comp);
        }
    }
    trace!(staff_start = staff.start, digits = digits.len(), "digit scan");
    digits
}
