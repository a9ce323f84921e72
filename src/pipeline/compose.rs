//! Assembling the condensed raster from kept row sections.

use image::{Rgba, RgbaImage};

use super::annotate::{palette, AnnotationLayer};
use super::margins::{BlankRegion, LeftMarginLine, MarginRange};
use crate::error::PageError;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Everything needed to build one condensed page.
#[derive(Debug, Clone, Copy)]
pub struct ComposeRequest<'a> {
    pub page_num: usize,
    pub source: &'a RgbaImage,
    /// Sorted, disjoint ranges, see [`super::margins::MarginPlan::sections`].
    pub sections: &'a [MarginRange],
    pub blanks: &'a [BlankRegion],
    pub lines: &'a [LeftMarginLine],
    /// Overlay line shading, endpoint markers and section boundaries. Set
    /// from `RenderOptions::annotate_condensed`.
    pub debug: bool,
}

/// A left-line segment as placed in the output.
#[derive(Debug, Clone, Copy)]
struct PlacedSegment {
    x: u32,
    src_top: u32,
    src_bottom: u32,
    dest_top: u32,
    dest_bottom: u32,
}

/// Stack `sections` of the source into a new raster.
///
/// The output is exactly as wide as the source and exactly as tall as the sum
/// of the section heights. Blank regions are whitened and left-margin lines
/// are redrawn as 1-px black columns, clipped to each section.
pub fn render_condensed(req: &ComposeRequest<'_>) -> Result<RgbaImage, PageError> {
    let src = req.source;
    let (w, h) = src.dimensions();
    let fail = |detail: String| PageError::ComposeFailed {
        page: req.page_num,
        detail,
    };

    let mut cursor = 0;
    for s in req.sections {
        if s.is_empty() || s.top < cursor || s.bottom > h {
            return Err(fail(format!(
                "section {}..{} is empty, out of order or outside 0..{h}",
                s.top, s.bottom
            )));
        }
        cursor = s.bottom;
    }
    let total: u32 = req.sections.iter().map(MarginRange::height).sum();
    if total == 0 {
        return Err(fail("no rows to keep".into()));
    }

    let row_bytes = w as usize * 4;
    let mut raw = Vec::with_capacity(total as usize * row_bytes);
    for s in req.sections {
        raw.extend_from_slice(&src.as_raw()[s.top as usize * row_bytes..s.bottom as usize * row_bytes]);
    }
    let mut out = RgbaImage::from_raw(w, total, raw)
        .ok_or_else(|| fail(format!("buffer does not fit {w}x{total}")))?;

    let mut segments = Vec::new();
    let mut offset = 0;
    for s in req.sections {
        for b in req.blanks {
            let top = b.top.max(s.top);
            let bottom = b.bottom.min(s.bottom);
            for y in top..bottom {
                for x in 0..b.width.min(w) {
                    out.put_pixel(x, offset + (y - s.top), WHITE);
                }
            }
        }
        for line in req.lines {
            let top = line.start_y.max(s.top);
            let bottom = line.end_y.min(s.bottom - 1);
            if top > bottom || line.x >= w {
                continue;
            }
            for y in top..=bottom {
                out.put_pixel(line.x, offset + (y - s.top), BLACK);
            }
            segments.push(PlacedSegment {
                x: line.x,
                src_top: top,
                src_bottom: bottom,
                dest_top: offset + (top - s.top),
                dest_bottom: offset + (bottom - s.top),
            });
        }
        offset += s.height();
    }

    if req.debug {
        out = overlay_debug(out, req.sections, &segments);
    }
    Ok(out)
}

fn overlay_debug(out: RgbaImage, sections: &[MarginRange], segments: &[PlacedSegment]) -> RgbaImage {
    let Some(mut layer) = AnnotationLayer::from_image(&out) else {
        return out;
    };
    for seg in segments {
        let height = (seg.dest_bottom - seg.dest_top + 1) as f32;
        layer.fill_rect(0.0, seg.dest_top as f32, seg.x as f32, height, palette::LINE_SHADE);
        for y in [seg.dest_top, seg.dest_bottom] {
            layer.fill_rect(seg.x as f32 - 3.0, y as f32 - 3.0, 6.0, 6.0, palette::ENDPOINT);
        }
        let label_x = seg.x as f32 + 6.0;
        layer.label(label_x, seg.dest_top as f32, &format!("o:{}", seg.src_top), palette::ENDPOINT, 1.0);
        layer.label(
            label_x,
            seg.dest_bottom as f32 - 5.0,
            &format!("o:{}", seg.src_bottom),
            palette::ENDPOINT,
            1.0,
        );
    }
    let mut offset = 0;
    for s in sections {
        let y = offset as f32;
        layer.line(0.0, y, layer.width() as f32 - 1.0, y, palette::BOUNDARY, 1.0);
        offset += s.height();
    }
    layer.into_image()
}
