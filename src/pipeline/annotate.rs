//! Debug overlay drawing.
//!
//! Detectors always read the pristine page raster. In debug mode the
//! orchestrator additionally hands them an [`AnnotationLayer`], a tiny-skia
//! copy of the page they draw their findings onto. The layer is converted back
//! into an [`RgbaImage`] when analysis is done.

use image::RgbaImage;
use tiny_skia::{
    Color, FillRule, IntSize, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform,
};

/// RGBA colour, straight (not premultiplied) alpha.
pub type Rgba8 = [u8; 4];

/// Overlay palette.
pub mod palette {
    use super::Rgba8;

    pub const GROUP_RUN: Rgba8 = [255, 215, 0, 255];
    pub const GROUP_BOX: Rgba8 = [0, 255, 255, 255];
    pub const STAFF_LINE: Rgba8 = [255, 215, 0, 255];
    pub const DIGIT: Rgba8 = [0, 200, 0, 255];
    pub const STEM: Rgba8 = [128, 0, 128, 255];
    pub const HAS_NOTES: Rgba8 = [0, 200, 0, 255];
    pub const NO_NOTES: Rgba8 = [220, 0, 0, 255];
    pub const KEPT_MARGIN: Rgba8 = [255, 140, 0, 255];
    pub const CONNECTIVE: Rgba8 = [0, 128, 128, 255];
    pub const BLANKED: Rgba8 = [255, 0, 255, 77];
    pub const LEFT_LINE: Rgba8 = [0, 0, 0, 255];
    pub const LEFT_SHADE: Rgba8 = [0, 0, 0, 15];
    pub const LINE_SHADE: Rgba8 = [0, 0, 255, 26];
    pub const ENDPOINT: Rgba8 = [0, 0, 139, 255];
    pub const BOUNDARY: Rgba8 = [255, 0, 0, 64];
}

/// Mutable drawing surface mirroring one page.
pub struct AnnotationLayer {
    pixmap: Pixmap,
}

impl AnnotationLayer {
    /// Copy `img` into a new layer. `None` for an empty image.
    pub fn from_image(img: &RgbaImage) -> Option<Self> {
        let size = IntSize::from_wh(img.width(), img.height())?;
        let mut data = img.as_raw().clone();
        // tiny-skia stores premultiplied alpha.
        for px in data.chunks_exact_mut(4) {
            let a = px[3] as u16;
            if a < 255 {
                for c in &mut px[..3] {
                    *c = ((*c as u16 * a + 127) / 255) as u8;
                }
            }
        }
        Pixmap::from_vec(data, size).map(|pixmap| Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Fill the axis-aligned box with a (possibly translucent) colour.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba8) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.pixmap
                .fill_rect(rect, &paint(color), Transform::identity(), None);
        }
    }

    /// Outline a box.
    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba8, width: f32) {
        let Some(rect) = Rect::from_xywh(x, y, w, h) else {
            return;
        };
        let path = PathBuilder::from_rect(rect);
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
    }

    /// Straight line between pixel centres.
    pub fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgba8, width: f32) {
        let mut pb = PathBuilder::new();
        pb.move_to(x0 + 0.5, y0 + 0.5);
        pb.line_to(x1 + 0.5, y1 + 0.5);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
    }

    pub fn dot(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba8) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.pixmap.fill_path(
                &path,
                &paint(color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    /// Draw `text` with the built-in 3×5 glyphs, each cell `scale` pixels.
    ///
    /// Only digits, `o` and `:` have glyphs; other characters advance the pen
    /// without drawing.
    pub fn label(&mut self, x: f32, y: f32, text: &str, color: Rgba8, scale: f32) {
        let mut pen = x;
        for ch in text.chars() {
            if let Some(rows) = glyph(ch) {
                for (ry, bits) in rows.iter().enumerate() {
                    for rx in 0..3 {
                        if bits & (0b100 >> rx) != 0 {
                            self.fill_rect(
                                pen + rx as f32 * scale,
                                y + ry as f32 * scale,
                                scale,
                                scale,
                                color,
                            );
                        }
                    }
                }
            }
            pen += 4.0 * scale;
        }
    }

    /// Convert back into a straight-alpha image.
    pub fn into_image(self) -> RgbaImage {
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let mut raw = Vec::with_capacity((w * h * 4) as usize);
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        // Dimensions come from the pixmap itself, so the buffer always fits.
        RgbaImage::from_raw(w, h, raw).unwrap_or_else(|| RgbaImage::new(w, h))
    }
}

fn paint(color: Rgba8) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    paint.anti_alias = false;
    paint
}

fn glyph(ch: char) -> Option<[u8; 5]> {
    Some(match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'o' => [0b000, 0b111, 0b101, 0b111, 0b000],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        _ => return None,
    })
}
