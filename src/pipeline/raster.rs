//! Pixel primitives shared by the detectors.
//!
//! Two notions of "dark" coexist on a rendered page:
//!
//! * **line-dark**: every RGB channel below `line_darkness`. Used for
//!   brackets, staff ticks and footer rows, where anti-aliased grey edges must
//!   not lengthen a run.
//! * **ink**: weighted luminance below `luminance_threshold`. Used for glyph
//!   and stem flood fills, which need the softer edges to keep a digit in one
//!   piece.

use image::{Rgba, RgbaImage};
use serde::Serialize;

/// Maximal vertical span of line-dark pixels in one column (rows inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerticalRun {
    pub x: u32,
    pub start: u32,
    pub end: u32,
}

impl VerticalRun {
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// True if the run spans every row of `[top, bottom]`.
    pub fn covers(&self, top: u32, bottom: u32) -> bool {
        self.start <= top && self.end >= bottom
    }

    /// True if the run shares at least one row with `[top, bottom]`.
    pub fn overlaps(&self, top: u32, bottom: u32) -> bool {
        !(self.end < top || self.start > bottom)
    }
}

/// Bounding box of one flood-filled ink region (inclusive on all sides).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Component {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl Component {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

#[inline]
pub fn luminance(px: &Rgba<u8>) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

#[inline]
pub fn is_line_dark(px: &Rgba<u8>, threshold: u8) -> bool {
    px[0] < threshold && px[1] < threshold && px[2] < threshold
}

#[inline]
pub fn is_ink(px: &Rgba<u8>, threshold: f32) -> bool {
    luminance(px) < threshold
}

/// Visible and not (near) white.
#[inline]
pub fn is_marked(px: &Rgba<u8>, near_white: u8) -> bool {
    px[3] > 0 && (px[0] < near_white || px[1] < near_white || px[2] < near_white)
}

/// True if any pixel of row `y` satisfies `pred`.
pub fn row_has(img: &RgbaImage, y: u32, pred: impl Fn(&Rgba<u8>) -> bool) -> bool {
    (0..img.width()).any(|x| pred(img.get_pixel(x, y)))
}

/// Line-dark runs of column `x` within rows `[top, bottom]` at least
/// `min_len` rows long.
pub fn column_runs(
    img: &RgbaImage,
    x: u32,
    top: u32,
    bottom: u32,
    threshold: u8,
    min_len: u32,
) -> Vec<VerticalRun> {
    let mut runs = Vec::new();
    if img.height() == 0 || x >= img.width() {
        return runs;
    }
    let bottom = bottom.min(img.height() - 1);
    let mut run_start: Option<u32> = None;

    for y in top..=bottom {
        let dark = is_line_dark(img.get_pixel(x, y), threshold);
        match (dark, run_start) {
            (true, None) => run_start = Some(y),
            (false, Some(start)) => {
                push_run(&mut runs, x, start, y - 1, min_len);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        push_run(&mut runs, x, start, bottom, min_len);
    }
    runs
}

fn push_run(runs: &mut Vec<VerticalRun>, x: u32, start: u32, end: u32, min_len: u32) {
    let run = VerticalRun { x, start, end };
    if run.len() >= min_len {
        runs.push(run);
    }
}

/// Mark the rows of `run` in an occupancy array whose index 0 is row `origin`.
pub fn mark_rows(occupied: &mut [bool], origin: u32, run: &VerticalRun) {
    let from = (run.start - origin) as usize;
    let to = (run.end - origin) as usize;
    for row in &mut occupied[from..=to] {
        *row = true;
    }
}

/// Contiguous occupied spans at least `min_len` rows tall, as inclusive
/// `(start, end)` rows offset by `origin`.
pub fn occupied_spans(occupied: &[bool], origin: u32, min_len: u32) -> Vec<(u32, u32)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &on) in occupied.iter().enumerate() {
        match (on, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if (i - s) as u32 >= min_len {
                    spans.push((origin + s as u32, origin + i as u32 - 1));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if (occupied.len() - s) as u32 >= min_len {
            spans.push((origin + s as u32, origin + occupied.len() as u32 - 1));
        }
    }
    spans
}

/// Half-open pixel window a flood fill may not leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillBounds {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
}

impl FillBounds {
    #[inline]
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    fn area(&self) -> usize {
        (self.x1.saturating_sub(self.x0) as usize) * (self.y1.saturating_sub(self.y0) as usize)
    }
}

/// Labels 4-connected ink components inside a window.
///
/// The fill is iterative over an explicit stack; a page-sized blob cannot
/// overflow the call stack. Each ink pixel is labelled at most once, so all
/// fills through one labeler cost O(window area).
pub struct InkLabeler<'a> {
    img: &'a RgbaImage,
    bounds: FillBounds,
    threshold: f32,
    visited: Vec<bool>,
}

impl<'a> InkLabeler<'a> {
    pub fn new(img: &'a RgbaImage, bounds: FillBounds, threshold: f32) -> Self {
        let bounds = FillBounds {
            x1: bounds.x1.min(img.width()),
            y1: bounds.y1.min(img.height()),
            ..bounds
        };
        Self {
            img,
            bounds,
            threshold,
            visited: vec![false; bounds.area()],
        }
    }

    #[inline]
    fn slot(&self, x: u32, y: u32) -> usize {
        let w = (self.bounds.x1 - self.bounds.x0) as usize;
        (y - self.bounds.y0) as usize * w + (x - self.bounds.x0) as usize
    }

    /// Fill the component containing `(x, y)`.
    ///
    /// Returns `None` when the seed is outside the window, not ink, or
    /// already part of an earlier component.
    pub fn fill_from(&mut self, x: u32, y: u32) -> Option<Component> {
        if !self.bounds.contains(x, y)
            || self.visited[self.slot(x, y)]
            || !is_ink(self.img.get_pixel(x, y), self.threshold)
        {
            return None;
        }

        let mut comp = Component {
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        };
        let mut stack = vec![(x, y)];

        while let Some((cx, cy)) = stack.pop() {
            let slot = self.slot(cx, cy);
            if self.visited[slot] || !is_ink(self.img.get_pixel(cx, cy), self.threshold) {
                continue;
            }
            self.visited[slot] = true;
            comp.min_x = comp.min_x.min(cx);
            comp.max_x = comp.max_x.max(cx);
            comp.min_y = comp.min_y.min(cy);
            comp.max_y = comp.max_y.max(cy);

            let neighbours = [
                (cx.checked_sub(1), Some(cy)),
                (cx.checked_add(1), Some(cy)),
                (Some(cx), cy.checked_sub(1)),
                (Some(cx), cy.checked_add(1)),
            ];
            for (nx, ny) in neighbours {
                if let (Some(nx), Some(ny)) = (nx, ny) {
                    if self.bounds.contains(nx, ny) {
                        stack.push((nx, ny));
                    }
                }
            }
        }
        Some(comp)
    }
}
