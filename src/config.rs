//! Configuration types for staff condensing.
//!
//! All behaviour is controlled through [`CondenseConfig`], built via its
//! [`CondenseConfigBuilder`]. The detector knobs live in [`Thresholds`],
//! calibrated against pages rendered at [`BASE_SCALE`]; every pixel-valued
//! knob is rescaled proportionally when a page is rendered at another scale,
//! so one set of numbers works at any zoom.

use crate::error::CondenseError;
use crate::progress::{AbortSignal, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Render scale at which the default [`Thresholds`] were measured.
pub const BASE_SCALE: f32 = 1.5;

/// Upper bound on any pixel-valued threshold, at [`BASE_SCALE`].
pub const MAX_THRESHOLD_PX: u32 = 4000;

/// Configuration for condensing one PDF.
///
/// # Example
/// ```rust
/// use score_condenser::{CondenseConfig, RenderMode};
///
/// let config = CondenseConfig::builder()
///     .scale(2.0)
///     .mode(RenderMode::Normal)
///     .build()
///     .unwrap();
/// assert_eq!(config.render_options().thresholds.min_staff_height_px, 33);
/// ```
#[derive(Clone)]
pub struct CondenseConfig {
    /// Page render scale (1.0 = 72 DPI). Range: 0.25–6.0. Default: 1.5.
    pub scale: f32,

    /// Which output is produced and which cache bucket is used. Default: Normal.
    pub mode: RenderMode,

    /// Detector thresholds expressed at [`BASE_SCALE`].
    pub thresholds: Thresholds,

    /// Cap on either rendered dimension, in pixels. Default: 8000.
    pub max_rendered_pixels: u32,

    /// Normal mode only: mark section seams and redrawn left-margin lines on
    /// the condensed page. Default: false.
    pub annotate_condensed: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Optional per-page event sink.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation flag, checked before each page.
    pub abort: Option<AbortSignal>,
}

impl Default for CondenseConfig {
    fn default() -> Self {
        Self {
            scale: BASE_SCALE,
            mode: RenderMode::default(),
            thresholds: Thresholds::default(),
            max_rendered_pixels: 8000,
            annotate_condensed: false,
            password: None,
            pages: PageSelection::default(),
            progress_callback: None,
            abort: None,
        }
    }
}

impl fmt::Debug for CondenseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondenseConfig")
            .field("scale", &self.scale)
            .field("mode", &self.mode)
            .field("thresholds", &self.thresholds)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("annotate_condensed", &self.annotate_condensed)
            .field("pages", &self.pages)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn CondenseProgressCallback>"),
            )
            .field("abort", &self.abort)
            .finish()
    }
}

impl CondenseConfig {
    /// Create a new builder for `CondenseConfig`.
    pub fn builder() -> CondenseConfigBuilder {
        CondenseConfigBuilder {
            config: Self::default(),
        }
    }

    /// Options handed to the per-page pipeline, with thresholds already
    /// rescaled to `self.scale`.
    pub fn render_options(&self) -> RenderOptions {
        self.options_at(self.scale)
    }

    /// Options for a raster `raster_width` pixels wide of a page that is
    /// `page_width_pt` points wide.
    ///
    /// When the render cap shrank the page, the thresholds follow the scale
    /// the page was actually drawn at. Rounding differences under one
    /// percent keep the nominal scale.
    pub fn options_for_raster(&self, raster_width: u32, page_width_pt: Option<f32>) -> RenderOptions {
        let actual = match page_width_pt {
            Some(pt) if pt > 0.0 && raster_width > 0 => raster_width as f32 / pt,
            _ => return self.render_options(),
        };
        if (actual - self.scale).abs() <= self.scale * 0.01 {
            self.render_options()
        } else {
            self.options_at(actual)
        }
    }

    fn options_at(&self, scale: f32) -> RenderOptions {
        RenderOptions {
            mode: self.mode,
            scale,
            thresholds: self.thresholds.scaled(scale),
            annotate_condensed: self.annotate_condensed,
        }
    }

    /// True once the caller has raised the abort flag.
    pub fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

/// Builder for [`CondenseConfig`].
#[derive(Debug)]
pub struct CondenseConfigBuilder {
    config: CondenseConfig,
}

impl CondenseConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn decision_policy(mut self, policy: DecisionPolicy) -> Self {
        self.config.thresholds.decision_policy = policy;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn annotate_condensed(mut self, yes: bool) -> Self {
        self.config.annotate_condensed = yes;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.config.abort = Some(signal);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CondenseConfig, CondenseError> {
        let c = &self.config;
        if !(0.25..=6.0).contains(&c.scale) {
            return Err(CondenseError::InvalidConfig(format!(
                "scale must be 0.25–6.0, got {}",
                c.scale
            )));
        }
        c.thresholds.validate()?;
        Ok(self.config)
    }
}

// ── Render options ───────────────────────────────────────────────────────

/// Explicit per-run options consumed by the page pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    pub scale: f32,
    /// Thresholds in pixels of the rendered page (already scaled).
    pub thresholds: Thresholds,
    /// Draw seams and line segments on condensed pages.
    pub annotate_condensed: bool,
}

impl RenderOptions {
    /// Options for a page rendered at `scale` with default thresholds.
    pub fn at_scale(mode: RenderMode, scale: f32) -> Self {
        Self {
            mode,
            scale,
            thresholds: Thresholds::default().scaled(scale),
            annotate_condensed: false,
        }
    }

    /// Whether detectors should draw annotation overlays.
    pub fn debug(&self) -> bool {
        self.mode == RenderMode::Debug
    }
}

/// Output produced for each page, and the cache bucket it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Empty staves removed, pages shortened. (default)
    #[default]
    Normal,
    /// Uncondensed page with detector overlays drawn on top.
    Debug,
    /// Raw page, no analysis.
    Original,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderMode::Normal => "normal",
            RenderMode::Debug => "debug",
            RenderMode::Original => "original",
        };
        f.write_str(name)
    }
}

/// How a staff is classified as carrying music.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Only tab-number glyphs count. (default)
    #[default]
    DigitsOnly,
    /// Tab numbers or note stems below the staff count.
    DigitsOrStems,
}

impl DecisionPolicy {
    pub fn has_notes(self, has_digits: bool, has_stems: bool) -> bool {
        match self {
            DecisionPolicy::DigitsOnly => has_digits,
            DecisionPolicy::DigitsOrStems => has_digits || has_stems,
        }
    }
}

// ── Thresholds ───────────────────────────────────────────────────────────

/// Detector tuning knobs.
///
/// Fields suffixed or documented as pixels are rescaled by
/// [`Thresholds::scaled`]; fractions, luminance levels and flags are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fraction of page width ignored on the left by glyph scans.
    pub left_ignore: f32,
    /// Fraction of page width where glyph scans stop.
    pub right_ignore: f32,
    /// Weighted luminance below which a pixel is ink for glyph scans.
    pub luminance_threshold: f32,
    /// Every RGB channel below this marks a pixel dark for line scans.
    pub line_darkness: u8,
    /// Any RGB channel below this marks a row as non-blank.
    pub near_white: u8,
    /// Pixels.
    pub min_stem_height_px: u32,
    /// Pixels scanned below a staff for stems.
    pub extra_bottom_scan: u32,
    /// Pixels kept below a staff's content.
    pub extra_bottom_padding: u32,
    pub min_digit_width: u32,
    pub min_digit_height: u32,
    pub max_digit_width: u32,
    pub max_digit_height: u32,
    /// Components longer than this ratio in either direction are lines.
    pub max_aspect_ratio: u32,
    pub min_staff_height_px: u32,
    pub content_tolerance_above_staff: u32,
    /// Blank rows kept above the first ink row of a connective section.
    pub inbetween_bottom_trim: u32,
    /// Fraction of page width scanned for group brackets.
    pub left_group_tolerance: f32,
    /// Pixels above and below a staff a digit may overflow into.
    pub staff_edge_digit_tolerance: u32,
    /// Pixels between the detected bracket and the redrawn line.
    pub left_line_offset_px: u32,
    pub min_top_margin_above_group: u32,
    /// Fraction of page height a group must span.
    pub min_group_height_fraction: f32,
    /// Fraction of page height a bracket run must span.
    pub min_vertical_run_fraction: f32,
    /// Fraction of group height a staff tick must span.
    pub staff_run_fraction: f32,
    /// Fraction of page width where staff tick scans start.
    pub staff_scan_start: f32,
    /// Rows skipped below the last staff before looking for a footer.
    pub footer_skip_rows: u32,
    /// White rows placed above the extracted footer.
    pub footer_top_padding: u32,
    pub decision_policy: DecisionPolicy,
    /// Scan for stems even on staves without digits.
    pub find_stems_without_digits: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            left_ignore: 0.05,
            right_ignore: 0.95,
            luminance_threshold: 200.0,
            line_darkness: 150,
            near_white: 250,
            min_stem_height_px: 8,
            extra_bottom_scan: 14,
            extra_bottom_padding: 2,
            min_digit_width: 4,
            min_digit_height: 7,
            max_digit_width: 20,
            max_digit_height: 20,
            max_aspect_ratio: 4,
            min_staff_height_px: 25,
            content_tolerance_above_staff: 4,
            inbetween_bottom_trim: 2,
            left_group_tolerance: 0.2,
            staff_edge_digit_tolerance: 4,
            left_line_offset_px: 1,
            min_top_margin_above_group: 2,
            min_group_height_fraction: 0.1,
            min_vertical_run_fraction: 0.1,
            staff_run_fraction: 0.05,
            staff_scan_start: 0.9,
            footer_skip_rows: 2,
            footer_top_padding: 40,
            decision_policy: DecisionPolicy::default(),
            find_stems_without_digits: false,
        }
    }
}

impl Thresholds {
    /// Rescale every pixel-valued field from [`BASE_SCALE`] to `scale`.
    pub fn scaled(&self, scale: f32) -> Self {
        let factor = scale / BASE_SCALE;
        let px = |v: u32| (v as f32 * factor).round().max(0.0) as u32;
        Self {
            min_stem_height_px: px(self.min_stem_height_px),
            extra_bottom_scan: px(self.extra_bottom_scan),
            extra_bottom_padding: px(self.extra_bottom_padding),
            min_digit_width: px(self.min_digit_width),
            min_digit_height: px(self.min_digit_height),
            max_digit_width: px(self.max_digit_width),
            max_digit_height: px(self.max_digit_height),
            min_staff_height_px: px(self.min_staff_height_px),
            content_tolerance_above_staff: px(self.content_tolerance_above_staff),
            inbetween_bottom_trim: px(self.inbetween_bottom_trim),
            staff_edge_digit_tolerance: px(self.staff_edge_digit_tolerance),
            left_line_offset_px: px(self.left_line_offset_px),
            min_top_margin_above_group: px(self.min_top_margin_above_group),
            footer_skip_rows: px(self.footer_skip_rows),
            footer_top_padding: px(self.footer_top_padding),
            ..self.clone()
        }
    }

    /// Reject combinations the detectors cannot work with.
    pub fn validate(&self) -> Result<(), CondenseError> {
        let fractions = [
            ("left_ignore", self.left_ignore),
            ("right_ignore", self.right_ignore),
            ("left_group_tolerance", self.left_group_tolerance),
            ("min_group_height_fraction", self.min_group_height_fraction),
            ("min_vertical_run_fraction", self.min_vertical_run_fraction),
            ("staff_run_fraction", self.staff_run_fraction),
            ("staff_scan_start", self.staff_scan_start),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(CondenseError::InvalidConfig(format!(
                    "{name} must be a fraction in 0–1, got {value}"
                )));
            }
        }
        let pixels = [
            ("min_stem_height_px", self.min_stem_height_px),
            ("extra_bottom_scan", self.extra_bottom_scan),
            ("extra_bottom_padding", self.extra_bottom_padding),
            ("max_digit_width", self.max_digit_width),
            ("max_digit_height", self.max_digit_height),
            ("min_staff_height_px", self.min_staff_height_px),
            ("content_tolerance_above_staff", self.content_tolerance_above_staff),
            ("inbetween_bottom_trim", self.inbetween_bottom_trim),
            ("staff_edge_digit_tolerance", self.staff_edge_digit_tolerance),
            ("left_line_offset_px", self.left_line_offset_px),
            ("min_top_margin_above_group", self.min_top_margin_above_group),
            ("footer_skip_rows", self.footer_skip_rows),
            ("footer_top_padding", self.footer_top_padding),
        ];
        for (name, value) in pixels {
            if value > MAX_THRESHOLD_PX {
                return Err(CondenseError::InvalidConfig(format!(
                    "{name} must be at most {MAX_THRESHOLD_PX} px, got {value}"
                )));
            }
        }
        if self.left_ignore >= self.right_ignore {
            return Err(CondenseError::InvalidConfig(format!(
                "left_ignore ({}) must be below right_ignore ({})",
                self.left_ignore, self.right_ignore
            )));
        }
        if self.min_digit_width > self.max_digit_width
            || self.min_digit_height > self.max_digit_height
        {
            return Err(CondenseError::InvalidConfig(
                "minimum digit size exceeds maximum digit size".into(),
            ));
        }
        if self.max_aspect_ratio == 0 {
            return Err(CondenseError::InvalidConfig(
                "max_aspect_ratio must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the PDF to condense.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) if (1..=total_pages).contains(p) => vec![p - 1],
            PageSelection::Single(_) => vec![],
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
