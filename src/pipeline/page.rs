//! Per-page analysis and condensing.
//!
//! Everything here is a pure function of the rasterised page and the render
//! options: the same input always yields the same output, which is what makes
//! the orchestrator's page cache sound.

use image::RgbaImage;
use serde::Serialize;
use tracing::debug;

use super::annotate::{palette, AnnotationLayer};
use super::compose::{render_condensed, ComposeRequest};
use super::digits::detect_digits;
use super::groups::{detect_staff_groups, StaffGroup};
use super::margins::{resolve_margins, MarginPlan};
use super::raster::VerticalRun;
use super::staves::{detect_staves, Staff};
use super::stems::detect_stems;
use crate::config::{RenderMode, RenderOptions, Thresholds};
use crate::error::PageError;

/// Stages a page passes through, as reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageStage {
    CacheHit,
    Rendered,
    Analyzed,
    Resolved,
    Condensed,
    Cached,
    Skipped,
}

/// Detector results for one page. `staves[i]` belongs to `groups[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageAnalysis {
    pub groups: Vec<StaffGroup>,
    pub runs: Vec<VerticalRun>,
    pub staves: Vec<Vec<Staff>>,
}

impl PageAnalysis {
    pub fn staff_count(&self) -> usize {
        self.staves.iter().map(Vec::len).sum()
    }

    pub fn noted_staff_count(&self) -> usize {
        self.staves.iter().flatten().filter(|s| s.has_notes).count()
    }

    /// `max(end + extra_bottom_padding)` over all staves, where a footer scan
    /// begins. `None` on a page without staves.
    pub fn last_staff_bottom(&self, t: &Thresholds) -> Option<u32> {
        self.staves
            .iter()
            .flatten()
            .map(|s| s.end.saturating_add(t.extra_bottom_padding))
            .max()
    }
}

/// What [`condense_page`] decided for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Emit the source raster as-is.
    Unchanged,
    /// Debug mode: the source with detector overlays, same dimensions.
    Annotated(RgbaImage),
    /// Only the kept sections, stacked.
    Condensed(RgbaImage),
}

/// A condensed page plus the analysis behind it.
#[derive(Debug, Clone)]
pub struct PageRender {
    pub outcome: PageOutcome,
    /// `None` in [`RenderMode::Original`], where no analysis runs.
    pub analysis: Option<PageAnalysis>,
    pub plan: Option<MarginPlan>,
}

impl PageRender {
    /// The raster to emit, borrowing the source when unchanged.
    pub fn image<'a>(&'a self, source: &'a RgbaImage) -> &'a RgbaImage {
        match &self.outcome {
            PageOutcome::Unchanged => source,
            PageOutcome::Annotated(img) | PageOutcome::Condensed(img) => img,
        }
    }
}

/// Run every detector over `img` and classify the staves.
pub fn analyze_page(
    img: &RgbaImage,
    t: &Thresholds,
    mut annot: Option<&mut AnnotationLayer>,
) -> PageAnalysis {
    let scan = detect_staff_groups(img, t, annot.as_deref_mut());
    let mut staves: Vec<Vec<Staff>> = scan
        .groups
        .iter()
        .map(|g| detect_staves(img, g, t, annot.as_deref_mut()))
        .collect();
    for group_staves in &mut staves {
        classify_staves(img, group_staves, t, annot.as_deref_mut());
    }
    PageAnalysis {
        groups: scan.groups,
        runs: scan.runs,
        staves,
    }
}

/// Fill in the digit/stem/notes flags of one group's staves.
fn classify_staves(
    img: &RgbaImage,
    staves: &mut [Staff],
    t: &Thresholds,
    mut annot: Option<&mut AnnotationLayer>,
) {
    let (w, h) = img.dimensions();
    for i in 0..staves.len() {
        let next_top = staves.get(i + 1).map_or(h, |n| n.start);
        let staff = &staves[i];

        let has_digits = !detect_digits(img, staff, t, annot.as_deref_mut()).is_empty();
        let stems = if has_digits || t.find_stems_without_digits {
            detect_stems(img, staff, next_top, t, annot.as_deref_mut())
        } else {
            Vec::new()
        };

        let staff = &mut staves[i];
        staff.has_digits = has_digits;
        staff.has_stems = !stems.is_empty();
        staff.has_notes = t.decision_policy.has_notes(staff.has_digits, staff.has_stems);
        staff.stems = stems;

        if let Some(layer) = annot.as_deref_mut() {
            let color = if staff.has_notes {
                palette::HAS_NOTES
            } else {
                palette::NO_NOTES
            };
            let mid = (staff.start + staff.end) as f32 / 2.0;
            layer.dot(w.saturating_sub(15) as f32, mid, 5.0, color);
        }
    }
}

/// Condense one rasterised page according to `opts.mode`.
///
/// `Original` returns the source untouched. `Debug` draws the detectors'
/// findings over a copy without removing anything. `Normal` keeps only the
/// sections the margin plan selects, and falls back to the source when no
/// staff on the page has notes.
pub fn condense_page(
    page_num: usize,
    img: &RgbaImage,
    opts: &RenderOptions,
) -> Result<PageRender, PageError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(PageError::EmptyRaster {
            page: page_num,
            width: w,
            height: h,
        });
    }
    let t = &opts.thresholds;

    match opts.mode {
        RenderMode::Original => Ok(PageRender {
            outcome: PageOutcome::Unchanged,
            analysis: None,
            plan: None,
        }),
        RenderMode::Debug => {
            let mut layer =
                AnnotationLayer::from_image(img).ok_or_else(|| PageError::ComposeFailed {
                    page: page_num,
                    detail: format!("cannot allocate a {w}x{h} overlay"),
                })?;
            let analysis = analyze_page(img, t, Some(&mut layer));
            log_analysis(page_num, &analysis);
            let plan = resolve_margins(img, &analysis, t, Some(&mut layer));
            log_plan(page_num, &plan);
            Ok(PageRender {
                outcome: PageOutcome::Annotated(layer.into_image()),
                analysis: Some(analysis),
                plan: Some(plan),
            })
        }
        RenderMode::Normal => {
            let analysis = analyze_page(img, t, None);
            log_analysis(page_num, &analysis);
            let plan = resolve_margins(img, &analysis, t, None);
            log_plan(page_num, &plan);
            if !plan.has_content() {
                return Ok(PageRender {
                    outcome: PageOutcome::Unchanged,
                    analysis: Some(analysis),
                    plan: Some(plan),
                });
            }
            let sections = plan.sections();
            let condensed = render_condensed(&ComposeRequest {
                page_num,
                source: img,
                sections: &sections,
                blanks: &plan.blanks,
                lines: &plan.lines,
                debug: opts.annotate_condensed,
            })?;
            Ok(PageRender {
                outcome: PageOutcome::Condensed(condensed),
                analysis: Some(analysis),
                plan: Some(plan),
            })
        }
    }
}

fn log_analysis(page_num: usize, analysis: &PageAnalysis) {
    debug!(
        page = page_num,
        stage = ?PageStage::Analyzed,
        groups = analysis.groups.len(),
        staves = analysis.staff_count(),
        noted = analysis.noted_staff_count(),
        "page analysed"
    );
}

fn log_plan(page_num: usize, plan: &MarginPlan) {
    debug!(
        page = page_num,
        stage = ?PageStage::Resolved,
        kept = plan.kept.len(),
        between = plan.between.len(),
        blanks = plan.blanks.len(),
        lines = plan.lines.len(),
        "margins resolved"
    );
}
