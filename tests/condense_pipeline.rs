//! Orchestrator tests over synthetic rasters.
//!
//! A fake `PageSource` stands in for pdfium, so these run anywhere and can
//! count how often a page is actually rendered.

use image::{Rgba, RgbaImage};
use score_condenser::{
    condense_page, AbortSignal, CondenseConfig, CondenseProgressCallback, Condenser, FileId,
    MarginPlan, PageAnalysis, PageError, PageOutcome, PageSelection, PageSource, RenderMode,
    RenderOptions, Thresholds,
};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

fn blank(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_pixel(w, h, WHITE)
}

/// Paint `[x0, x1] × [y0, y1]` (inclusive) black.
fn ink(img: &mut RgbaImage, x0: u32, x1: u32, y0: u32, y1: u32) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            img.put_pixel(x, y, BLACK);
        }
    }
}

/// 400×600 tablature page.
///
/// One group bracket at x 10..11 spans rows 100..292. Staff ticks at x 385
/// mark three staves A (110..149), B (180..219) and C (250..289). A and C
/// carry a fret-number blob; B is empty. A title sits at rows 40..49 and a
/// copyright line at rows 560..569.
fn score_page() -> RgbaImage {
    let mut img = blank(400, 600);
    ink(&mut img, 10, 11, 100, 292);
    for (top, bottom) in [(110, 149), (180, 219), (250, 289)] {
        ink(&mut img, 385, 385, top, bottom);
    }
    ink(&mut img, 200, 205, 120, 129);
    ink(&mut img, 200, 205, 260, 269);
    ink(&mut img, 150, 250, 40, 49);
    ink(&mut img, 120, 280, 560, 569);
    img
}

/// Section layout of [`score_page`] in normal mode at scale 1.5.
const SCORE_SECTIONS: [(u32, u32); 3] = [(38, 98), (98, 156), (226, 296)];

/// [`score_page`] without its fret numbers: three staves, none with notes.
fn silent_page() -> RgbaImage {
    let mut img = score_page();
    for (top, bottom) in [(120, 129), (260, 269)] {
        for y in top..=bottom {
            for x in 200..=205 {
                img.put_pixel(x, y, WHITE);
            }
        }
    }
    img
}

struct FakeSource {
    pages: Vec<Option<RgbaImage>>,
    renders: usize,
    /// Reported page width in points, as a PDF would.
    width_pt: Option<f32>,
}

impl FakeSource {
    fn new(pages: Vec<Option<RgbaImage>>) -> Self {
        Self {
            pages,
            renders: 0,
            width_pt: None,
        }
    }
}

impl PageSource for FakeSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn render_page(&mut self, index: usize) -> Result<RgbaImage, PageError> {
        self.renders += 1;
        self.pages[index].clone().ok_or(PageError::RenderFailed {
            page: index + 1,
            detail: "synthetic failure".into(),
        })
    }

    fn page_width_pt(&self, _index: usize) -> Option<f32> {
        self.width_pt
    }
}

#[derive(Default)]
struct Recorder {
    completed: Mutex<Vec<(usize, bool)>>,
    rendered: Mutex<Vec<usize>>,
    errors: Mutex<Vec<usize>>,
    progress: Mutex<Vec<f32>>,
    finished: Mutex<Option<(usize, bool)>>,
    analyzed: Mutex<Vec<serde_json::Value>>,
    abort_after_first: Option<AbortSignal>,
}

impl CondenseProgressCallback for Recorder {
    fn on_page_rendered(&self, page_num: usize, _raster: &RgbaImage) {
        self.rendered.lock().unwrap().push(page_num);
    }

    fn on_page_analyzed(&self, page_num: usize, analysis: &PageAnalysis, plan: &MarginPlan) {
        self.analyzed.lock().unwrap().push(serde_json::json!({
            "page": page_num,
            "analysis": analysis,
            "plan": plan,
        }));
    }

    fn on_page_complete(&self, page_num: usize, _raster: &RgbaImage, cached: bool) {
        self.completed.lock().unwrap().push((page_num, cached));
        if let Some(abort) = &self.abort_after_first {
            abort.abort();
        }
    }

    fn on_page_error(&self, page_num: usize, _error: &str) {
        self.errors.lock().unwrap().push(page_num);
    }

    fn on_progress(&self, percent: f32) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_document_complete(&self, emitted: usize, footer: bool) {
        *self.finished.lock().unwrap() = Some((emitted, footer));
    }
}

/// Route library logs through the test harness; `RUST_LOG` overrides.
fn init_logs() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("score_condenser=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Captures formatted log lines for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn config(mode: RenderMode) -> CondenseConfig {
    CondenseConfig::builder().mode(mode).build().unwrap()
}

fn with_recorder(mode: RenderMode, recorder: &Arc<Recorder>) -> CondenseConfig {
    CondenseConfig::builder()
        .mode(mode)
        .progress_callback(Arc::clone(recorder) as Arc<dyn CondenseProgressCallback>)
        .build()
        .unwrap()
}

// ── Page-level behaviour ─────────────────────────────────────────────────────

#[test]
fn blank_page_is_emitted_unchanged() {
    let img = blank(300, 420);
    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Normal, 1.5)).unwrap();
    assert_eq!(render.outcome, PageOutcome::Unchanged);
    let analysis = render.analysis.as_ref().unwrap();
    assert!(analysis.groups.is_empty());
    assert!(render.plan.as_ref().unwrap().kept.is_empty());
    assert_eq!(render.image(&img).dimensions(), img.dimensions());
}

#[test]
fn empty_middle_staff_is_cut_out() {
    let img = score_page();
    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Normal, 1.5)).unwrap();
    let plan = render.plan.as_ref().unwrap();
    let sections: Vec<_> = plan.sections().iter().map(|s| (s.top, s.bottom)).collect();
    assert_eq!(sections, SCORE_SECTIONS);

    let PageOutcome::Condensed(out) = &render.outcome else {
        panic!("expected a condensed page");
    };
    assert_eq!(out.width(), 400);
    assert_eq!(out.height(), 60 + 58 + 70);

    // Only the ticks of A and C survive in the right-edge column.
    let tick_rows = (0..out.height())
        .filter(|&y| out.get_pixel(385, y) == &BLACK)
        .count();
    assert_eq!(tick_rows, 80);

    // The gaps next to the dropped staff are blanked up to the bracket.
    assert_eq!(plan.blanks.len(), 2);
    assert!(plan.blanks.iter().all(|b| b.width == 13));
}

#[test]
fn single_staff_with_one_digit_is_kept() {
    // One bracket (rows 100..169), one staff tick, one fret number.
    let mut img = blank(400, 600);
    ink(&mut img, 10, 11, 100, 169);
    ink(&mut img, 385, 385, 110, 149);
    ink(&mut img, 200, 205, 120, 129);

    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Normal, 1.5)).unwrap();
    let analysis = render.analysis.as_ref().unwrap();
    assert_eq!(analysis.staff_count(), 1);
    let staff = &analysis.staves[0][0];
    assert!(staff.has_digits && staff.has_notes);

    let plan = render.plan.as_ref().unwrap();
    assert_eq!(plan.kept.len(), 1);
    assert_eq!(plan.between.len(), 1);
    let kept = plan.kept[0];
    assert!(kept.top <= 110 && kept.bottom > 149);

    let PageOutcome::Condensed(out) = &render.outcome else {
        panic!("expected a condensed page");
    };
    assert_eq!(out.height(), kept.height() + plan.between[0].height());
}

#[test]
fn staves_without_notes_leave_the_page_unchanged() {
    let img = silent_page();
    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Normal, 1.5)).unwrap();
    let analysis = render.analysis.as_ref().unwrap();
    assert_eq!(analysis.groups.len(), 1);
    assert_eq!(analysis.staff_count(), 3);
    assert_eq!(analysis.noted_staff_count(), 0);
    assert_eq!(render.outcome, PageOutcome::Unchanged);
    assert_eq!(render.image(&img), &img);
}

#[test]
fn runaway_thresholds_do_not_panic() {
    let opts = RenderOptions {
        thresholds: Thresholds {
            extra_bottom_padding: u32::MAX,
            content_tolerance_above_staff: u32::MAX,
            ..Thresholds::default()
        },
        ..RenderOptions::at_scale(RenderMode::Normal, 1.5)
    };
    let img = score_page();
    let render = condense_page(1, &img, &opts).unwrap();
    assert!(render.image(&img).height() <= img.height());
}

#[test]
fn kept_rows_are_copied_verbatim() {
    let img = score_page();
    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Normal, 1.5)).unwrap();
    let out = render.image(&img);

    // Left of column 13 the bracket is blanked and redrawn; everything to its
    // right must be byte-identical to the source.
    let mut dest = 0;
    for (top, bottom) in SCORE_SECTIONS {
        for y in top..bottom {
            for x in 13..img.width() {
                assert_eq!(
                    out.get_pixel(x, dest),
                    img.get_pixel(x, y),
                    "pixel ({x}, {y}) moved to row {dest} changed"
                );
            }
            dest += 1;
        }
    }
}

#[test]
fn left_line_is_redrawn_across_kept_staves() {
    let img = score_page();
    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Normal, 1.5)).unwrap();
    let plan = render.plan.as_ref().unwrap();
    assert_eq!(plan.lines.len(), 1);
    assert_eq!(
        (plan.lines[0].x, plan.lines[0].start_y, plan.lines[0].end_y),
        (12, 110, 289)
    );

    let out = render.image(&img);
    // Source row 150 sits in A's band (dest 60 + 52) inside the blanked gap.
    assert_eq!(out.get_pixel(12, 112), &BLACK);
    assert_eq!(out.get_pixel(10, 112), &WHITE);
    // The title section lies above the first top line and is not touched.
    assert_eq!(out.get_pixel(12, 5), &WHITE);
    // C's band starts at dest 118 (source row 226), inside the line span.
    assert_eq!(out.get_pixel(12, 118), &BLACK);
}

#[test]
fn condensed_height_is_the_sum_of_sections() {
    let mut img = score_page();
    // A second group lower down with one noted staff.
    ink(&mut img, 10, 11, 380, 470);
    ink(&mut img, 385, 385, 400, 439);
    ink(&mut img, 220, 226, 410, 419);
    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Normal, 1.5)).unwrap();
    let sections = render.plan.as_ref().unwrap().sections();
    for pair in sections.windows(2) {
        assert!(pair[0].bottom <= pair[1].top);
    }
    let expected: u32 = sections.iter().map(|s| s.height()).sum();
    assert_eq!(render.image(&img).height(), expected);
}

#[test]
fn condensing_is_deterministic() {
    let img = score_page();
    let opts = RenderOptions::at_scale(RenderMode::Normal, 1.5);
    let a = condense_page(1, &img, &opts).unwrap();
    let b = condense_page(1, &img, &opts).unwrap();
    assert_eq!(a.image(&img), b.image(&img));
    assert_eq!(a.plan, b.plan);
}

#[test]
fn debug_mode_keeps_page_size() {
    let img = score_page();
    let render = condense_page(1, &img, &RenderOptions::at_scale(RenderMode::Debug, 1.5)).unwrap();
    assert!(matches!(render.outcome, PageOutcome::Annotated(_)));
    assert_eq!(render.image(&img).dimensions(), img.dimensions());
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

#[test]
fn normal_run_emits_pages_and_footer() {
    init_logs();
    let mut source = FakeSource::new(vec![Some(score_page()), Some(blank(400, 600))]);
    let mut condenser = Condenser::new();
    let doc = condenser
        .process(FileId::new(1), &mut source, &config(RenderMode::Normal))
        .unwrap();

    assert_eq!(doc.pages.len(), 2);
    assert_eq!(doc.pages[0].image.height(), 188);
    assert_eq!(doc.pages[1].image.height(), 600);
    assert!(doc.errors.is_empty());
    assert!(!doc.aborted);

    // 40 rows of padding plus rows 560..600.
    let footer = doc.footer.as_ref().expect("page 1 has a footer");
    assert_eq!(footer.dimensions(), (400, 80));
    assert_eq!(footer.get_pixel(200, 0), &WHITE);
    assert_eq!(footer.get_pixel(200, 40), &BLACK);

    assert_eq!(doc.stats.emitted_pages, 2);
    assert_eq!(doc.stats.source_height_px, 1200);
    assert_eq!(doc.stats.output_height_px, 788);
    assert_eq!(doc.stats.footer_height_px, Some(80));
}

#[test]
fn second_run_is_served_from_cache() {
    let mut source = FakeSource::new(vec![Some(score_page()), Some(score_page())]);
    let mut condenser = Condenser::new();
    let file = FileId::new(7);
    let cfg = config(RenderMode::Normal);

    let first = condenser.process(file, &mut source, &cfg).unwrap();
    assert_eq!(source.renders, 2);

    let recorder = Arc::new(Recorder::default());
    let second = condenser
        .process(file, &mut source, &with_recorder(RenderMode::Normal, &recorder))
        .unwrap();
    assert_eq!(source.renders, 2, "cached pages must not be rendered again");
    assert!(second.pages.iter().all(|p| p.cached));
    for (a, b) in first.pages.iter().zip(&second.pages) {
        assert!(Arc::ptr_eq(&a.image, &b.image));
    }
    assert!(Arc::ptr_eq(
        first.footer.as_ref().unwrap(),
        second.footer.as_ref().unwrap()
    ));
    assert_eq!(
        *recorder.completed.lock().unwrap(),
        vec![(1, true), (2, true)]
    );
    assert!(recorder.rendered.lock().unwrap().is_empty());
    assert_eq!(second.stats.cached_pages, 2);
}

#[test]
fn modes_use_separate_cache_buckets() {
    let mut source = FakeSource::new(vec![Some(score_page())]);
    let mut condenser = Condenser::new();
    let file = FileId::new(3);

    let normal = condenser.process(file, &mut source, &config(RenderMode::Normal)).unwrap();
    let original = condenser.process(file, &mut source, &config(RenderMode::Original)).unwrap();
    assert_eq!(source.renders, 2);
    assert!(!original.pages[0].cached);
    assert_eq!(original.pages[0].image.as_ref(), &score_page());
    assert_ne!(normal.pages[0].image.height(), original.pages[0].image.height());
    assert!(original.footer.is_none());
}

#[test]
fn retuned_thresholds_do_not_reuse_cached_pages() {
    let mut source = FakeSource::new(vec![Some(score_page())]);
    let mut condenser = Condenser::new();
    let file = FileId::new(11);

    let first = condenser.process(file, &mut source, &config(RenderMode::Normal)).unwrap();
    assert_eq!(first.pages[0].image.height(), 188);

    // Fret numbers are now too small to count, so every staff is empty.
    let strict = CondenseConfig::builder()
        .thresholds(Thresholds {
            min_digit_width: 19,
            min_digit_height: 19,
            ..Thresholds::default()
        })
        .build()
        .unwrap();
    let second = condenser.process(file, &mut source, &strict).unwrap();
    assert_eq!(source.renders, 2);
    assert!(!second.pages[0].cached);
    assert_eq!(second.pages[0].image.height(), 600);

    // Both settings stay cached side by side.
    let again = condenser.process(file, &mut source, &config(RenderMode::Normal)).unwrap();
    assert_eq!(source.renders, 2);
    assert!(Arc::ptr_eq(&first.pages[0].image, &again.pages[0].image));
}

#[test]
fn capped_render_uses_the_drawn_scale() {
    // Asked for scale 3.0, but the page came back at 1.5: 400 px for a
    // page 266.7 pt wide.
    let mut source = FakeSource::new(vec![Some(score_page())]);
    source.width_pt = Some(400.0 / 1.5);
    let cfg = CondenseConfig::builder().scale(3.0).build().unwrap();

    let doc = Condenser::new().process(FileId::new(12), &mut source, &cfg).unwrap();
    assert_eq!(doc.pages[0].image.height(), 188);
    assert_eq!(doc.footer.as_ref().map(|f| f.height()), Some(80));
}

#[test]
fn analysed_pages_are_reported_as_json() {
    let mut source = FakeSource::new(vec![Some(score_page()), Some(blank(400, 600))]);
    let recorder = Arc::new(Recorder::default());
    let cfg = with_recorder(RenderMode::Normal, &recorder);
    let mut condenser = Condenser::new();
    condenser.process(FileId::new(13), &mut source, &cfg).unwrap();

    let analyzed = recorder.analyzed.lock().unwrap().clone();
    assert_eq!(analyzed.len(), 2);
    assert_eq!(analyzed[0]["page"], 1);
    assert_eq!(analyzed[0]["analysis"]["staves"][0].as_array().unwrap().len(), 3);
    assert_eq!(analyzed[0]["plan"]["kept"].as_array().unwrap().len(), 2);
    assert!(analyzed[1]["analysis"]["groups"].as_array().unwrap().is_empty());

    // Cached pages are not analysed again.
    condenser.process(FileId::new(13), &mut source, &cfg).unwrap();
    assert_eq!(recorder.analyzed.lock().unwrap().len(), 2);
}

#[test]
fn original_mode_reports_no_analysis() {
    let mut source = FakeSource::new(vec![Some(score_page())]);
    let recorder = Arc::new(Recorder::default());
    Condenser::new()
        .process(FileId::new(14), &mut source, &with_recorder(RenderMode::Original, &recorder))
        .unwrap();
    assert!(recorder.analyzed.lock().unwrap().is_empty());
}

#[test]
fn annotated_run_is_cached_apart_from_the_plain_one() {
    let mut source = FakeSource::new(vec![Some(score_page())]);
    let mut condenser = Condenser::new();
    let file = FileId::new(15);
    let plain = condenser.process(file, &mut source, &config(RenderMode::Normal)).unwrap();
    let annotated_cfg = CondenseConfig::builder().annotate_condensed(true).build().unwrap();
    let annotated = condenser.process(file, &mut source, &annotated_cfg).unwrap();

    assert_eq!(source.renders, 2);
    assert!(!annotated.pages[0].cached);
    assert_eq!(annotated.pages[0].image.dimensions(), plain.pages[0].image.dimensions());
    assert_ne!(annotated.pages[0].image, plain.pages[0].image);
}

#[test]
fn stage_logs_follow_each_computed_page() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    let mut source = FakeSource::new(vec![Some(score_page())]);
    let mut condenser = Condenser::new();
    tracing::subscriber::with_default(subscriber, || {
        condenser
            .process(FileId::new(16), &mut source, &config(RenderMode::Normal))
            .unwrap();
        condenser
            .process(FileId::new(16), &mut source, &config(RenderMode::Normal))
            .unwrap();
    });

    let text = logs.text();
    let position = |stage: &str| {
        text.find(&format!("stage={stage}"))
            .unwrap_or_else(|| panic!("no {stage} event in:\n{text}"))
    };
    let order: Vec<usize> = ["Rendered", "Analyzed", "Resolved", "Condensed", "Cached", "CacheHit"]
        .iter()
        .map(|s| position(s))
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]), "stages out of order:\n{text}");
}

#[test]
fn render_failure_skips_only_that_page() {
    init_logs();
    let mut source = FakeSource::new(vec![Some(score_page()), None, Some(blank(400, 600))]);
    let recorder = Arc::new(Recorder::default());
    let doc = Condenser::new()
        .process(FileId::new(4), &mut source, &with_recorder(RenderMode::Normal, &recorder))
        .unwrap();

    let emitted: Vec<_> = doc.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(emitted, vec![1, 3]);
    assert!(matches!(doc.errors[..], [PageError::RenderFailed { page: 2, .. }]));
    assert_eq!(doc.stats.failed_pages, 1);
    assert_eq!(*recorder.errors.lock().unwrap(), vec![2]);
    assert_eq!(*recorder.rendered.lock().unwrap(), vec![1, 3]);
    assert_eq!(*recorder.finished.lock().unwrap(), Some((2, true)));
}

#[test]
fn progress_reaches_one_hundred() {
    let pages = (0..4).map(|_| Some(blank(100, 100))).collect();
    let mut source = FakeSource::new(pages);
    let recorder = Arc::new(Recorder::default());
    Condenser::new()
        .process(FileId::new(5), &mut source, &with_recorder(RenderMode::Normal, &recorder))
        .unwrap();

    let progress = recorder.progress.lock().unwrap();
    assert_eq!(*progress, vec![25.0, 50.0, 75.0, 100.0]);
}

#[test]
fn abort_stops_before_the_next_page() {
    let pages = (0..3).map(|_| Some(score_page())).collect();
    let mut source = FakeSource::new(pages);
    let abort = AbortSignal::new();
    let recorder = Arc::new(Recorder {
        abort_after_first: Some(abort.clone()),
        ..Recorder::default()
    });
    let cfg = CondenseConfig::builder()
        .progress_callback(Arc::clone(&recorder) as Arc<dyn CondenseProgressCallback>)
        .abort_signal(abort)
        .build()
        .unwrap();

    let doc = Condenser::new().process(FileId::new(6), &mut source, &cfg).unwrap();
    assert!(doc.aborted);
    assert_eq!(doc.pages.len(), 1);
    assert_eq!(source.renders, 1);
    assert!(recorder.finished.lock().unwrap().is_none());
}

#[test]
fn page_selection_limits_rendering() {
    let pages = (0..5).map(|_| Some(blank(100, 100))).collect();
    let mut source = FakeSource::new(pages);
    let cfg = CondenseConfig::builder()
        .pages(PageSelection::Set(vec![2, 4]))
        .build()
        .unwrap();
    let doc = Condenser::new().process(FileId::new(8), &mut source, &cfg).unwrap();
    let emitted: Vec<_> = doc.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(emitted, vec![2, 4]);
    assert_eq!(source.renders, 2);
    // Page 1 was not selected, so there is no footer.
    assert!(doc.footer.is_none());
}

#[test]
fn selection_outside_document_is_fatal() {
    let mut source = FakeSource::new(vec![Some(blank(50, 50))]);
    let cfg = CondenseConfig::builder()
        .pages(PageSelection::Single(9))
        .build()
        .unwrap();
    let err = Condenser::new()
        .process(FileId::new(9), &mut source, &cfg)
        .unwrap_err();
    assert!(matches!(
        err,
        score_condenser::CondenseError::PageOutOfRange { page: 9, total: 1 }
    ));
}
