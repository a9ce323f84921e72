//! Progress callbacks and cooperative cancellation.
//!
//! Inject an [`Arc<dyn CondenseProgressCallback>`] via
//! [`crate::config::CondenseConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the document. Pages are processed strictly
//! in order on one thread, so events arrive in page order.
//!
//! Cancellation is an [`AbortSignal`]: a shared flag the orchestrator checks
//! once at the top of every page. Raising it never interrupts a page that is
//! already being analysed.
//!
//! # Example
//!
//! ```rust
//! use score_condenser::{AbortSignal, CondenseConfig, CondenseProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl CondenseProgressCallback for Printer {
//!     fn on_progress(&self, percent: f32) {
//!         eprintln!("{percent:.0}%");
//!     }
//! }
//!
//! let abort = AbortSignal::new();
//! let config = CondenseConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .abort_signal(abort.clone())
//!     .build()
//!     .unwrap();
//! abort.abort();
//! assert!(config.is_aborted());
//! ```

use crate::pipeline::margins::MarginPlan;
use crate::pipeline::page::PageAnalysis;
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait CondenseProgressCallback: Send + Sync {
    /// Called once before the first page, with the number of selected pages.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called with the raw raster as soon as a page is rasterised, before any
    /// analysis, so a caller can show something even if condensing fails.
    fn on_page_rendered(&self, page_num: usize, raster: &RgbaImage) {
        let _ = (page_num, raster);
    }

    /// Called after a computed page was analysed, with the detector results
    /// and the margin plan. Never called for cached pages or in `Original`
    /// mode, where no analysis runs. Both values serialise to JSON.
    fn on_page_analyzed(&self, page_num: usize, analysis: &PageAnalysis, plan: &MarginPlan) {
        let _ = (page_num, analysis, plan);
    }

    /// Called once per emitted page (computed or served from cache).
    ///
    /// # Arguments
    /// * `page_num` : 1-indexed page number
    /// * `raster`   : the page as it appears in the output
    /// * `cached`   : true when the page came from the cache
    fn on_page_complete(&self, page_num: usize, raster: &RgbaImage, cached: bool) {
        let _ = (page_num, raster, cached);
    }

    /// Called when a page is skipped because it failed.
    fn on_page_error(&self, page_num: usize, error: &str) {
        let _ = (page_num, error);
    }

    /// Progress in percent (0–100) after each selected page.
    fn on_progress(&self, percent: f32) {
        let _ = percent;
    }

    /// Called once after the last page, unless the run was aborted.
    ///
    /// # Arguments
    /// * `emitted`  : pages emitted (footer excluded)
    /// * `footer`   : whether a footer image was appended
    fn on_document_complete(&self, emitted: usize, footer: bool) {
        let _ = (emitted, footer);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CondenseProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CondenseConfig`].
pub type ProgressCallback = Arc<dyn CondenseProgressCallback>;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the remaining pages be abandoned.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct TrackingCallback {
        rendered: AtomicUsize,
        completed: AtomicUsize,
        cached: AtomicUsize,
        errors: AtomicUsize,
        last_percent: Mutex<f32>,
    }

    impl CondenseProgressCallback for TrackingCallback {
        fn on_page_rendered(&self, _page_num: usize, _raster: &RgbaImage) {
            self.rendered.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _raster: &RgbaImage, cached: bool) {
            self.completed.fetch_add(1, Ordering::SeqCst);
            if cached {
                self.cached.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_page_error(&self, _page_num: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_progress(&self, percent: f32) {
            *self.last_percent.lock().unwrap() = percent;
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let img = RgbaImage::new(2, 2);
        cb.on_document_start(5);
        cb.on_page_rendered(1, &img);
        cb.on_page_complete(1, &img, false);
        cb.on_page_error(2, "some error");
        cb.on_progress(40.0);
        cb.on_document_complete(4, true);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            rendered: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cached: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            last_percent: Mutex::new(0.0),
        };
        let img = RgbaImage::new(1, 1);

        tracker.on_page_rendered(1, &img);
        tracker.on_page_complete(1, &img, false);
        tracker.on_page_complete(2, &img, true);
        tracker.on_page_error(3, "render failed");
        tracker.on_progress(100.0);

        assert_eq!(tracker.rendered.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.cached.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.last_percent.lock().unwrap(), 100.0);
    }

    #[test]
    fn abort_signal_is_shared_between_clones() {
        let signal = AbortSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_aborted());
        signal.abort();
        assert!(observer.is_aborted());
    }
}
