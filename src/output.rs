//! Output types returned by the orchestrator.

use crate::config::RenderMode;
use crate::error::PageError;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One emitted page.
///
/// The raster is shared with the page cache, so cloning a `PageOutput` or
/// serving it again from cache never copies pixels.
#[derive(Debug, Clone)]
pub struct PageOutput {
    /// 1-indexed page number.
    pub page_num: usize,
    pub image: Arc<RgbaImage>,
    /// True when the raster was served from the cache without re-rendering.
    pub cached: bool,
    /// Height of the rendered page before condensing. `None` for cached pages.
    pub source_height: Option<u32>,
}

/// Everything produced for one document.
#[derive(Debug, Clone, Default)]
pub struct CondensedDocument {
    /// Emitted pages in page order. Failed pages are absent.
    pub pages: Vec<PageOutput>,
    /// Copyright/footer strip cut from page 1, emitted after the last page.
    pub footer: Option<Arc<RgbaImage>>,
    /// Non-fatal per-page failures.
    pub errors: Vec<PageError>,
    pub stats: CondenseStats,
    /// True if the abort flag stopped the run early.
    pub aborted: bool,
}

impl CondensedDocument {
    /// Page rasters followed by the footer, in display order.
    pub fn images(&self) -> impl Iterator<Item = &Arc<RgbaImage>> {
        self.pages.iter().map(|p| &p.image).chain(self.footer.iter())
    }
}

/// Run statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondenseStats {
    pub mode: RenderMode,
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages the selection asked for.
    pub selected_pages: usize,
    /// Pages emitted (computed or cached).
    pub emitted_pages: usize,
    pub cached_pages: usize,
    pub failed_pages: usize,
    /// Sum of rendered page heights for freshly computed pages.
    pub source_height_px: u64,
    /// Sum of emitted heights for the same pages.
    pub output_height_px: u64,
    pub footer_height_px: Option<u32>,
    pub total_duration_ms: u64,
}

impl CondenseStats {
    /// Fraction of rendered rows removed, in 0..=1.
    pub fn reduction(&self) -> f64 {
        if self.source_height_px == 0 {
            0.0
        } else {
            1.0 - self.output_height_px as f64 / self.source_height_px as f64
        }
    }
}

/// PDF document information, available without condensing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_put_footer_last() {
        let page = |n| PageOutput {
            page_num: n,
            image: Arc::new(RgbaImage::new(2, n as u32)),
            cached: false,
            source_height: Some(10),
        };
        let doc = CondensedDocument {
            pages: vec![page(1), page(2)],
            footer: Some(Arc::new(RgbaImage::new(2, 7))),
            ..CondensedDocument::default()
        };
        let heights: Vec<u32> = doc.images().map(|i| i.height()).collect();
        assert_eq!(heights, vec![1, 2, 7]);
    }

    #[test]
    fn reduction_is_relative_to_source() {
        let stats = CondenseStats {
            source_height_px: 1000,
            output_height_px: 250,
            ..CondenseStats::default()
        };
        assert!((stats.reduction() - 0.75).abs() < 1e-9);
        assert_eq!(CondenseStats::default().reduction(), 0.0);
    }

    #[test]
    fn stats_serialise_mode_in_lowercase() {
        let stats = CondenseStats {
            mode: RenderMode::Debug,
            ..CondenseStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"mode\":\"debug\""), "got: {json}");
    }
}
