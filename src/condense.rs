//! Top-level orchestration: walk a document page by page, condense each page,
//! cache the results and report progress.

use crate::cache::{BucketKey, FileId, PageCache};
use crate::config::{CondenseConfig, RenderMode};
use crate::error::{CondenseError, PageError};
use crate::output::{CondenseStats, CondensedDocument, DocumentMetadata, PageOutput};
use crate::pipeline::footer::extract_footer;
use crate::pipeline::page::{condense_page, PageOutcome, PageStage};
use crate::pipeline::render::PageSource;
use crate::pipeline::{encode, input, render};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Long-lived orchestrator owning the page cache.
///
/// Reuse one `Condenser` across runs to get cache hits: re-processing a
/// page of the same file with the same output settings re-emits the stored
/// raster without rendering. See [`BucketKey`] for what counts as a setting.
#[derive(Debug, Default)]
pub struct Condenser {
    cache: PageCache,
}

impl Condenser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PageCache {
        &mut self.cache
    }

    /// Condense a PDF on disk.
    pub fn condense_path(
        &mut self,
        path: impl AsRef<Path>,
        config: &CondenseConfig,
    ) -> Result<CondensedDocument, CondenseError> {
        let resolved = input::resolve_local(path.as_ref())?;
        let file = FileId::from_path(resolved.path())
            .map_err(|e| CondenseError::Internal(format!("cannot identify input: {e}")))?;
        render::with_document(resolved.path(), config, |source| {
            self.process(file, source, config)
        })?
    }

    /// Condense an in-memory PDF. The cache key is derived from the content.
    pub fn condense_bytes(
        &mut self,
        bytes: &[u8],
        config: &CondenseConfig,
    ) -> Result<CondensedDocument, CondenseError> {
        let resolved = input::spill_bytes(bytes)?;
        let file = FileId::from_bytes(bytes);
        render::with_document(resolved.path(), config, |source| {
            self.process(file, source, config)
        })?
    }

    /// Process every selected page of `source`.
    ///
    /// Per-page failures are collected in [`CondensedDocument::errors`] and
    /// the run carries on. The abort flag is checked before each page; once
    /// raised, the pages emitted so far are returned with `aborted` set.
    pub fn process<S: PageSource + ?Sized>(
        &mut self,
        file: FileId,
        source: &mut S,
        config: &CondenseConfig,
    ) -> Result<CondensedDocument, CondenseError> {
        let started = Instant::now();
        let opts = config.render_options();
        let mode = opts.mode;
        let bucket = BucketKey::for_config(config);
        let total_pages = source.page_count();
        let indices = config.pages.to_indices(total_pages);
        if indices.is_empty() {
            return Err(CondenseError::PageOutOfRange {
                page: first_requested(config),
                total: total_pages,
            });
        }
        let cb = config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_document_start(indices.len());
        }
        info!(
            "Condensing {} of {} pages (mode={}, scale={})",
            indices.len(),
            total_pages,
            mode,
            opts.scale
        );

        let mut doc = CondensedDocument::default();
        // Outer `Some` once page 1 was computed in this run.
        let mut fresh_footer: Option<Option<Arc<image::RgbaImage>>> = None;
        let mut source_height: u64 = 0;
        let mut output_height: u64 = 0;

        for (i, &idx) in indices.iter().enumerate() {
            let page_num = idx + 1;
            if config.is_aborted() {
                info!("Aborted before page {}", page_num);
                doc.aborted = true;
                break;
            }
            let report = |doc_progress: usize| {
                if let Some(cb) = cb {
                    cb.on_progress(doc_progress as f32 / indices.len() as f32 * 100.0);
                }
            };

            if let Some(image) = self.cache.get(file, bucket, idx) {
                debug!(page = page_num, stage = ?PageStage::CacheHit, "page served from cache");
                if let Some(cb) = cb {
                    cb.on_page_complete(page_num, &image, true);
                }
                doc.pages.push(PageOutput {
                    page_num,
                    image,
                    cached: true,
                    source_height: None,
                });
                report(i + 1);
                continue;
            }

            let raw = match source.render_page(idx) {
                Ok(raw) => raw,
                Err(e) => {
                    skip_page(&mut doc, cb, e);
                    report(i + 1);
                    continue;
                }
            };
            debug!(
                page = page_num,
                stage = ?PageStage::Rendered,
                width = raw.width(),
                height = raw.height(),
                "page rasterised"
            );
            if let Some(cb) = cb {
                cb.on_page_rendered(page_num, &raw);
            }

            let page_opts = config.options_for_raster(raw.width(), source.page_width_pt(idx));
            if page_opts.scale != opts.scale {
                debug!(
                    page = page_num,
                    scale = page_opts.scale,
                    "render was capped, thresholds follow the drawn scale"
                );
            }
            let render = match condense_page(page_num, &raw, &page_opts) {
                Ok(render) => render,
                Err(e) => {
                    skip_page(&mut doc, cb, e);
                    report(i + 1);
                    continue;
                }
            };
            if let (Some(cb), Some(analysis), Some(plan)) = (cb, &render.analysis, &render.plan) {
                cb.on_page_analyzed(page_num, analysis, plan);
            }

            if page_num == 1 && mode == RenderMode::Normal {
                let bottom = render
                    .analysis
                    .as_ref()
                    .and_then(|a| a.last_staff_bottom(&page_opts.thresholds));
                let footer = match bottom.map(|b| extract_footer(&raw, b, &page_opts.thresholds)) {
                    Some(Ok(footer)) => footer.map(Arc::new),
                    Some(Err(e)) => {
                        warn!("{}", e);
                        doc.errors.push(e);
                        None
                    }
                    None => None,
                };
                fresh_footer = Some(footer);
            }

            let raw_height = raw.height();
            let image = Arc::new(match render.outcome {
                PageOutcome::Unchanged => raw,
                PageOutcome::Annotated(img) | PageOutcome::Condensed(img) => img,
            });
            debug!(
                page = page_num,
                stage = ?PageStage::Condensed,
                source_height = raw_height,
                output_height = image.height(),
                "page condensed"
            );
            source_height += raw_height as u64;
            output_height += image.height() as u64;

            self.cache.insert(file, bucket, idx, Arc::clone(&image));
            debug!(page = page_num, stage = ?PageStage::Cached, "page stored");
            if let Some(cb) = cb {
                cb.on_page_complete(page_num, &image, false);
            }
            doc.pages.push(PageOutput {
                page_num,
                image,
                cached: false,
                source_height: Some(raw_height),
            });
            report(i + 1);
        }

        if mode == RenderMode::Normal && !doc.aborted {
            doc.footer = match fresh_footer {
                Some(Some(footer)) => {
                    self.cache.set_footer(file, bucket, Arc::clone(&footer));
                    Some(footer)
                }
                Some(None) => None,
                None if indices.first() == Some(&0) => self.cache.footer(file, bucket),
                None => None,
            };
        }

        doc.stats = CondenseStats {
            mode,
            total_pages,
            selected_pages: indices.len(),
            emitted_pages: doc.pages.len(),
            cached_pages: doc.pages.iter().filter(|p| p.cached).count(),
            failed_pages: doc.errors.iter().filter(|e| e.page().is_some()).count(),
            source_height_px: source_height,
            output_height_px: output_height,
            footer_height_px: doc.footer.as_ref().map(|f| f.height()),
            total_duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Condensing {}: {}/{} pages emitted ({} cached), {:.0}% of rows removed, {}ms",
            if doc.aborted { "aborted" } else { "complete" },
            doc.stats.emitted_pages,
            doc.stats.selected_pages,
            doc.stats.cached_pages,
            doc.stats.reduction() * 100.0,
            doc.stats.total_duration_ms
        );
        if let (Some(cb), false) = (cb, doc.aborted) {
            cb.on_document_complete(doc.pages.len(), doc.footer.is_some());
        }
        Ok(doc)
    }
}

fn skip_page(
    doc: &mut CondensedDocument,
    cb: Option<&crate::progress::ProgressCallback>,
    e: PageError,
) {
    warn!("Skipping page: {}", e);
    debug!(page = ?e.page(), stage = ?PageStage::Skipped, "page skipped");
    if let (Some(cb), Some(page)) = (cb, e.page()) {
        cb.on_page_error(page, &e.to_string());
    }
    doc.errors.push(e);
}

fn first_requested(config: &CondenseConfig) -> usize {
    use crate::config::PageSelection;
    match &config.pages {
        PageSelection::All => 1,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

// ── One-shot entry points ────────────────────────────────────────────────

/// Condense a PDF file.
///
/// Runs the whole document on tokio's blocking pool with a fresh
/// [`Condenser`]. Use a [`Condenser`] directly to keep the cache between
/// runs.
///
/// # Errors
/// Only fatal problems are returned as `Err`: missing or unreadable input,
/// not a PDF, password errors, pdfium unavailable, or a page selection that
/// misses the document. Page failures land in
/// [`CondensedDocument::errors`].
pub async fn condense(
    input: impl AsRef<Path>,
    config: &CondenseConfig,
) -> Result<CondensedDocument, CondenseError> {
    let path = input.as_ref().to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || Condenser::new().condense_path(&path, &config))
        .await
        .map_err(|e| CondenseError::Internal(format!("Condense task panicked: {}", e)))?
}

/// Condense PDF bytes held in memory.
///
/// # Example
/// ```rust,no_run
/// use score_condenser::{condense_from_bytes, CondenseConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("score.pdf")?;
/// let doc = condense_from_bytes(bytes, &CondenseConfig::default()).await?;
/// println!("{} pages", doc.pages.len());
/// # Ok(())
/// # }
/// ```
pub async fn condense_from_bytes(
    bytes: Vec<u8>,
    config: &CondenseConfig,
) -> Result<CondensedDocument, CondenseError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || Condenser::new().condense_bytes(&bytes, &config))
        .await
        .map_err(|e| CondenseError::Internal(format!("Condense task panicked: {}", e)))?
}

/// Synchronous wrapper around [`condense`] for callers without a runtime.
pub fn condense_sync(
    input: impl AsRef<Path>,
    config: &CondenseConfig,
) -> Result<CondensedDocument, CondenseError> {
    Condenser::new().condense_path(input, config)
}

/// Condense a PDF and write `page-NNN.png` files (plus `footer.png`) into
/// `out_dir`. Every file is written atomically.
pub async fn condense_to_dir(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &CondenseConfig,
) -> Result<CondensedDocument, CondenseError> {
    let doc = condense(input, config).await?;
    let out_dir = out_dir.as_ref().to_path_buf();
    let to_write = doc.clone();
    tokio::task::spawn_blocking(move || write_document(&to_write, &out_dir))
        .await
        .map_err(|e| CondenseError::Internal(format!("Write task panicked: {}", e)))??;
    Ok(doc)
}

/// Write every image of `doc` into `out_dir`, returning the paths written.
pub fn write_document(doc: &CondensedDocument, out_dir: &Path) -> Result<Vec<PathBuf>, CondenseError> {
    let mut written = Vec::with_capacity(doc.pages.len() + 1);
    for page in &doc.pages {
        let path = out_dir.join(page_file_name(page.page_num));
        encode::save_png(&page.image, &path)?;
        written.push(path);
    }
    if let Some(footer) = &doc.footer {
        let path = out_dir.join("footer.png");
        encode::save_png(footer, &path)?;
        written.push(path);
    }
    debug!("Wrote {} images to {}", written.len(), out_dir.display());
    Ok(written)
}

/// `page-001.png`, `page-002.png`, ...
pub fn page_file_name(page_num: usize) -> String {
    format!("page-{page_num:03}.png")
}

/// Extract PDF metadata without rendering.
pub async fn inspect(input: impl AsRef<Path>) -> Result<DocumentMetadata, CondenseError> {
    let path = input.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let resolved = input::resolve_local(&path)?;
        render::extract_metadata(resolved.path(), None)
    })
    .await
    .map_err(|e| CondenseError::Internal(format!("Metadata task panicked: {}", e)))?
}
