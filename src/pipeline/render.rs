//! PDF rasterisation via pdfium.
//!
//! The orchestrator only sees the [`PageSource`] trait, so tests and other
//! embedders can feed it pre-rendered rasters. [`with_document`] opens a PDF,
//! wraps it in a [`PdfiumSource`] and hands that to a closure; the document
//! borrows the pdfium bindings, which is why it never escapes the call.
//!
//! pdfium is CPU-bound and not async-aware. Async callers run all of this
//! inside `tokio::task::spawn_blocking`.
//!
//! `max_rendered_pixels` caps both rendered dimensions regardless of the
//! requested scale, keeping memory bounded on oversized pages. The source
//! reports each page's width in points so the detector thresholds can follow
//! the scale the page was really drawn at.

use crate::config::CondenseConfig;
use crate::error::{CondenseError, PageError};
use crate::output::DocumentMetadata;
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// A document that can rasterise its pages on demand.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Rasterise the page at 0-based `index`.
    fn render_page(&mut self, index: usize) -> Result<RgbaImage, PageError>;

    /// Width of the page at `index` in PDF points, when known. Lets the
    /// caller tell which scale a page was really rendered at.
    fn page_width_pt(&self, index: usize) -> Option<f32> {
        let _ = index;
        None
    }
}

/// [`PageSource`] over an open pdfium document.
pub struct PdfiumSource<'a, 'p> {
    document: &'a PdfDocument<'p>,
    render_config: PdfRenderConfig,
}

impl<'a, 'p> PdfiumSource<'a, 'p> {
    pub fn new(document: &'a PdfDocument<'p>, config: &CondenseConfig) -> Self {
        let max = config.max_rendered_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(config.scale)
            .set_maximum_width(max)
            .set_maximum_height(max);
        Self {
            document,
            render_config,
        }
    }
}

impl PageSource for PdfiumSource<'_, '_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&mut self, index: usize) -> Result<RgbaImage, PageError> {
        let failed = |e: PdfiumError| PageError::RenderFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        };
        let page = self.document.pages().get(index as u16).map_err(failed)?;
        let bitmap = page.render_with_config(&self.render_config).map_err(failed)?;
        let image = bitmap.as_image().into_rgba8();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn page_width_pt(&self, index: usize) -> Option<f32> {
        let page = self.document.pages().get(index as u16).ok()?;
        Some(page.width().value)
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, CondenseError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(value) => {
            let path = PathBuf::from(value);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| CondenseError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Open `pdf_path` and run `f` against it as a [`PageSource`].
pub fn with_document<T>(
    pdf_path: &Path,
    config: &CondenseConfig,
    f: impl FnOnce(&mut dyn PageSource) -> T,
) -> Result<T, CondenseError> {
    let pdfium = bind_pdfium()?;
    let password = config.password.as_deref();
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| classify_load_error(pdf_path, password.is_some(), e))?;

    let mut source = PdfiumSource::new(&document, config);
    info!("PDF loaded: {} pages", source.page_count());
    Ok(f(&mut source))
}

/// Extract document metadata without rendering pages.
pub fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, CondenseError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| classify_load_error(pdf_path, password.is_some(), e))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

fn classify_load_error(path: &Path, had_password: bool, e: PdfiumError) -> CondenseError {
    let detail = format!("{:?}", e);
    let path = path.to_path_buf();
    if detail.to_lowercase().contains("password") {
        if had_password {
            CondenseError::WrongPassword { path }
        } else {
            CondenseError::PasswordRequired { path }
        }
    } else {
        CondenseError::CorruptPdf { path, detail }
    }
}
