//! Error types for the score-condenser library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CondenseError`] is **fatal**: the document cannot be processed at all
//!   (bad input file, wrong password, pdfium unavailable). Returned as
//!   `Err(CondenseError)` from the top-level `condense*` functions.
//!
//! * [`PageError`] is **non-fatal**: a single page failed to render or
//!   compose, or the footer could not be extracted. Collected in
//!   [`crate::output::CondensedDocument::errors`]; every other page is still
//!   emitted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the score-condenser library.
#[derive(Debug, Error)]
pub enum CondenseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection does not intersect the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a condensed page image.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The orchestrator logs it, reports it through
/// [`crate::progress::CondenseProgressCallback::on_page_error`], skips the
/// page and carries on with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The PDF collaborator could not rasterise the page.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rasterised page has no pixels.
    #[error("Page {page}: rendered raster is empty ({width}x{height})")]
    EmptyRaster {
        page: usize,
        width: u32,
        height: u32,
    },

    /// The condensed raster could not be assembled from the kept sections.
    #[error("Page {page}: condensing failed: {detail}")]
    ComposeFailed { page: usize, detail: String },

    /// Footer extraction failed; only the trailing footer image is lost.
    #[error("Footer extraction failed: {detail}")]
    FooterFailed { detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EmptyRaster { page, .. }
            | PageError::ComposeFailed { page, .. } => Some(*page),
            PageError::FooterFailed { .. } => None,
        }
    }
}
