//! # score-condenser
//!
//! Condense guitar/bass tablature PDFs by dropping staves that carry no
//! notes, so a score takes fewer screens to read.
//!
//! Each page is rasterised and analysed in pixel space: staff groups are
//! found from the left-margin brackets, individual staves from the
//! right-edge ticks, and each staff is classified by flood-filling ink
//! blobs that look like fret numbers (and, optionally, rhythm stems). Only
//! the row bands of staves with notes, plus the titles and marks between
//! groups, survive into the condensed page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    validate local file (or spill bytes to a temp file)
//!  ├─ 2. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Detect   staff groups → staves → digits / stems
//!  ├─ 4. Plan     kept margins, connective sections, blanks, left lines
//!  ├─ 5. Compose  stack kept bands into the condensed raster
//!  └─ 6. Output   page rasters + page-1 footer, cached per (file, settings bucket, page)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use score_condenser::{condense, CondenseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CondenseConfig::default();
//!     let doc = condense("score.pdf", &config).await?;
//!     for page in &doc.pages {
//!         println!("page {}: {}x{}", page.page_num, page.image.width(), page.image.height());
//!     }
//!     eprintln!("{:.0}% of rows removed", doc.stats.reduction() * 100.0);
//!     Ok(())
//! }
//! ```
//!
//! ## Modes
//!
//! | Mode | Output |
//! |------|--------|
//! | `normal`   | Condensed pages plus the footer strip (default) |
//! | `debug`    | Uncondensed pages with detector overlays |
//! | `original` | Rasterised pages, untouched |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `score-condense` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! score-condenser = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Rendering needs a pdfium shared library. Set `PDFIUM_LIB_PATH` to the
//! library file (or the directory holding it); otherwise the system library
//! is used.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod condense;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{BucketKey, FileId, PageCache};
pub use condense::{
    condense, condense_from_bytes, condense_sync, condense_to_dir, inspect, page_file_name,
    write_document, Condenser,
};
pub use config::{
    CondenseConfig, CondenseConfigBuilder, DecisionPolicy, PageSelection, RenderMode,
    RenderOptions, Thresholds, BASE_SCALE,
};
pub use error::{CondenseError, PageError};
pub use output::{CondenseStats, CondensedDocument, DocumentMetadata, PageOutput};
pub use pipeline::margins::MarginPlan;
pub use pipeline::page::{analyze_page, condense_page, PageAnalysis, PageOutcome, PageRender};
pub use pipeline::render::PageSource;
pub use progress::{AbortSignal, CondenseProgressCallback, NoopProgressCallback, ProgressCallback};
