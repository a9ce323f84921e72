//! Pipeline stages for condensing tablature pages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ groups ──▶ staves ──▶ digits/stems ──▶ margins ──▶ compose ──▶ encode
//! (path)    (pdfium)   (brackets)  (ticks)     (classify)       (plan)      (stack)     (PNG)
//!                                                                  └──▶ footer (page 1)
//! ```
//!
//! 1. [`input`]: validate the PDF path or spill bytes to a temp file
//! 2. [`render`]: rasterise pages through a [`render::PageSource`]
//! 3. [`groups`], [`staves`]: locate staff groups and individual staves
//! 4. [`digits`], [`stems`]: flood-fill ink to decide which staves carry notes
//! 5. [`margins`]: decide which row bands to keep, blank and line up
//! 6. [`compose`]: stack the kept bands into the condensed raster
//! 7. [`footer`]: cut the copyright strip from below the last staff
//! 8. [`encode`]: write PNG output
//!
//! [`page`] ties stages 3 to 6 together for one raster; [`raster`] and
//! [`annotate`] hold the shared pixel and overlay primitives.

pub mod annotate;
pub mod compose;
pub mod digits;
pub mod encode;
pub mod footer;
pub mod groups;
pub mod input;
pub mod margins;
pub mod page;
pub mod raster;
pub mod render;
pub mod staves;
pub mod stems;
