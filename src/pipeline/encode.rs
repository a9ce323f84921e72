//! PNG encoding and atomic file output for finished rasters.
//!
//! PNG is lossless; tablature digits are a handful of pixels tall and do not
//! survive JPEG artefacts.

use crate::error::CondenseError;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Encode a raster as PNG bytes.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    debug!("Encoded {}x{} → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Write `img` to `path` as PNG, via a temp file and rename so readers never
/// see a partial image.
pub fn save_png(img: &RgbaImage, path: &Path) -> Result<(), CondenseError> {
    let write_failed = |source: std::io::Error| CondenseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_failed)?;
    }
    let bytes = encode_png(img).map_err(|e| write_failed(std::io::Error::other(e)))?;
    let tmp_path = path.with_extension("png.tmp");
    std::fs::write(&tmp_path, &bytes).map_err(write_failed)?;
    std::fs::rename(&tmp_path, path).map_err(write_failed)?;
    Ok(())
}
