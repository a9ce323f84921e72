//! Copyright/footer extraction from below the last staff of the first page.

use image::RgbaImage;
use tracing::debug;

use super::raster::{is_line_dark, row_has};
use crate::config::Thresholds;
use crate::error::PageError;

/// Cut the footer out of `img`, scanning from `last_staff_bottom` down.
///
/// The scan first walks up from the page bottom over any contiguous dark rows
/// (a footer rule flush with the edge), skips `footer_skip_rows` rows to step
/// over staff-line residue, then takes everything from the first dark row to
/// the bottom. The result is prefixed with `footer_top_padding` white rows.
///
/// Returns `Ok(None)` when there is nothing dark below the staves.
pub fn extract_footer(
    img: &RgbaImage,
    last_staff_bottom: u32,
    t: &Thresholds,
) -> Result<Option<RgbaImage>, PageError> {
    let (w, h) = img.dimensions();
    if last_staff_bottom >= h {
        return Ok(None);
    }
    let dark_row = |y: u32| row_has(img, y, |px| is_line_dark(px, t.line_darkness));

    let mut top = last_staff_bottom;
    for y in (last_staff_bottom..h).rev() {
        if !dark_row(y) {
            break;
        }
        top = y;
    }

    let Some(first) = (top.saturating_add(t.footer_skip_rows)..h).find(|&y| dark_row(y)) else {
        debug!(last_staff_bottom, "no footer below staves");
        return Ok(None);
    };

    let pad = t.footer_top_padding;
    let too_tall = || PageError::FooterFailed {
        detail: format!("{pad} rows of padding do not fit above a {w}px wide footer"),
    };
    let height = pad.checked_add(h - first).ok_or_else(too_tall)?;
    let row_bytes = w as usize * 4;
    let pad_bytes = (pad as usize).checked_mul(row_bytes).ok_or_else(too_tall)?;
    let mut raw = vec![255u8; pad_bytes];
    let src = img.as_raw();
    raw.extend_from_slice(&src[first as usize * row_bytes..]);

    let footer = RgbaImage::from_raw(w, height, raw).ok_or_else(|| PageError::FooterFailed {
        detail: format!("buffer does not fit {w}x{height}"),
    })?;
    debug!(first_row = first, height = footer.height(), "footer extracted");
    Ok(Some(footer))
}
