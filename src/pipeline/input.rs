//! Input resolution: validate a user-supplied path or byte buffer as a PDF.
//!
//! pdfium opens documents from the file system, so in-memory input is spilled
//! to a `TempDir` that lives as long as the [`ResolvedInput`]. The `%PDF`
//! magic is checked up front so callers get a meaningful error rather than a
//! pdfium parse failure.

use crate::error::CondenseError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A PDF on disk, ready for pdfium.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input arrived as bytes; the `TempDir` is kept alive until processing
    /// completes.
    Spilled { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Spilled { path, .. } => path,
        }
    }
}

/// Validate a local file: it must exist, be readable and start with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, CondenseError> {
    let path = path.to_path_buf();
    if !path.exists() {
        return Err(CondenseError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(CondenseError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(CondenseError::PermissionDenied { path });
        }
        Err(_) => return Err(CondenseError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Check the magic bytes of an in-memory PDF and write it to a temp file.
pub fn spill_bytes(bytes: &[u8]) -> Result<ResolvedInput, CondenseError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(CondenseError::NotAPdf {
            path: PathBuf::from("<bytes>"),
            magic,
        });
    }

    let temp_dir = TempDir::new().map_err(|e| CondenseError::Internal(e.to_string()))?;
    let path = temp_dir.path().join("input.pdf");
    std::fs::write(&path, bytes)
        .map_err(|e| CondenseError::Internal(format!("Failed to write temp file: {e}")))?;

    debug!("Spilled {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Spilled {
        path,
        _temp_dir: temp_dir,
    })
}
