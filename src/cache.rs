//! In-memory cache of finished page rasters.
//!
//! Entries are keyed by `(file, bucket, page)`. A [`BucketKey`] pairs the
//! render mode with a fingerprint of every setting that changes the output,
//! so switching modes or retuning thresholds never serves a stale raster.
//! The footer cut from page 1 is stored per `(file, bucket)`. Nothing is
//! evicted; drop the [`PageCache`] (or call [`PageCache::clear`]) to release
//! memory.

use crate::config::{CondenseConfig, RenderMode};
use image::RgbaImage;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Opaque identity of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u64);

impl FileId {
    /// Identity chosen by the caller (e.g. an upload id).
    pub fn new(token: u64) -> Self {
        Self(token)
    }

    /// Identity of a file on disk: canonical path, size and modification
    /// time. Rewriting the file yields a new id.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let canonical = path.canonicalize()?;
        let meta = std::fs::metadata(&canonical)?;
        let mut h = DefaultHasher::new();
        canonical.hash(&mut h);
        meta.len().hash(&mut h);
        if let Ok(modified) = meta.modified() {
            if let Ok(since) = modified.duration_since(UNIX_EPOCH) {
                since.as_nanos().hash(&mut h);
            }
        }
        Ok(Self(h.finish()))
    }

    /// Identity of an in-memory document, by content.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut h = DefaultHasher::new();
        bytes.hash(&mut h);
        Self(h.finish())
    }
}

/// Cache bucket: render mode plus a fingerprint of the output settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub mode: RenderMode,
    pub settings: u64,
}

impl BucketKey {
    pub fn new(mode: RenderMode, settings: u64) -> Self {
        Self { mode, settings }
    }

    /// Bucket for the output `config` produces.
    ///
    /// Scale and the render cap change every mode's raster. Thresholds only
    /// matter once pages are analysed, so `Original` ignores them, and only
    /// `Normal` pages can carry seam annotations.
    pub fn for_config(config: &CondenseConfig) -> Self {
        let mut h = DefaultHasher::new();
        config.scale.to_bits().hash(&mut h);
        config.max_rendered_pixels.hash(&mut h);
        if config.mode != RenderMode::Original {
            format!("{:?}", config.thresholds).hash(&mut h);
        }
        if config.mode == RenderMode::Normal {
            config.annotate_condensed.hash(&mut h);
        }
        Self::new(config.mode, h.finish())
    }
}

#[derive(Debug, Default)]
struct ModeBucket {
    pages: HashMap<usize, Arc<RgbaImage>>,
    footer: Option<Arc<RgbaImage>>,
}

/// Page rasters keyed by file, bucket and 0-based page index.
#[derive(Debug, Default)]
pub struct PageCache {
    files: HashMap<FileId, HashMap<BucketKey, ModeBucket>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file: FileId, bucket: BucketKey, page_index: usize) -> Option<Arc<RgbaImage>> {
        self.files
            .get(&file)?
            .get(&bucket)?
            .pages
            .get(&page_index)
            .cloned()
    }

    pub fn insert(&mut self, file: FileId, bucket: BucketKey, page_index: usize, image: Arc<RgbaImage>) {
        self.bucket_mut(file, bucket).pages.insert(page_index, image);
    }

    pub fn footer(&self, file: FileId, bucket: BucketKey) -> Option<Arc<RgbaImage>> {
        self.files.get(&file)?.get(&bucket)?.footer.clone()
    }

    pub fn set_footer(&mut self, file: FileId, bucket: BucketKey, footer: Arc<RgbaImage>) {
        self.bucket_mut(file, bucket).footer = Some(footer);
    }

    /// Number of cached pages across all files and buckets.
    pub fn len(&self) -> usize {
        self.files
            .values()
            .flat_map(HashMap::values)
            .map(|b| b.pages.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything cached for one file.
    pub fn evict_file(&mut self, file: FileId) {
        self.files.remove(&file);
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    fn bucket_mut(&mut self, file: FileId, bucket: BucketKey) -> &mut ModeBucket {
        self.files.entry(file).or_default().entry(bucket).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NORMAL: BucketKey = BucketKey {
        mode: RenderMode::Normal,
        settings: 0,
    };

    fn img(h: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(1, h))
    }

    #[test]
    fn entries_are_separated_by_mode() {
        let mut cache = PageCache::new();
        let file = FileId::new(7);
        cache.insert(file, NORMAL, 0, img(3));
        assert!(cache.get(file, NORMAL, 0).is_some());
        assert!(cache.get(file, BucketKey::new(RenderMode::Debug, 0), 0).is_none());
        assert!(cache.get(file, BucketKey::new(RenderMode::Normal, 1), 0).is_none());
        assert!(cache.get(FileId::new(8), NORMAL, 0).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hits_share_the_stored_raster() {
        let mut cache = PageCache::new();
        let file = FileId::new(1);
        let stored = img(5);
        cache.insert(file, NORMAL, 2, Arc::clone(&stored));
        let hit = cache.get(file, NORMAL, 2).unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
    }

    #[test]
    fn footer_lives_in_the_mode_bucket() {
        let mut cache = PageCache::new();
        let file = FileId::new(1);
        cache.set_footer(file, NORMAL, img(4));
        assert!(cache.footer(file, NORMAL).is_some());
        assert!(cache.footer(file, BucketKey::new(RenderMode::Original, 0)).is_none());
        cache.evict_file(file);
        assert!(cache.footer(file, NORMAL).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn bucket_fingerprint_follows_output_settings() {
        let base = CondenseConfig::default();
        assert_eq!(BucketKey::for_config(&base), BucketKey::for_config(&base.clone()));

        let mut retuned = base.clone();
        retuned.thresholds.min_digit_width = 19;
        assert_ne!(BucketKey::for_config(&base), BucketKey::for_config(&retuned));

        let mut rescaled = base.clone();
        rescaled.scale = 2.0;
        assert_ne!(BucketKey::for_config(&base), BucketKey::for_config(&rescaled));

        let mut original = base.clone();
        original.mode = RenderMode::Original;
        let mut original_retuned = retuned.clone();
        original_retuned.mode = RenderMode::Original;
        assert_eq!(
            BucketKey::for_config(&original),
            BucketKey::for_config(&original_retuned)
        );
    }

    #[test]
    fn file_ids_track_content_and_modification() {
        assert_eq!(FileId::from_bytes(b"%PDF-a"), FileId::from_bytes(b"%PDF-a"));
        assert_ne!(FileId::from_bytes(b"%PDF-a"), FileId::from_bytes(b"%PDF-b"));

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"%PDF-1").unwrap();
        let first = FileId::from_path(&path).unwrap();
        assert_eq!(first, FileId::from_path(&path).unwrap());
        std::fs::write(&path, b"%PDF-1.7 longer").unwrap();
        assert_ne!(first, FileId::from_path(&path).unwrap());
    }
}
