//! The paged canvas: a run of equally sized pages addressed as one tall image.
//!
//! Pages stay on their source and are decoded on demand through a small LRU
//! cache. [`PagedCanvas::materialize`] is the only way to read pixels across
//! page boundaries.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;

use cardscan_core::canvas::CanvasDescriptor;

use crate::RasterError;

/// Default number of decoded pages kept in memory.
pub const DEFAULT_CACHE_PAGES: usize = 4;

// ---------------------------------------------------------------------------
// Page sources
// ---------------------------------------------------------------------------

/// Where pages come from. Indices are the document's own page numbers.
pub trait PageSource: Send + Sync {
    /// Human-readable origin, persisted in the canvas descriptor.
    fn locator(&self) -> String;

    fn page_exists(&self, index: u32) -> bool;

    /// `(width, height)` of a page, reading as little as possible.
    fn page_dimensions(&self, index: u32) -> Result<(u32, u32), RasterError>;

    fn load_page(&self, index: u32) -> Result<RgbImage, RasterError>;
}

/// Pages stored as `{dir}/{index}.{extension}`.
#[derive(Debug, Clone)]
pub struct DirectoryPageSource {
    dir: PathBuf,
    extension: String,
}

impl DirectoryPageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_extension(dir, "png")
    }

    pub fn with_extension(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{index}.{}", self.extension))
    }
}

impl PageSource for DirectoryPageSource {
    fn locator(&self) -> String {
        self.dir.display().to_string()
    }

    fn page_exists(&self, index: u32) -> bool {
        self.page_path(index).is_file()
    }

    fn page_dimensions(&self, index: u32) -> Result<(u32, u32), RasterError> {
        if !self.page_exists(index) {
            return Err(RasterError::MissingPage(index));
        }
        Ok(image::image_dimensions(self.page_path(index))?)
    }

    fn load_page(&self, index: u32) -> Result<RgbImage, RasterError> {
        if !self.page_exists(index) {
            return Err(RasterError::MissingPage(index));
        }
        crate::open_rgb(&self.page_path(index))
    }
}

/// Already decoded pages, numbered from `start_index`.
#[derive(Debug, Clone, Default)]
pub struct MemoryPageSource {
    start_index: u32,
    pages: Vec<RgbImage>,
}

impl MemoryPageSource {
    pub fn new(start_index: u32, pages: Vec<RgbImage>) -> Self {
        Self { start_index, pages }
    }

    fn get(&self, index: u32) -> Option<&RgbImage> {
        let offset = index.checked_sub(self.start_index)?;
        self.pages.get(offset as usize)
    }
}

impl PageSource for MemoryPageSource {
    fn locator(&self) -> String {
        "memory".to_string()
    }

    fn page_exists(&self, index: u32) -> bool {
        self.get(index).is_some()
    }

    fn page_dimensions(&self, index: u32) -> Result<(u32, u32), RasterError> {
        self.get(index)
            .map(RgbImage::dimensions)
            .ok_or(RasterError::MissingPage(index))
    }

    fn load_page(&self, index: u32) -> Result<RgbImage, RasterError> {
        self.get(index).cloned().ok_or(RasterError::MissingPage(index))
    }
}

// ---------------------------------------------------------------------------
// Page cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Least-recently-used cache of decoded pages, keyed by page index.
///
/// The most recently used page sits at the back of the queue. Capacity is a
/// handful of pages, so linear lookup is fine.
#[derive(Debug)]
pub struct PageCache {
    capacity: usize,
    entries: VecDeque<(u32, Arc<RgbImage>)>,
    stats: CacheStats,
}

impl PageCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Indices from least to most recently used.
    pub fn indices(&self) -> Vec<u32> {
        self.entries.iter().map(|(i, _)| *i).collect()
    }

    pub fn get(&mut self, index: u32) -> Option<Arc<RgbImage>> {
        match self.entries.iter().position(|(i, _)| *i == index) {
            Some(pos) => {
                self.stats.hits += 1;
                let entry = self.entries.remove(pos)?;
                let page = Arc::clone(&entry.1);
                self.entries.push_back(entry);
                Some(page)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, index: u32, page: Arc<RgbImage>) {
        if let Some(pos) = self.entries.iter().position(|(i, _)| *i == index) {
            self.entries.remove(pos);
        }
        while self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                log::debug!("page cache: evicting page {evicted}");
            }
        }
        self.entries.push_back((index, page));
    }
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

pub struct PagedCanvas<S> {
    descriptor: CanvasDescriptor,
    source: S,
    cache: Mutex<PageCache>,
}

impl<S: PageSource> PagedCanvas<S> {
    /// Validate the page range `[start, end]` on `source` and build a canvas.
    ///
    /// Every page must exist and share the first page's dimensions; nothing is
    /// decoded beyond image headers.
    pub fn build(source: S, start: u32, end: u32) -> Result<Self, RasterError> {
        if !source.page_exists(start) {
            return Err(RasterError::MissingPage(start));
        }
        let (page_width, page_height) = source.page_dimensions(start)?;
        let descriptor =
            CanvasDescriptor::new(source.locator(), start, end, page_width, page_height)?;

        for index in start..=end {
            if !source.page_exists(index) {
                return Err(RasterError::MissingPage(index));
            }
            let (w, h) = source.page_dimensions(index)?;
            if (w, h) != (page_width, page_height) {
                return Err(RasterError::DimensionMismatch {
                    index,
                    expected_width: page_width,
                    expected_height: page_height,
                    found_width: w,
                    found_height: h,
                });
            }
        }

        log::debug!(
            "built canvas over pages {start}..={end} of {}: {page_width}x{page_height}, {} rows",
            descriptor.source_locator,
            descriptor.total_height
        );

        Ok(Self::from_parts(source, descriptor))
    }

    /// Rebuild a canvas from a persisted descriptor without rescanning pages.
    pub fn open(source: S, descriptor: CanvasDescriptor) -> Result<Self, RasterError> {
        descriptor.validate()?;
        Ok(Self::from_parts(source, descriptor))
    }

    fn from_parts(source: S, descriptor: CanvasDescriptor) -> Self {
        Self {
            descriptor,
            source,
            cache: Mutex::new(PageCache::new(DEFAULT_CACHE_PAGES)),
        }
    }

    /// Replace the page cache with an empty one of the given capacity.
    pub fn with_cache_capacity(mut self, pages: usize) -> Self {
        self.cache = Mutex::new(PageCache::new(pages));
        self
    }

    pub fn descriptor(&self) -> &CanvasDescriptor {
        &self.descriptor
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.descriptor.page_width
    }

    pub fn total_height(&self) -> u32 {
        self.descriptor.total_height
    }

    pub fn page_count(&self) -> u32 {
        self.descriptor.page_count()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, PageCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decoded page at `offset` from the start of the canvas.
    pub fn page(&self, offset: u32) -> Result<Arc<RgbImage>, RasterError> {
        if offset >= self.page_count() {
            return Err(RasterError::MissingPage(
                self.descriptor.start_index.saturating_add(offset),
            ));
        }
        let index = self.descriptor.start_index + offset;

        if let Some(page) = self.lock_cache().get(index) {
            return Ok(page);
        }

        log::debug!("page cache miss: decoding page {index}");
        let page = self.source.load_page(index)?;
        let (w, h) = page.dimensions();
        if (w, h) != (self.descriptor.page_width, self.descriptor.page_height) {
            return Err(RasterError::DimensionMismatch {
                index,
                expected_width: self.descriptor.page_width,
                expected_height: self.descriptor.page_height,
                found_width: w,
                found_height: h,
            });
        }

        let page = Arc::new(page);
        self.lock_cache().insert(index, Arc::clone(&page));
        Ok(page)
    }

    /// Pixels of global rows `[y_start, y_end)`, stitched across pages.
    pub fn materialize(&self, y_start: u32, y_end: u32) -> Result<RgbImage, RasterError> {
        let plan = self.descriptor.slice_plan(y_start, y_end)?;
        let row_len = self.descriptor.page_width as usize * 3;

        let mut out = RgbImage::new(self.descriptor.page_width, y_end - y_start);
        let dst: &mut [u8] = &mut out;
        let mut cursor = 0;
        for slice in plan {
            let page = self.page(slice.page_offset)?;
            let src = &page.as_raw()
                [slice.local_top as usize * row_len..slice.local_bottom as usize * row_len];
            dst[cursor..cursor + src.len()].copy_from_slice(src);
            cursor += src.len();
        }

        Ok(out)
    }
}
