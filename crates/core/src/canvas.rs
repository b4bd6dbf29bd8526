//! Canvas descriptor and the coordinate math of the virtual long image.
//!
//! A canvas is a dense run of equally sized pages `[start_index, end_index]`
//! stacked vertically. Rows are addressed with a single global `y`; this module
//! maps global ranges onto per-page crops. It never touches pixels.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("Requested rows {start}..{end} outside canvas 0..{total}")]
    OutOfRange { start: u32, end: u32, total: u32 },
    #[error("Invalid canvas: {0}")]
    InvalidRange(String),
    #[error("Inconsistent canvas descriptor: {0}")]
    Inconsistent(String),
}

/// Persisted description of a canvas. Enough to rebuild coordinate math
/// without rescanning the page source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasDescriptor {
    pub source_locator: String,
    pub start_index: u32,
    pub end_index: u32,
    pub page_width: u32,
    pub page_height: u32,
    pub total_height: u32,
}

/// Where a global row lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    pub page_offset: u32,
    pub page_index: u32,
    pub local_y: u32,
}

/// The part of one page covered by a global row range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlice {
    pub page_index: u32,
    pub page_offset: u32,
    pub local_top: u32,
    pub local_bottom: u32,
}

impl PageSlice {
    pub fn height(&self) -> u32 {
        self.local_bottom - self.local_top
    }
}

impl CanvasDescriptor {
    pub fn new(
        source_locator: impl Into<String>,
        start_index: u32,
        end_index: u32,
        page_width: u32,
        page_height: u32,
    ) -> Result<Self, CanvasError> {
        if end_index < start_index {
            return Err(CanvasError::InvalidRange(format!(
                "end index {end_index} is before start index {start_index}"
            )));
        }
        if page_width == 0 || page_height == 0 {
            return Err(CanvasError::InvalidRange(format!(
                "page size {page_width}x{page_height} is empty"
            )));
        }
        let page_count = end_index - start_index + 1;
        let total_height = page_count.checked_mul(page_height).ok_or_else(|| {
            CanvasError::InvalidRange(format!(
                "{page_count} pages of height {page_height} overflow the row space"
            ))
        })?;

        Ok(Self {
            source_locator: source_locator.into(),
            start_index,
            end_index,
            page_width,
            page_height,
            total_height,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.end_index - self.start_index + 1
    }

    /// Check a descriptor read from disk against its own invariants.
    pub fn validate(&self) -> Result<(), CanvasError> {
        let rebuilt = Self::new(
            self.source_locator.clone(),
            self.start_index,
            self.end_index,
            self.page_width,
            self.page_height,
        )
        .map_err(|e| CanvasError::Inconsistent(e.to_string()))?;
        if rebuilt.total_height != self.total_height {
            return Err(CanvasError::Inconsistent(format!(
                "total_height {} does not match {} pages of height {}",
                self.total_height,
                self.page_count(),
                self.page_height
            )));
        }
        Ok(())
    }

    pub fn from_json(s: &str) -> Result<Self, CanvasError> {
        let descriptor: Self =
            serde_json::from_str(s).map_err(|e| CanvasError::Inconsistent(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn load(path: &Path) -> Result<Self, CanvasError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CanvasError::Inconsistent(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_json()?)
    }

    pub fn locate(&self, y: u32) -> Result<PagePosition, CanvasError> {
        if y >= self.total_height {
            return Err(CanvasError::OutOfRange {
                start: y,
                end: y.saturating_add(1),
                total: self.total_height,
            });
        }
        let page_offset = y / self.page_height;
        Ok(PagePosition {
            page_offset,
            page_index: self.start_index + page_offset,
            local_y: y % self.page_height,
        })
    }

    /// Split the half-open global range `[y_start, y_end)` into page crops,
    /// in page order.
    pub fn slice_plan(&self, y_start: u32, y_end: u32) -> Result<Vec<PageSlice>, CanvasError> {
        if y_start >= y_end || y_end > self.total_height {
            return Err(CanvasError::OutOfRange {
                start: y_start,
                end: y_end,
                total: self.total_height,
            });
        }

        let first_offset = y_start / self.page_height;
        // `y_end` is exclusive: a range ending on a page boundary stops there.
        let last_offset = (y_end - 1) / self.page_height;

        Ok((first_offset..=last_offset)
            .map(|offset| {
                let page_top = offset * self.page_height;
                let local_top = if offset == first_offset {
                    y_start - page_top
                } else {
                    0
                };
                let local_bottom = if offset == last_offset {
                    y_end - page_top
                } else {
                    self.page_height
                };
                PageSlice {
                    page_index: self.start_index + offset,
                    page_offset: offset,
                    local_top,
                    local_bottom,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> CanvasDescriptor {
        CanvasDescriptor::new("pages", 30, 32, 50, 100).unwrap()
    }

    #[test]
    fn test_total_height() {
        let d = descriptor();
        assert_eq!(d.page_count(), 3);
        assert_eq!(d.total_height, 300);
    }

    #[test]
    fn test_single_page_canvas() {
        let d = CanvasDescriptor::new("pages", 7, 7, 10, 20).unwrap();
        assert_eq!(d.total_height, 20);
    }

    #[test]
    fn test_new_rejects_reversed_range_and_empty_pages() {
        assert!(CanvasDescriptor::new("p", 5, 4, 10, 10).is_err());
        assert!(CanvasDescriptor::new("p", 1, 4, 0, 10).is_err());
        assert!(CanvasDescriptor::new("p", 1, 4, 10, 0).is_err());
    }

    #[test]
    fn test_locate() {
        let d = descriptor();
        let pos = d.locate(150).unwrap();
        assert_eq!(pos.page_offset, 1);
        assert_eq!(pos.page_index, 31);
        assert_eq!(pos.local_y, 50);
        assert_eq!(d.locate(0).unwrap().page_index, 30);
        assert!(d.locate(300).is_err());
    }

    #[test]
    fn test_slice_within_one_page() {
        let plan = descriptor().slice_plan(110, 180).unwrap();
        assert_eq!(
            plan,
            vec![PageSlice {
                page_index: 31,
                page_offset: 1,
                local_top: 10,
                local_bottom: 80,
            }]
        );
    }

    #[test]
    fn test_slice_across_pages() {
        let plan = descriptor().slice_plan(70, 230).unwrap();
        let spans: Vec<_> = plan
            .iter()
            .map(|s| (s.page_index, s.local_top, s.local_bottom))
            .collect();
        assert_eq!(spans, vec![(30, 70, 100), (31, 0, 100), (32, 0, 30)]);
        assert_eq!(plan.iter().map(PageSlice::height).sum::<u32>(), 160);
    }

    #[test]
    fn test_slice_ending_on_page_boundary_stays_on_page() {
        let plan = descriptor().slice_plan(50, 200).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].page_index, 31);
        assert_eq!(plan[1].local_bottom, 100);
    }

    #[test]
    fn test_full_canvas_slice() {
        let plan = descriptor().slice_plan(0, 300).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|s| s.height() == 100));
    }

    #[test]
    fn test_slice_out_of_range() {
        let d = descriptor();
        assert_eq!(
            d.slice_plan(10, 301),
            Err(CanvasError::OutOfRange {
                start: 10,
                end: 301,
                total: 300
            })
        );
        assert!(d.slice_plan(20, 20).is_err());
        assert!(d.slice_plan(30, 20).is_err());
    }

    #[test]
    fn test_json_roundtrip_and_field_names() {
        let d = descriptor();
        let json = d.to_json().unwrap();
        assert!(json.contains("\"source_locator\""));
        assert!(json.contains("\"total_height\": 300"));
        assert_eq!(CanvasDescriptor::from_json(&json).unwrap(), d);
    }

    #[test]
    fn test_inconsistent_descriptor_rejected() {
        let json = r#"{
            "source_locator": "pages",
            "start_index": 30,
            "end_index": 32,
            "page_width": 50,
            "page_height": 100,
            "total_height": 250
        }"#;
        assert!(matches!(
            CanvasDescriptor::from_json(json),
            Err(CanvasError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("canvas.json");
        let d = descriptor();
        d.save(&path).unwrap();
        assert_eq!(CanvasDescriptor::load(&path).unwrap(), d);
    }
}
