//! Row status reduction.
//!
//! Collapses a classified raster into one [`RowStatus`] per row plus the
//! marker geometry of that row. The scanner only ever looks at this profile,
//! so a whole canvas can be profiled page by page without holding its label
//! map in memory.

use thiserror::Error;

/// Reserved pixel label codes. Palette colors use `0..n` in palette order.
pub mod label {
    pub const BACKGROUND: u8 = 0xFF;
    pub const OTHER: u8 = 0xFE;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowStatus {
    /// Every pixel is background.
    Blank,
    /// Marker pixels on background, nothing else.
    Marker,
    /// At least one pixel that is neither background nor marker.
    Mixed,
}

/// Horizontal extent of the marker pixels in one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerRowStats {
    /// Leftmost marker column.
    pub left: u32,
    /// Rightmost marker column.
    pub right: u32,
    /// Longest run of horizontally adjacent marker pixels.
    pub longest_run: u32,
}

impl MarkerRowStats {
    /// Reduce one row of a marker mask. `None` when the row has no marker.
    pub fn from_mask_row(mask: &[bool]) -> Option<Self> {
        Self::from_flags(mask.iter().copied())
    }

    pub fn from_label_row(labels: &[u8], marker: u8) -> Option<Self> {
        Self::from_flags(labels.iter().map(|&l| l == marker))
    }

    fn from_flags(mask: impl Iterator<Item = bool>) -> Option<Self> {
        let mut left = None;
        let mut right = 0u32;
        let mut run = 0u32;
        let mut longest_run = 0u32;

        for (x, is_marker) in mask.enumerate() {
            if is_marker {
                let x = x as u32;
                left.get_or_insert(x);
                right = x;
                run += 1;
                longest_run = longest_run.max(run);
            } else {
                run = 0;
            }
        }

        left.map(|left| MarkerRowStats {
            left,
            right,
            longest_run,
        })
    }

    pub fn span(&self) -> u32 {
        self.right - self.left
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowProfileError {
    #[error("Row profile width mismatch: expected {expected}, found {found}")]
    WidthMismatch { expected: u32, found: u32 },
    #[error("Label buffer of {len} bytes is not a whole number of {width}-pixel rows")]
    RaggedLabels { len: usize, width: u32 },
}

/// Per-row summary of a contiguous run of rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowProfile {
    pub width: u32,
    pub statuses: Vec<RowStatus>,
    pub marker: Vec<Option<MarkerRowStats>>,
}

impl RowProfile {
    pub fn new(width: u32) -> Self {
        Self {
            width,
            statuses: Vec::new(),
            marker: Vec::new(),
        }
    }

    pub fn with_capacity(width: u32, rows: usize) -> Self {
        Self {
            width,
            statuses: Vec::with_capacity(rows),
            marker: Vec::with_capacity(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn push(&mut self, status: RowStatus, marker: Option<MarkerRowStats>) {
        self.statuses.push(status);
        self.marker.push(marker);
    }

    /// Append the rows of a profile computed for the next chunk of the canvas.
    pub fn extend(&mut self, other: RowProfile) -> Result<(), RowProfileError> {
        if self.is_empty() && self.width == 0 {
            self.width = other.width;
        }
        if other.width != self.width {
            return Err(RowProfileError::WidthMismatch {
                expected: self.width,
                found: other.width,
            });
        }
        self.statuses.extend(other.statuses);
        self.marker.extend(other.marker);
        Ok(())
    }

    pub fn count(&self, status: RowStatus) -> usize {
        self.statuses.iter().filter(|&&s| s == status).count()
    }
}

/// Reduce a row-major label buffer of `width` columns into a [`RowProfile`].
///
/// A row with any non-background, non-marker pixel is `Mixed` even when it
/// also carries marker pixels.
pub fn reduce_rows(labels: &[u8], width: u32, marker: u8) -> Result<RowProfile, RowProfileError> {
    if width == 0 || labels.len() % width as usize != 0 {
        return Err(RowProfileError::RaggedLabels {
            len: labels.len(),
            width,
        });
    }

    let rows = labels.len() / width as usize;
    let mut profile = RowProfile::with_capacity(width, rows);

    for row in labels.chunks_exact(width as usize) {
        let has_other = row
            .iter()
            .any(|&l| l != label::BACKGROUND && l != marker);
        let stats = MarkerRowStats::from_label_row(row, marker);
        let status = match (has_other, stats.is_some()) {
            (true, _) => RowStatus::Mixed,
            (false, true) => RowStatus::Marker,
            (false, false) => RowStatus::Blank,
        };
        profile.push(status, stats);
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: u8 = label::BACKGROUND;
    const INK: u8 = 0;
    const MARK: u8 = 1;

    #[test]
    fn test_row_statuses() {
        #[rustfmt::skip]
        let labels = vec![
            BG, BG, BG, BG,
            BG, MARK, MARK, BG,
            BG, MARK, INK, BG,
            label::OTHER, BG, BG, BG,
        ];
        let profile = reduce_rows(&labels, 4, MARK).unwrap();
        assert_eq!(
            profile.statuses,
            vec![
                RowStatus::Blank,
                RowStatus::Marker,
                RowStatus::Mixed,
                RowStatus::Mixed
            ]
        );
        assert_eq!(profile.count(RowStatus::Mixed), 2);
    }

    #[test]
    fn test_marker_stats_per_row() {
        #[rustfmt::skip]
        let labels = vec![
            BG, MARK, MARK, BG, MARK, MARK, MARK, BG,
            BG, BG, BG, BG, BG, BG, BG, BG,
        ];
        let profile = reduce_rows(&labels, 8, MARK).unwrap();
        assert_eq!(
            profile.marker[0],
            Some(MarkerRowStats {
                left: 1,
                right: 6,
                longest_run: 3
            })
        );
        assert_eq!(profile.marker[0].unwrap().span(), 5);
        assert_eq!(profile.marker[1], None);
    }

    #[test]
    fn test_mask_row_stats() {
        assert_eq!(MarkerRowStats::from_mask_row(&[false, false]), None);
        let stats = MarkerRowStats::from_mask_row(&[true, true, true, true]).unwrap();
        assert_eq!((stats.left, stats.right, stats.longest_run), (0, 3, 4));
    }

    #[test]
    fn test_ragged_buffer_rejected() {
        assert!(reduce_rows(&[BG; 7], 4, MARK).is_err());
        assert!(reduce_rows(&[], 0, MARK).is_err());
    }

    #[test]
    fn test_extend_profiles() {
        let mut a = reduce_rows(&[BG, BG, MARK, BG], 2, MARK).unwrap();
        let b = reduce_rows(&[INK, BG], 2, MARK).unwrap();
        a.extend(b).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a.statuses[2], RowStatus::Mixed);

        let c = reduce_rows(&[BG, BG, BG], 3, MARK).unwrap();
        assert_eq!(
            a.extend(c),
            Err(RowProfileError::WidthMismatch {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_extend_into_empty_profile_adopts_width() {
        let mut profile = RowProfile::default();
        profile
            .extend(reduce_rows(&[BG, MARK, BG], 3, MARK).unwrap())
            .unwrap();
        assert_eq!(profile.width, 3);
        assert_eq!(profile.statuses, vec![RowStatus::Marker]);
    }
}
