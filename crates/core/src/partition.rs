//! Segment partitioning.
//!
//! Each detected title opens a card that runs until the next title (or the end
//! of the canvas). Rows before the first title are front matter and belong to
//! no card.

use serde::Serialize;
use thiserror::Error;

use crate::scanner::Candidate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Candidates out of order: {previous} is not before {next}")]
    Unsorted { previous: u32, next: u32 },
    #[error("Candidate at {start_y} lies outside canvas of height {total_height}")]
    OutsideCanvas { start_y: u32, total_height: u32 },
}

/// The vertical range owned by one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start_y: u32,
    /// Exclusive.
    pub end_y: u32,
    /// The title that opened this segment.
    pub title: Candidate,
}

impl Segment {
    pub fn height(&self) -> u32 {
        self.end_y - self.start_y
    }

    /// Rows to hand to the recognizer: the title candidate only, clipped to
    /// the segment.
    pub fn title_range(&self) -> (u32, u32) {
        (self.title.start_y, self.title.end_y.min(self.end_y))
    }
}

/// Split `[candidates[0].start_y, total_height)` into contiguous segments.
pub fn partition(
    candidates: &[Candidate],
    total_height: u32,
) -> Result<Vec<Segment>, PartitionError> {
    for pair in candidates.windows(2) {
        if pair[0].start_y >= pair[1].start_y || pair[0].end_y > pair[1].start_y {
            return Err(PartitionError::Unsorted {
                previous: pair[0].start_y,
                next: pair[1].start_y,
            });
        }
    }
    if let Some(outside) = candidates.iter().find(|c| c.end_y > total_height) {
        return Err(PartitionError::OutsideCanvas {
            start_y: outside.start_y,
            total_height,
        });
    }

    let ends = candidates
        .iter()
        .skip(1)
        .map(|next| next.start_y)
        .chain(std::iter::once(total_height));

    Ok(candidates
        .iter()
        .zip(ends)
        .map(|(title, end_y)| Segment {
            start_y: title.start_y,
            end_y,
            title: *title,
        })
        .collect())
}
