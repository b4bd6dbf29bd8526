//! Title-band scanner.
//!
//! Title bands in the source document are marker-colored strips of roughly
//! fixed height framed by generous whitespace. The scanner walks a
//! [`RowProfile`] once, top to bottom, as a finite state machine:
//!
//! ```text
//!            +-------------------- reject (skip whole marker run) ------+
//!            v                                                          |
//!   SeekMarker -> MeasureTopGap -> MeasureBand -> MeasureBottomGap -> PixelValidate
//!        ^                                                              |
//!        +------------------------------ Emit <------------------------+
//! ```
//!
//! Every transition back to `SeekMarker` resumes after the marker run under
//! examination, so a run is judged exactly once and never revisited row by
//! row. Rejections are normal outcomes; they are counted, not reported as
//! errors.

use serde::Serialize;

use crate::config::ScanThresholds;
use crate::rows::{RowProfile, RowStatus};

/// A detected title: the marker run plus the whitespace framing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// First row of the top padding (inclusive).
    pub start_y: u32,
    /// Row after the bottom padding (exclusive).
    pub end_y: u32,
    pub band_start: u32,
    pub band_end: u32,
}

impl Candidate {
    pub fn height(&self) -> u32 {
        self.end_y - self.start_y
    }

    pub fn band_height(&self) -> u32 {
        self.band_end - self.band_start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Not enough blank rows above the marker run.
    TopGap,
    /// Marker run shorter or taller than a title band.
    BandHeight,
    /// Not enough blank rows below the marker run.
    BottomGap,
    /// A row holds a long horizontal rule.
    ContiguousRun,
    /// No row spans wide enough.
    TooNarrow,
    /// The band reaches into a page-edge margin.
    TouchesEdge,
    /// The band does not straddle the page center.
    OffCenter,
}

/// Rejection counts per reason, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub top_gap: usize,
    pub band_height: usize,
    pub bottom_gap: usize,
    pub contiguous_run: usize,
    pub too_narrow: usize,
    pub touches_edge: usize,
    pub off_center: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, reason: Rejection) {
        let slot = match reason {
            Rejection::TopGap => &mut self.top_gap,
            Rejection::BandHeight => &mut self.band_height,
            Rejection::BottomGap => &mut self.bottom_gap,
            Rejection::ContiguousRun => &mut self.contiguous_run,
            Rejection::TooNarrow => &mut self.too_narrow,
            Rejection::TouchesEdge => &mut self.touches_edge,
            Rejection::OffCenter => &mut self.off_center,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.top_gap
            + self.band_height
            + self.bottom_gap
            + self.contiguous_run
            + self.too_narrow
            + self.touches_edge
            + self.off_center
    }

    pub fn merge(&mut self, other: &RejectionCounts) {
        self.top_gap += other.top_gap;
        self.band_height += other.band_height;
        self.bottom_gap += other.bottom_gap;
        self.contiguous_run += other.contiguous_run;
        self.too_narrow += other.too_narrow;
        self.touches_edge += other.touches_edge;
        self.off_center += other.off_center;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub candidates: Vec<Candidate>,
    pub rejections: RejectionCounts,
    pub rows_scanned: usize,
}

/// A marker run under examination, in profile-local rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Band {
    run_start: usize,
    run_end: usize,
    top_gap: usize,
    bottom_gap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekMarker,
    MeasureTopGap { run_start: usize },
    MeasureBand { run_start: usize, top_gap: usize },
    MeasureBottomGap { band: Band },
    PixelValidate { band: Band },
    Emit { band: Band },
    Done,
}

struct Scanner<'a> {
    profile: &'a RowProfile,
    thresholds: &'a ScanThresholds,
    offset: u32,
    cursor: usize,
    /// End of the last emitted candidate, profile-local.
    last_end: usize,
    report: ScanReport,
}

impl<'a> Scanner<'a> {
    fn new(profile: &'a RowProfile, thresholds: &'a ScanThresholds, offset: u32) -> Self {
        Self {
            profile,
            thresholds,
            offset,
            cursor: 0,
            last_end: 0,
            report: ScanReport {
                rows_scanned: profile.len(),
                ..Default::default()
            },
        }
    }

    fn run(mut self) -> ScanReport {
        let mut state = State::SeekMarker;
        while state != State::Done {
            state = self.step(state);
        }
        self.report
    }

    fn step(&mut self, state: State) -> State {
        let statuses = &self.profile.statuses;
        match state {
            State::SeekMarker => {
                match statuses[self.cursor..]
                    .iter()
                    .position(|&s| s == RowStatus::Marker)
                {
                    Some(found) => State::MeasureTopGap {
                        run_start: self.cursor + found,
                    },
                    None => {
                        self.cursor = statuses.len();
                        State::Done
                    }
                }
            }
            State::MeasureTopGap { run_start } => {
                let top_gap = statuses[..run_start]
                    .iter()
                    .rev()
                    .take_while(|&&s| s == RowStatus::Blank)
                    .count();
                if top_gap <= self.thresholds.min_top_gap as usize {
                    self.cursor = self.marker_run_end(run_start);
                    return self.reject(Rejection::TopGap, run_start);
                }
                State::MeasureBand { run_start, top_gap }
            }
            State::MeasureBand { run_start, top_gap } => {
                let run_end = self.marker_run_end(run_start);
                self.cursor = run_end;
                let height = run_end - run_start;
                let bounds = self.thresholds.min_band_height as usize
                    ..=self.thresholds.max_band_height as usize;
                if !bounds.contains(&height) {
                    return self.reject(Rejection::BandHeight, run_start);
                }
                State::MeasureBottomGap {
                    band: Band {
                        run_start,
                        run_end,
                        top_gap,
                        bottom_gap: 0,
                    },
                }
            }
            State::MeasureBottomGap { mut band } => {
                band.bottom_gap = statuses[band.run_end..]
                    .iter()
                    .take_while(|&&s| s == RowStatus::Blank)
                    .count();
                if band.bottom_gap <= self.thresholds.min_bottom_gap as usize {
                    return self.reject(Rejection::BottomGap, band.run_start);
                }
                State::PixelValidate { band }
            }
            State::PixelValidate { band } => match self.validate_pixels(&band) {
                Ok(()) => State::Emit { band },
                Err(reason) => self.reject(reason, band.run_start),
            },
            State::Emit { band } => {
                // Neighbouring titles can share one blank run; the earlier
                // candidate keeps it.
                let start = (band.run_start - band.top_gap).max(self.last_end);
                let end = band.run_end + band.bottom_gap;
                self.last_end = end;
                self.report.candidates.push(Candidate {
                    start_y: self.offset + start as u32,
                    end_y: self.offset + end as u32,
                    band_start: self.offset + band.run_start as u32,
                    band_end: self.offset + band.run_end as u32,
                });
                State::SeekMarker
            }
            State::Done => State::Done,
        }
    }

    fn reject(&mut self, reason: Rejection, run_start: usize) -> State {
        log::trace!(
            "marker run at row {} rejected: {:?}",
            self.offset as usize + run_start,
            reason
        );
        self.report.rejections.record(reason);
        State::SeekMarker
    }

    fn marker_run_end(&self, run_start: usize) -> usize {
        let statuses = &self.profile.statuses;
        run_start
            + statuses[run_start..]
                .iter()
                .take_while(|&&s| s == RowStatus::Marker)
                .count()
    }

    fn validate_pixels(&self, band: &Band) -> Result<(), Rejection> {
        let t = self.thresholds;
        let width = self.profile.width;

        let mut max_span = 0u32;
        let mut leftmost = u32::MAX;
        let mut rightmost = 0u32;
        let mut seen = false;

        for stats in self.profile.marker[band.run_start..band.run_end]
            .iter()
            .flatten()
        {
            if stats.longest_run >= t.max_contiguous_run {
                return Err(Rejection::ContiguousRun);
            }
            seen = true;
            max_span = max_span.max(stats.span());
            leftmost = leftmost.min(stats.left);
            rightmost = rightmost.max(stats.right);
        }

        if !seen || max_span <= t.min_width {
            return Err(Rejection::TooNarrow);
        }
        if leftmost <= t.edge_margin || rightmost >= width.saturating_sub(t.edge_margin) {
            return Err(Rejection::TouchesEdge);
        }
        let (center_left, center_right) = t.center_limits(width);
        if rightmost <= center_left || leftmost >= center_right {
            return Err(Rejection::OffCenter);
        }
        Ok(())
    }
}

/// Scan a profile whose first row is global row 0.
pub fn scan(profile: &RowProfile, thresholds: &ScanThresholds) -> ScanReport {
    scan_with_offset(profile, thresholds, 0)
}

/// Scan a profile whose first row is global row `offset`.
pub fn scan_with_offset(
    profile: &RowProfile,
    thresholds: &ScanThresholds,
    offset: u32,
) -> ScanReport {
    Scanner::new(profile, thresholds, offset).run()
}
