//! Core library for cardscan
//!
//! This crate implements the **Functional Core** of cardscan: everything that
//! decides where cards begin and end, with zero pixel decoding and zero
//! network access.
//!
//! # Architecture Overview
//!
//! - **`cardscan_core`** (this crate): pure functions over row profiles,
//!   coordinates and configuration
//! - **`raster`**: pixel work (classification, paged canvas, page cache)
//! - **`cardscan`**: the CLI shell (files, progress, recognizers)
//!
//! # Pipeline
//!
//! ```text
//! label map -> reduce_rows -> RowProfile -> scan -> Candidate[] -> partition -> Segment[]
//! ```
//!
//! # Module Organization
//!
//! - [`canvas`]: canvas descriptor and global-row to page-crop math
//! - [`color`]: `#RRGGBB` colors
//! - [`config`]: TOML configuration and scanner thresholds
//! - [`labels`]: sanitizing recognized titles into file names
//! - [`partition`]: candidates to card segments
//! - [`rows`]: row status reduction
//! - [`scanner`]: the title-band state machine
//!
//! # Example Usage
//!
//! ```rust
//! use cardscan_core::config::ScanThresholds;
//! use cardscan_core::rows::{label, reduce_rows};
//! use cardscan_core::scanner::scan;
//!
//! let labels = vec![label::BACKGROUND; 8 * 4];
//! let profile = reduce_rows(&labels, 8, 1).unwrap();
//! let report = scan(&profile, &ScanThresholds::default());
//! assert!(report.candidates.is_empty());
//! ```

pub mod canvas;
pub mod color;
pub mod config;
pub mod labels;
pub mod partition;
pub mod rows;
pub mod scanner;
