//! Configuration for the scanning pipeline.
//!
//! Every section of `cardscan.toml` is optional and every field falls back to
//! the tuning used for the source document (pale-blue `#00ACEF` title bands on
//! 1821px-wide cropped pages).
//!
//! ```toml
//! [palette]
//! tolerance = 110.0
//! marker = "marker"
//!
//! [[palette.colors]]
//! name = "ink"
//! color = "#000000"
//!
//! [[palette.colors]]
//! name = "marker"
//! color = "#00ACEF"
//!
//! [scan]
//! min_top_gap = 10
//! max_band_height = 58
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::Color;

/// Labels are stored as `u8`; the two highest codes are reserved.
pub const MAX_PALETTE_COLORS: usize = 250;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Complete configuration, one section per pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub palette: PaletteConfig,
    pub scan: ScanThresholds,
    pub title: TitlePrepConfig,
    pub crop: CropConfig,
    pub cache: CacheConfig,
    pub recognizer: RecognizerConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.palette.validate()?;
        self.scan.validate()?;
        if self.cache.pages == 0 {
            return Err(ConfigError::invalid("cache.pages", "must be at least 1"));
        }
        if self.recognizer.concurrency == 0 {
            return Err(ConfigError::invalid(
                "recognizer.concurrency",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedColor {
    pub name: String,
    pub color: Color,
}

impl NamedColor {
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }
}

/// What to do with pixels that are not within tolerance of any color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unmatched {
    /// Label them `OTHER` (they make a row MIXED).
    #[default]
    Other,
    /// Fold them into the background, like a pure tricolor rendering.
    Background,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub background: Color,
    /// Name of the palette entry that marks title bands.
    pub marker: String,
    /// Maximum Euclidean RGB distance (0 ~ 441) for a pixel to match a color.
    pub tolerance: f32,
    /// Pixels with every channel above this are forced to background.
    pub clean_threshold: u8,
    pub unmatched: Unmatched,
    /// Color used for `OTHER` pixels in rendered previews.
    pub other_color: Color,
    /// Foreground reference colors. Order matters: ties go to the first.
    pub colors: Vec<NamedColor>,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            background: Color::WHITE,
            marker: "marker".to_string(),
            tolerance: 110.0,
            clean_threshold: 240,
            unmatched: Unmatched::Other,
            other_color: Color::new(128, 128, 128),
            colors: vec![
                NamedColor::new("ink", Color::BLACK),
                NamedColor::new("marker", Color::new(0, 172, 239)),
            ],
        }
    }
}

impl PaletteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.colors.is_empty() {
            return Err(ConfigError::invalid("palette.colors", "must not be empty"));
        }
        if self.colors.len() > MAX_PALETTE_COLORS {
            return Err(ConfigError::invalid(
                "palette.colors",
                format!("at most {MAX_PALETTE_COLORS} colors are supported"),
            ));
        }
        let mut seen = HashSet::new();
        for entry in &self.colors {
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::invalid(
                    "palette.colors",
                    format!("duplicate color name '{}'", entry.name),
                ));
            }
        }
        if self.marker_index().is_none() {
            return Err(ConfigError::invalid(
                "palette.marker",
                format!("'{}' is not a palette color", self.marker),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::invalid(
                "palette.tolerance",
                "must be a positive number",
            ));
        }
        Ok(())
    }

    /// Position of the marker color in palette order.
    pub fn marker_index(&self) -> Option<usize> {
        self.colors.iter().position(|c| c.name == self.marker)
    }
}

// ---------------------------------------------------------------------------
// Scanner thresholds
// ---------------------------------------------------------------------------

/// Geometric thresholds for title-band detection, all in pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanThresholds {
    /// Blank rows above a band must be strictly more than this.
    pub min_top_gap: u32,
    pub min_band_height: u32,
    pub max_band_height: u32,
    /// Blank rows below a band must be strictly more than this.
    pub min_bottom_gap: u32,
    /// At least one row must span strictly more than this (right - left).
    pub min_width: u32,
    /// A row with a contiguous marker run this long is a horizontal rule.
    pub max_contiguous_run: u32,
    /// Bands reaching within this many columns of either edge are rejected.
    pub edge_margin: u32,
    /// Bands entirely at or left of this column are rejected.
    /// Defaults to `width / 2 - 1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_left_limit: Option<u32>,
    /// Bands entirely at or right of this column are rejected.
    /// Defaults to `width / 2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_right_limit: Option<u32>,
}

impl Default for ScanThresholds {
    fn default() -> Self {
        Self {
            min_top_gap: 10,
            min_band_height: 38,
            max_band_height: 58,
            min_bottom_gap: 39,
            min_width: 44,
            max_contiguous_run: 66,
            edge_margin: 150,
            center_left_limit: None,
            center_right_limit: None,
        }
    }
}

impl ScanThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_band_height == 0 {
            return Err(ConfigError::invalid("scan.max_band_height", "must be positive"));
        }
        if self.min_band_height > self.max_band_height {
            return Err(ConfigError::invalid(
                "scan.min_band_height",
                format!(
                    "{} is greater than max_band_height {}",
                    self.min_band_height, self.max_band_height
                ),
            ));
        }
        if let (Some(left), Some(right)) = (self.center_left_limit, self.center_right_limit) {
            if left > right {
                return Err(ConfigError::invalid(
                    "scan.center_left_limit",
                    format!("{left} is greater than center_right_limit {right}"),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the centerline straddle window for a raster of `width` columns.
    pub fn center_limits(&self, width: u32) -> (u32, u32) {
        let half = width / 2;
        (
            self.center_left_limit.unwrap_or(half.saturating_sub(1)),
            self.center_right_limit.unwrap_or(half),
        )
    }
}

// ---------------------------------------------------------------------------
// Title preprocessing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitlePrepConfig {
    /// Gray values below this count as title content.
    pub content_threshold: u8,
    /// Border ignored when looking for content (scan noise at crop edges).
    pub edge_margin: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    /// When set, the prepared title is binarized at this gray level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binarize_threshold: Option<u8>,
}

impl Default for TitlePrepConfig {
    fn default() -> Self {
        Self {
            content_threshold: 240,
            edge_margin: 15,
            padding_x: 20,
            padding_y: 6,
            binarize_threshold: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Page cropping
// ---------------------------------------------------------------------------

/// A `(left, top, right, bottom)` rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropBox {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Scanned books alternate margins, so odd and even pages crop differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub odd: CropBox,
    pub even: CropBox,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            odd: CropBox::new(376, 255, 2197, 3120),
            even: CropBox::new(274, 255, 2095, 3120),
        }
    }
}

impl CropConfig {
    pub fn for_page(&self, index: u32) -> CropBox {
        if index % 2 == 1 {
            self.odd
        } else {
            self.even
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Decoded pages kept by the canvas page cache.
    pub pages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { pages: 4 }
    }
}

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerKind {
    #[default]
    None,
    Command,
    Responses,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub kind: RecognizerKind,
    /// Command line for the `command` recognizer; reads PNG on stdin.
    pub command: String,
    pub endpoint: String,
    pub model: String,
    pub prompt: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
    /// Recognition calls allowed in flight at once.
    pub concurrency: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            kind: RecognizerKind::None,
            command: "tesseract stdin stdout".to_string(),
            endpoint: "https://api.openai.com/v1/responses".to_string(),
            model: "gpt-5-mini".to_string(),
            prompt: "Extract the entry title shown in this image. Output only the text."
                .to_string(),
            api_key_env: "CARDSCAN_API_KEY".to_string(),
            max_output_tokens: 4096,
            timeout_secs: 30,
            concurrency: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.scan.max_band_height, 58);
        assert_eq!(config.palette.marker_index(), Some(1));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [scan]
            min_top_gap = 5
            center_left_limit = 900
            center_right_limit = 901
            "#,
        )
        .unwrap();
        assert_eq!(config.scan.min_top_gap, 5);
        assert_eq!(config.scan.min_bottom_gap, 39);
        assert_eq!(config.scan.center_limits(1821), (900, 901));
    }

    #[test]
    fn test_palette_from_toml() {
        let config = Config::from_toml_str(
            r##"
            [palette]
            marker = "red"
            tolerance = 60.0
            unmatched = "background"

            [[palette.colors]]
            name = "red"
            color = "#FF0000"
            "##,
        )
        .unwrap();
        assert_eq!(config.palette.colors.len(), 1);
        assert_eq!(config.palette.colors[0].color, Color::new(255, 0, 0));
        assert_eq!(config.palette.unmatched, Unmatched::Background);
        assert_eq!(config.palette.background, Color::WHITE);
    }

    #[test]
    fn test_unknown_marker_rejected() {
        let result = Config::from_toml_str(
            r#"
            [palette]
            marker = "green"
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "palette.marker",
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_color_names_rejected() {
        let mut palette = PaletteConfig::default();
        palette
            .colors
            .push(NamedColor::new("ink", Color::new(10, 10, 10)));
        assert!(palette.validate().is_err());
    }

    #[test]
    fn test_band_bounds_must_be_ordered() {
        let scan = ScanThresholds {
            min_band_height: 60,
            max_band_height: 50,
            ..Default::default()
        };
        assert!(scan.validate().is_err());
    }

    #[test]
    fn test_center_limits_derived_from_width() {
        let scan = ScanThresholds::default();
        assert_eq!(scan.center_limits(1821), (909, 910));
        assert_eq!(scan.center_limits(0), (0, 0));
    }

    #[test]
    fn test_zero_cache_rejected() {
        let mut config = Config::default();
        config.cache.pages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_through_string() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[scan]"));
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_crop_box_by_parity() {
        let crop = CropConfig::default();
        assert_eq!(crop.for_page(31).left, 376);
        assert_eq!(crop.for_page(30).left, 274);
        assert_eq!(crop.for_page(30).width(), 1821);
        assert_eq!(crop.for_page(31).width(), 1821);
    }
}
