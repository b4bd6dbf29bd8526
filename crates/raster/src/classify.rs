//! Palette classification.
//!
//! Every pixel is labelled with its nearest palette color (within a tolerance)
//! so downstream code can compare small integer labels instead of RGB
//! triples. The palette is tiny (two or three colors in practice), so the
//! nearest-neighbour search is a fixed-size loop per pixel that the compiler
//! unrolls; rows are spread across threads with rayon.

use image::{DynamicImage, Rgb, RgbImage};
use rayon::prelude::*;

use cardscan_core::config::{PaletteConfig, Unmatched};
use cardscan_core::rows::label;

use crate::RasterError;

/// Row-major pixel labels for one raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<u8>,
}

impl LabelMap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.labels
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    pub fn count(&self, code: u8) -> usize {
        self.labels.par_iter().filter(|&&l| l == code).count()
    }

    /// Boolean mask of pixels carrying `code`.
    pub fn mask(&self, code: u8) -> Vec<bool> {
        self.labels.par_iter().map(|&l| l == code).collect()
    }
}

/// A validated palette ready to label pixels.
#[derive(Debug, Clone)]
pub struct Classifier {
    colors: Vec<[u8; 3]>,
    background: [u8; 3],
    other: [u8; 3],
    tolerance_sq: f32,
    clean_threshold: u8,
    unmatched: u8,
    marker: u8,
}

impl Classifier {
    pub fn new(palette: &PaletteConfig) -> Result<Self, RasterError> {
        palette
            .validate()
            .map_err(|e| RasterError::InvalidPalette(e.to_string()))?;
        let marker = palette
            .marker_index()
            .ok_or_else(|| RasterError::InvalidPalette(format!("no color '{}'", palette.marker)))?;

        Ok(Self {
            colors: palette.colors.iter().map(|c| c.color.0).collect(),
            background: palette.background.0,
            other: palette.other_color.0,
            tolerance_sq: palette.tolerance * palette.tolerance,
            clean_threshold: palette.clean_threshold,
            unmatched: match palette.unmatched {
                Unmatched::Other => label::OTHER,
                Unmatched::Background => label::BACKGROUND,
            },
            marker: marker as u8,
        })
    }

    /// Label code of the marker color.
    pub fn marker_label(&self) -> u8 {
        self.marker
    }

    /// Label a single pixel.
    ///
    /// Near-white pixels are background outright. Otherwise the nearest color
    /// within tolerance wins; palette colors win ties against each other in
    /// palette order and against the background.
    pub fn classify_pixel(&self, px: [u8; 3]) -> u8 {
        if px.iter().all(|&c| c > self.clean_threshold) {
            return label::BACKGROUND;
        }

        let mut best = self.unmatched;
        let mut best_d = u32::MAX;
        for (i, color) in self.colors.iter().enumerate() {
            let d = distance_sq(*color, px);
            if d < best_d {
                best_d = d;
                best = i as u8;
            }
        }
        let bg_d = distance_sq(self.background, px);
        if bg_d < best_d {
            best_d = bg_d;
            best = label::BACKGROUND;
        }

        if (best_d as f32) < self.tolerance_sq {
            best
        } else {
            self.unmatched
        }
    }

    pub fn classify(&self, img: &RgbImage) -> LabelMap {
        let (width, height) = img.dimensions();
        let mut labels = vec![label::BACKGROUND; width as usize * height as usize];

        if width > 0 {
            let row_len = width as usize * 3;
            labels
                .par_chunks_mut(width as usize)
                .zip(img.as_raw().par_chunks(row_len))
                .for_each(|(out, row)| {
                    for (slot, px) in out.iter_mut().zip(row.chunks_exact(3)) {
                        *slot = self.classify_pixel([px[0], px[1], px[2]]);
                    }
                });
        }

        LabelMap {
            width,
            height,
            labels,
        }
    }

    /// Classify an arbitrary decoded image. Only 8-bit RGB is accepted.
    pub fn classify_dynamic(&self, img: &DynamicImage) -> Result<LabelMap, RasterError> {
        match img {
            DynamicImage::ImageRgb8(rgb) => Ok(self.classify(rgb)),
            other => Err(RasterError::UnsupportedFormat(format!("{:?}", other.color()))),
        }
    }

    /// Paint a label map with exact palette colors.
    pub fn render(&self, labels: &LabelMap) -> RgbImage {
        RgbImage::from_fn(labels.width, labels.height, |x, y| {
            let code = labels.get(x, y);
            let rgb = match code {
                label::BACKGROUND => self.background,
                label::OTHER => self.other,
                i => self.colors.get(i as usize).copied().unwrap_or(self.other),
            };
            Rgb(rgb)
        })
    }
}

fn distance_sq(a: [u8; 3], b: [u8; 3]) -> u32 {
    let dr = a[0] as i32 - b[0] as i32;
    let dg = a[1] as i32 - b[1] as i32;
    let db = a[2] as i32 - b[2] as i32;
    (dr * dr + dg * dg + db * db) as u32
}

/// Flatten every channel above `threshold` to 255, keeping anti-aliasing and
/// color depth elsewhere. Produces the "clean" raster used for recognition.
pub fn clean_background(img: &mut RgbImage, threshold: u8) {
    let buf: &mut [u8] = img;
    buf.par_iter_mut().for_each(|c| {
        if *c > threshold {
            *c = 255;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardscan_core::color::Color;
    use cardscan_core::config::NamedColor;

    const BLUE: [u8; 3] = [0, 172, 239];
    const INK: u8 = 0;
    const MARK: u8 = 1;

    fn classifier() -> Classifier {
        Classifier::new(&PaletteConfig::default()).unwrap()
    }

    #[test]
    fn exact_colors() {
        let c = classifier();
        assert_eq!(c.classify_pixel([0, 0, 0]), INK);
        assert_eq!(c.classify_pixel(BLUE), MARK);
        assert_eq!(c.classify_pixel([255, 255, 255]), label::BACKGROUND);
        assert_eq!(c.marker_label(), MARK);
    }

    #[test]
    fn near_colors_within_tolerance() {
        let c = classifier();
        assert_eq!(c.classify_pixel([30, 30, 30]), INK);
        assert_eq!(c.classify_pixel([20, 160, 220]), MARK);
        assert_eq!(c.classify_pixel([230, 230, 230]), label::BACKGROUND);
    }

    #[test]
    fn far_from_everything_is_other() {
        let c = classifier();
        assert_eq!(c.classify_pixel([128, 128, 128]), label::OTHER);
        assert_eq!(c.classify_pixel([255, 0, 0]), label::OTHER);
    }

    #[test]
    fn unmatched_can_fold_into_background() {
        let palette = PaletteConfig {
            unmatched: Unmatched::Background,
            ..Default::default()
        };
        let c = Classifier::new(&palette).unwrap();
        assert_eq!(c.classify_pixel([128, 128, 128]), label::BACKGROUND);
    }

    #[test]
    fn tolerance_is_exclusive() {
        let palette = PaletteConfig {
            tolerance: 5.0,
            colors: vec![NamedColor::new("marker", Color::new(100, 100, 100))],
            ..Default::default()
        };
        let c = Classifier::new(&palette).unwrap();
        // distance 4 matches, distance exactly 5 does not
        assert_eq!(c.classify_pixel([104, 100, 100]), 0);
        assert_eq!(c.classify_pixel([103, 104, 100]), label::OTHER);
    }

    #[test]
    fn tie_goes_to_first_palette_color() {
        let palette = PaletteConfig {
            tolerance: 50.0,
            marker: "b".to_string(),
            colors: vec![
                NamedColor::new("a", Color::new(100, 0, 0)),
                NamedColor::new("b", Color::new(120, 0, 0)),
            ],
            ..Default::default()
        };
        let c = Classifier::new(&palette).unwrap();
        assert_eq!(c.classify_pixel([110, 0, 0]), 0);
        assert_eq!(c.classify_pixel([111, 0, 0]), 1);
    }

    #[test]
    fn tie_with_background_goes_to_palette() {
        let palette = PaletteConfig {
            tolerance: 100.0,
            clean_threshold: 255,
            colors: vec![NamedColor::new("marker", Color::new(155, 255, 255))],
            ..Default::default()
        };
        let c = Classifier::new(&palette).unwrap();
        // 50 away from both the marker and white
        assert_eq!(c.classify_pixel([205, 255, 255]), 0);
        assert_eq!(c.classify_pixel([206, 255, 255]), label::BACKGROUND);
    }

    #[test]
    fn near_white_forced_to_background() {
        let palette = PaletteConfig {
            tolerance: 30.0,
            colors: vec![NamedColor::new("marker", Color::new(245, 245, 245))],
            ..Default::default()
        };
        let c = Classifier::new(&palette).unwrap();
        assert_eq!(c.classify_pixel([245, 245, 245]), label::BACKGROUND);
        assert_eq!(c.classify_pixel([240, 245, 245]), 0);
    }

    #[test]
    fn classify_matches_per_pixel() {
        let c = classifier();
        let img = RgbImage::from_fn(37, 23, |x, y| {
            Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 5) as u8])
        });
        let labels = c.classify(&img);
        assert_eq!((labels.width(), labels.height()), (37, 23));
        for (x, y, px) in img.enumerate_pixels() {
            assert_eq!(labels.get(x, y), c.classify_pixel(px.0), "at {x},{y}");
        }
    }

    #[test]
    fn classify_dynamic_rejects_non_rgb() {
        let c = classifier();
        let gray = DynamicImage::new_luma8(4, 4);
        assert!(matches!(
            c.classify_dynamic(&gray),
            Err(RasterError::UnsupportedFormat(_))
        ));
        let rgba = DynamicImage::new_rgba8(4, 4);
        assert!(c.classify_dynamic(&rgba).is_err());
        let rgb = DynamicImage::new_rgb8(4, 4);
        assert_eq!(c.classify_dynamic(&rgb).unwrap().count(INK), 16);
    }

    #[test]
    fn render_uses_exact_palette_colors() {
        let c = classifier();
        let mut img = RgbImage::from_pixel(3, 1, Rgb([255, 255, 255]));
        img.put_pixel(0, 0, Rgb([10, 165, 230]));
        img.put_pixel(1, 0, Rgb([120, 130, 125]));
        let rendered = c.render(&c.classify(&img));
        assert_eq!(rendered.get_pixel(0, 0).0, BLUE);
        assert_eq!(rendered.get_pixel(1, 0).0, [128, 128, 128]);
        assert_eq!(rendered.get_pixel(2, 0).0, [255, 255, 255]);
    }

    #[test]
    fn mask_and_count() {
        let c = classifier();
        let mut img = RgbImage::from_pixel(4, 2, Rgb([255, 255, 255]));
        img.put_pixel(1, 0, Rgb(BLUE));
        img.put_pixel(2, 1, Rgb(BLUE));
        let labels = c.classify(&img);
        assert_eq!(labels.count(MARK), 2);
        let mask = labels.mask(MARK);
        assert!(mask[1] && mask[6]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 2);
    }

    #[test]
    fn clean_background_per_channel() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([241, 200, 250]));
        img.put_pixel(1, 0, Rgb([240, 240, 240]));
        clean_background(&mut img, 240);
        assert_eq!(img.get_pixel(0, 0).0, [255, 200, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [240, 240, 240]);
    }

    #[test]
    fn invalid_palette_rejected() {
        let palette = PaletteConfig {
            marker: "missing".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Classifier::new(&palette),
            Err(RasterError::InvalidPalette(_))
        ));
    }
}
