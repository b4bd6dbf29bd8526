//! Title crops prepared for text recognition.

use image::{GrayImage, Luma, RgbImage};

use cardscan_core::config::TitlePrepConfig;

/// Grayscale, tighten to the content, pad, and stretch contrast.
///
/// Returns `None` when nothing darker than the content threshold is found.
pub fn prepare_title(img: &RgbImage, config: &TitlePrepConfig) -> Option<GrayImage> {
    let gray = image::imageops::grayscale(img);
    let (width, height) = gray.dimensions();
    let (left, top, right, bottom) = content_bounds(&gray, config)?;

    let x0 = left.saturating_sub(config.padding_x);
    let y0 = top.saturating_sub(config.padding_y);
    let x1 = right.saturating_add(config.padding_x).min(width);
    let y1 = bottom.saturating_add(config.padding_y).min(height);

    let mut title = image::imageops::crop_imm(&gray, x0, y0, x1 - x0, y1 - y0).to_image();
    autocontrast(&mut title);
    if let Some(threshold) = config.binarize_threshold {
        binarize(&mut title, threshold);
    }
    Some(title)
}

/// Bounding box `(left, top, right, bottom)`, right/bottom exclusive, of
/// pixels darker than the content threshold. A frame of `edge_margin` pixels
/// is ignored unless the image is too small to have one.
fn content_bounds(gray: &GrayImage, config: &TitlePrepConfig) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = gray.dimensions();
    let m = config.edge_margin;
    let (x_range, y_range) = if width > 2 * m && height > 2 * m {
        (m..width - m, m..height - m)
    } else {
        (0..width, 0..height)
    };

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for y in y_range {
        for x in x_range.clone() {
            if gray.get_pixel(x, y).0[0] < config.content_threshold {
                bounds = Some(match bounds {
                    None => (x, y, x + 1, y + 1),
                    Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(x + 1), b.max(y + 1)),
                });
            }
        }
    }
    bounds
}

/// Stretch the used gray range linearly onto `0..=255`.
fn autocontrast(img: &mut GrayImage) {
    let (lo, hi) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if hi <= lo {
        return;
    }
    let span = (hi - lo) as u32;
    for p in img.pixels_mut() {
        let v = (p.0[0] - lo) as u32;
        *p = Luma([(v * 255 / span) as u8]);
    }
}

fn binarize(img: &mut GrayImage, threshold: u8) {
    for p in img.pixels_mut() {
        p.0[0] = if p.0[0] < threshold { 0 } else { 255 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    fn fill(img: &mut RgbImage, x: std::ops::Range<u32>, y: std::ops::Range<u32>, rgb: [u8; 3]) {
        for yy in y {
            for xx in x.clone() {
                img.put_pixel(xx, yy, Rgb(rgb));
            }
        }
    }

    #[test]
    fn crops_to_padded_content() {
        let mut img = blank(200, 60);
        fill(&mut img, 50..100, 20..30, [40, 40, 40]);

        let title = prepare_title(&img, &TitlePrepConfig::default()).unwrap();
        // 50 wide + 2 * 20 padding, 10 high + 2 * 6 padding
        assert_eq!(title.dimensions(), (90, 22));
        assert_eq!(title.get_pixel(20, 6).0[0], 0);
        assert_eq!(title.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn padding_clamped_to_image() {
        let mut img = blank(200, 60);
        fill(&mut img, 16..30, 16..20, [0, 0, 0]);

        let title = prepare_title(&img, &TitlePrepConfig::default()).unwrap();
        assert_eq!(title.dimensions(), (50, 16));
    }

    #[test]
    fn content_in_margin_ignored() {
        let mut img = blank(200, 60);
        fill(&mut img, 0..200, 0..5, [0, 0, 0]);
        assert!(prepare_title(&img, &TitlePrepConfig::default()).is_none());
    }

    #[test]
    fn small_image_uses_whole_frame() {
        let mut img = blank(20, 20);
        img.put_pixel(1, 1, Rgb([0, 0, 0]));
        let title = prepare_title(&img, &TitlePrepConfig::default()).unwrap();
        assert_eq!(title.dimensions(), (20, 8));
    }

    #[test]
    fn blank_image_is_none() {
        assert!(prepare_title(&blank(100, 100), &TitlePrepConfig::default()).is_none());
    }

    #[test]
    fn autocontrast_stretches_range() {
        let mut img = GrayImage::from_fn(3, 1, |x, _| Luma([100 + x as u8 * 50]));
        autocontrast(&mut img);
        let values: Vec<u8> = img.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 127, 255]);
    }

    #[test]
    fn binarize_option() {
        let mut img = blank(100, 40);
        fill(&mut img, 30..60, 18..22, [0, 0, 0]);
        fill(&mut img, 60..70, 18..22, [200, 200, 200]);
        let config = TitlePrepConfig {
            binarize_threshold: Some(160),
            ..Default::default()
        };

        let title = prepare_title(&img, &config).unwrap();
        assert!(title.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
