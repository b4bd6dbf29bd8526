//! Row profiling: classify pages one at a time and keep only per-row stats.

use image::RgbImage;

use cardscan_core::config::ScanThresholds;
use cardscan_core::rows::{reduce_rows, RowProfile};
use cardscan_core::scanner::{scan, ScanReport};

use crate::canvas::{PageSource, PagedCanvas};
use crate::classify::Classifier;
use crate::RasterError;

/// Row profile of a single raster.
pub fn profile_image(classifier: &Classifier, img: &RgbImage) -> Result<RowProfile, RasterError> {
    let labels = classifier.classify(img);
    Ok(reduce_rows(
        labels.as_slice(),
        labels.width(),
        classifier.marker_label(),
    )?)
}

/// Row profile of the whole canvas, built page by page.
///
/// `on_page` is called after each page with the number of pages done.
pub fn profile_canvas<S: PageSource>(
    canvas: &PagedCanvas<S>,
    classifier: &Classifier,
    mut on_page: impl FnMut(u32),
) -> Result<RowProfile, RasterError> {
    let descriptor = canvas.descriptor();
    let mut profile = RowProfile::with_capacity(
        descriptor.page_width,
        descriptor.total_height as usize,
    );

    for offset in 0..descriptor.page_count() {
        let page = canvas.page(offset)?;
        profile.extend(profile_image(classifier, &page)?)?;
        on_page(offset + 1);
    }

    Ok(profile)
}

/// Profile the canvas and run the title-band scanner over it.
pub fn detect_titles<S: PageSource>(
    canvas: &PagedCanvas<S>,
    classifier: &Classifier,
    thresholds: &ScanThresholds,
    on_page: impl FnMut(u32),
) -> Result<ScanReport, RasterError> {
    let profile = profile_canvas(canvas, classifier, on_page)?;
    let report = scan(&profile, thresholds);
    log::debug!(
        "scanned {} rows: {} candidates, {} rejections",
        report.rows_scanned,
        report.candidates.len(),
        report.rejections.total()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    use cardscan_core::config::PaletteConfig;
    use cardscan_core::partition::partition;
    use cardscan_core::rows::RowStatus;
    use cardscan_core::scanner::Candidate;

    use crate::canvas::MemoryPageSource;

    const WIDTH: u32 = 400;
    const BLUE: Rgb<u8> = Rgb([0, 172, 239]);
    const INK: Rgb<u8> = Rgb([0, 0, 0]);

    fn thresholds() -> ScanThresholds {
        ScanThresholds {
            min_top_gap: 10,
            min_bottom_gap: 10,
            edge_margin: 20,
            ..Default::default()
        }
    }

    /// Three 400x100 pages: ink on rows 0..25, a title band on global rows
    /// 40..80 (x 100..300, broken every 30 px), ink again from row 95.
    fn document() -> Vec<RgbImage> {
        let canvas = RgbImage::from_fn(WIDTH, 300, |x, y| {
            if y < 25 || y >= 95 {
                if x % 7 == 0 {
                    INK
                } else {
                    Rgb([255, 255, 255])
                }
            } else if (40..80).contains(&y) && (100..300).contains(&x) && x % 30 != 0 {
                BLUE
            } else {
                Rgb([255, 255, 255])
            }
        });
        (0..3)
            .map(|p| image::imageops::crop_imm(&canvas, 0, p * 100, WIDTH, 100).to_image())
            .collect()
    }

    #[test]
    fn profile_canvas_covers_every_row() {
        let canvas = PagedCanvas::build(MemoryPageSource::new(1, document()), 1, 3).unwrap();
        let classifier = Classifier::new(&PaletteConfig::default()).unwrap();
        let mut seen = Vec::new();
        let profile = profile_canvas(&canvas, &classifier, |n| seen.push(n)).unwrap();

        assert_eq!(profile.len(), 300);
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(profile.count(RowStatus::Marker), 40);
        assert_eq!(profile.statuses[39], RowStatus::Blank);
        assert_eq!(profile.statuses[40], RowStatus::Marker);
        assert_eq!(profile.statuses[95], RowStatus::Mixed);
    }

    #[test]
    fn end_to_end_single_title() {
        let canvas = PagedCanvas::build(MemoryPageSource::new(1, document()), 1, 3).unwrap();
        let classifier = Classifier::new(&PaletteConfig::default()).unwrap();

        let report = detect_titles(&canvas, &classifier, &thresholds(), |_| {}).unwrap();
        assert_eq!(
            report.candidates,
            vec![Candidate {
                start_y: 25,
                end_y: 95,
                band_start: 40,
                band_end: 80,
            }]
        );
        assert_eq!(report.rows_scanned, 300);

        let segments = partition(&report.candidates, canvas.total_height()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start_y, segments[0].end_y), (25, 300));

        let card = canvas.materialize(segments[0].start_y, segments[0].end_y).unwrap();
        assert_eq!(card.dimensions(), (WIDTH, 275));
        assert_eq!(*card.get_pixel(101, 15), BLUE);
    }

    #[test]
    fn full_width_rule_is_not_a_title() {
        let mut pages = document();
        for x in 0..WIDTH {
            for y in 40..80 {
                pages[0].put_pixel(x, y, BLUE);
            }
        }
        let canvas = PagedCanvas::build(MemoryPageSource::new(1, pages), 1, 3).unwrap();
        let classifier = Classifier::new(&PaletteConfig::default()).unwrap();

        let report = detect_titles(&canvas, &classifier, &thresholds(), |_| {}).unwrap();
        assert!(report.candidates.is_empty());
        assert_eq!(report.rejections.total(), 1);
    }
}
