//! Page preparation: trim scan margins and produce clean and tricolor pages.

use image::{DynamicImage, RgbImage};

use cardscan_core::config::CropConfig;

use crate::classify::{clean_background, Classifier};
use crate::RasterError;

/// Crop a scanned page by its parity. The page is normalized to RGB first.
pub fn crop_page(
    index: u32,
    page: &DynamicImage,
    crops: &CropConfig,
) -> Result<RgbImage, RasterError> {
    let crop = crops.for_page(index);
    let (width, height) = (page.width(), page.height());
    if crop.width() == 0 || crop.height() == 0 || crop.right > width || crop.bottom > height {
        return Err(RasterError::CropOutOfBounds {
            index,
            crop,
            width,
            height,
        });
    }
    Ok(page
        .crop_imm(crop.left, crop.top, crop.width(), crop.height())
        .to_rgb8())
}

/// A cropped page ready to join a canvas.
pub struct PreparedPage {
    /// Near-white flattened to white; feeds cards and recognition.
    pub clean: RgbImage,
    /// Exact palette rendering of the cropped page.
    pub tricolor: Option<RgbImage>,
}

pub fn prepare_page(
    index: u32,
    page: &DynamicImage,
    crops: &CropConfig,
    classifier: &Classifier,
    clean_threshold: u8,
    with_tricolor: bool,
) -> Result<PreparedPage, RasterError> {
    let cropped = crop_page(index, page, crops)?;
    let tricolor = with_tricolor.then(|| classifier.render(&classifier.classify(&cropped)));
    let mut clean = cropped;
    clean_background(&mut clean, clean_threshold);
    Ok(PreparedPage { clean, tricolor })
}
