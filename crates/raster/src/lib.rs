use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use cardscan_core::canvas::CanvasError;
use cardscan_core::config::CropBox;
use cardscan_core::rows::RowProfileError;

pub mod canvas;
pub mod classify;
pub mod crop;
pub mod profile;
pub mod title;

pub use canvas::{CacheStats, DirectoryPageSource, MemoryPageSource, PageSource, PagedCanvas};
pub use classify::{Classifier, LabelMap};

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Missing page {0}")]
    MissingPage(u32),
    #[error(
        "Page {index} is {found_width}x{found_height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        index: u32,
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid palette: {0}")]
    InvalidPalette(String),
    #[error("Crop box {crop:?} does not fit page {index} ({width}x{height})")]
    CropOutOfBounds {
        index: u32,
        crop: CropBox,
        width: u32,
        height: u32,
    },
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error(transparent)]
    Profile(#[from] RowProfileError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Encode any image as PNG bytes.
pub fn encode_png(img: impl Into<DynamicImage>) -> Result<Vec<u8>, RasterError> {
    let img: DynamicImage = img.into();
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Decode a page from disk, normalized to 8-bit RGB.
pub fn open_rgb(path: &Path) -> Result<image::RgbImage, RasterError> {
    Ok(image::open(path)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_png_has_signature() {
        let img = image::RgbImage::new(3, 2);
        let bytes = encode_png(img).unwrap();
        assert_eq!(&bytes[..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn open_rgb_normalizes_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(4, 3, image::Luma([7])).save(&path).unwrap();

        let rgb = open_rgb(&path).unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(0, 0).0, [7, 7, 7]);
    }

    #[test]
    fn open_rgb_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_rgb(&dir.path().join("nope.png")).is_err());
    }
}
