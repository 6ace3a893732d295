use image::{DynamicImage, GrayImage};
use imageproc::contrast::otsu_level;

use crate::error::{Error, Result};
use crate::models::{BinarizedRaster, NormalizedPhoto};

/// Fixed cutoff tuned for dark print on a white shipping label
pub const DEFAULT_FIXED_CUTOFF: u8 = 150;

/// Global thresholding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binarizer {
    pub fixed_cutoff: u8,
    /// Pick the level automatically (Otsu) instead of using `fixed_cutoff`
    pub otsu: bool,
}

impl Default for Binarizer {
    fn default() -> Self {
        Self {
            fixed_cutoff: DEFAULT_FIXED_CUTOFF,
            otsu: true,
        }
    }
}

impl Binarizer {
    /// Threshold level for this grayscale image
    pub fn level(&self, gray: &GrayImage) -> u8 {
        if !self.otsu {
            return self.fixed_cutoff;
        }
        // A single-valued histogram has no split; level 0 keeps any
        // non-black flat image white
        if is_flat(gray) {
            return 0;
        }
        otsu_level(gray)
    }

    pub fn binarize(&self, gray: &GrayImage) -> (BinarizedRaster, u8) {
        let level = self.level(gray);
        (BinarizedRaster::from_gray(gray, level), level)
    }
}

fn is_flat(gray: &GrayImage) -> bool {
    let mut pixels = gray.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}

/// Decode an encoded photo into an RGB raster
pub fn decode_photo(photo: &[u8]) -> Result<DynamicImage> {
    if photo.is_empty() {
        return Err(Error::Decode("empty upload".to_string()));
    }
    image::load_from_memory(photo).map_err(|e| Error::Decode(e.to_string()))
}

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Decode, grayscale and binarize a photo
pub fn normalize(photo: &[u8], binarizer: &Binarizer) -> Result<NormalizedPhoto> {
    let decoded = decode_photo(photo)?;
    let gray = to_grayscale(&decoded);
    let (binarized, level) = binarizer.binarize(&gray);

    Ok(NormalizedPhoto {
        raster: decoded.to_rgb8(),
        gray,
        binarized,
        level,
    })
}
