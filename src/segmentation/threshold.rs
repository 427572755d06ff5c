use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use tracing::debug;

use super::{clean, fills_frame, polarity_aware_cut};
use crate::types::{Mask, FOREGROUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdParams {
    /// Radius of the close/open cleanup applied after binarisation.
    pub cleanup_radius: u8,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self { cleanup_radius: 1 }
    }
}

pub(super) fn segment(image: &RgbImage, params: &ThresholdParams) -> Mask {
    let gray = imageops::grayscale(image);
    Mask::from_luma(&binarize(&gray, params.cleanup_radius), 0)
}

/// Otsu cut with border-driven polarity, followed by morphological cleanup. A light page filling
/// the frame comes back as all foreground.
pub(super) fn binarize(gray: &GrayImage, cleanup_radius: u8) -> GrayImage {
    let level = otsu_level(gray);
    let cut = clean(&polarity_aware_cut(gray, level), cleanup_radius);
    if fills_frame(gray, &cut) {
        debug!(level, "Light page fills the frame");
        let (width, height) = gray.dimensions();
        return GrayImage::from_pixel(width, height, Luma([FOREGROUND]));
    }
    cut
}
