//! Foreground/background separation.
//!
//! Each strategy is a pure function of the input image and its own parameters. [`Segmenter`]
//! is the tagged variant the processor dispatches through; strategy selection depends only on
//! the [`Config`].

mod neural;
mod region_growing;
mod threshold;
mod watershed;

use std::sync::Arc;

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

use crate::config::{Config, SegmentationMethod};
use crate::errors::Result;
use crate::traits::ForegroundModel;
use crate::types::{Mask, FOREGROUND};

pub use neural::{postprocess, preprocess, NeuralSegmenter, MASK_THRESHOLD};
pub use region_growing::RegionGrowingParams;
pub use threshold::ThresholdParams;
pub use watershed::WatershedParams;

#[derive(Clone)]
pub enum Segmenter {
    Threshold(ThresholdParams),
    Watershed(WatershedParams),
    RegionGrowing(RegionGrowingParams),
    Neural(NeuralSegmenter),
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threshold(p) => f.debug_tuple("Threshold").field(p).finish(),
            Self::Watershed(p) => f.debug_tuple("Watershed").field(p).finish(),
            Self::RegionGrowing(p) => f.debug_tuple("RegionGrowing").field(p).finish(),
            Self::Neural(n) => f.debug_tuple("Neural").field(&n.model_path()).finish(),
        }
    }
}

impl Segmenter {
    pub fn from_config(config: &Config) -> Self {
        match config.segmentation_method {
            SegmentationMethod::Threshold => Self::Threshold(ThresholdParams::default()),
            SegmentationMethod::Watershed => Self::Watershed(WatershedParams::default()),
            SegmentationMethod::Grabcut => Self::RegionGrowing(RegionGrowingParams::default()),
            SegmentationMethod::Neural => Self::Neural(NeuralSegmenter::from_config(config)),
        }
    }

    /// Neural strategy backed by an already-loaded model instead of the process-wide handle.
    pub fn with_model(model: Arc<dyn ForegroundModel>) -> Self {
        Self::Neural(NeuralSegmenter::with_model(model))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Threshold(_) => "threshold",
            Self::Watershed(_) => "watershed",
            Self::RegionGrowing(_) => "grabcut",
            Self::Neural(_) => "neural",
        }
    }

    /// Produce a binary mask with the exact dimensions of `image`.
    pub fn segment(&self, image: &RgbImage) -> Result<Mask> {
        let mask = match self {
            Self::Threshold(params) => threshold::segment(image, params),
            Self::Watershed(params) => watershed::segment(image, params),
            Self::RegionGrowing(params) => region_growing::segment(image, params),
            Self::Neural(segmenter) => segmenter.segment(image)?,
        };
        debug_assert_eq!(mask.dimensions(), image.dimensions());
        debug!(
            method = self.name(),
            foreground = mask.foreground_count(),
            "Segmentation completed"
        );
        Ok(mask)
    }
}

/// Mean intensity of the one-pixel frame around the image.
pub(crate) fn border_mean(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let (mut sum, mut count) = (0u64, 0u64);
    for (x, y, Luma([v])) in gray.enumerate_pixels() {
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            sum += *v as u64;
            count += 1;
        }
    }
    sum as f64 / count as f64
}

/// Binarize at `level`, calling foreground whichever side of the cut the image border is not on.
pub(crate) fn polarity_aware_cut(gray: &GrayImage, level: u8) -> GrayImage {
    let light_background = border_mean(gray) > level as f64;
    imageproc::map::map_colors(gray, |Luma([v])| {
        let foreground = if light_background { v <= level } else { v > level };
        Luma([if foreground { FOREGROUND } else { 0 }])
    })
}

/// Mean border intensity at or above which the frame counts as light.
pub const LIGHT_BORDER_LEVEL: f64 = 128.0;

/// Fraction of the frame the largest foreground region must cover to count as a document.
pub const MIN_DOCUMENT_FRACTION: f64 = 0.05;

/// A light document that fills the whole frame: the border is light and what the polarity rule
/// left as foreground is no more than scattered marks (text, stains) on it.
pub(crate) fn fills_frame(gray: &GrayImage, cut: &GrayImage) -> bool {
    if border_mean(gray) < LIGHT_BORDER_LEVEL {
        return false;
    }
    let (width, height) = cut.dimensions();
    largest_region(cut) < (width as f64 * height as f64 * MIN_DOCUMENT_FRACTION) as usize
}

/// Pixel count of the largest 8-connected foreground region.
pub(crate) fn largest_region(binary: &GrayImage) -> usize {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
    let mut sizes: Vec<usize> = Vec::new();
    for Luma([label]) in labels.pixels() {
        let label = *label as usize;
        if label == 0 {
            continue;
        }
        if sizes.len() < label {
            sizes.resize(label, 0);
        }
        sizes[label - 1] += 1;
    }
    sizes.into_iter().max().unwrap_or(0)
}

/// Morphological close then open with a square structuring element of the given radius.
pub(crate) fn clean(binary: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return binary.clone();
    }
    open(&close(binary, Norm::LInf, radius), Norm::LInf, radius)
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{Rgb, RgbImage};

    /// Black canvas with a white square covering [lo, hi] on both axes.
    pub fn square(size: u32, lo: u32, hi: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..=hi).contains(&x) && (lo..=hi).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    /// White page filling the frame, with dark text lines two pixels thick.
    pub fn light_page_with_text(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let line = y >= 10 && y % 12 < 2 && (10..width - 10).contains(&x);
            if line {
                Rgb([30, 30, 30])
            } else {
                Rgb([245, 245, 240])
            }
        })
    }

    /// Light desk surface with a dark card.
    pub fn dark_card_on_light(size: u32, lo: u32, hi: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..=hi).contains(&x) && (lo..=hi).contains(&y) {
                Rgb([40, 60, 90])
            } else {
                Rgb([235, 230, 225])
            }
        })
    }
}
