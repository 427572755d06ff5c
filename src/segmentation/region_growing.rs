use image::{GrayImage, Luma, Rgb, RgbImage};
use tracing::trace;

use super::clean;
use crate::types::{Mask, FOREGROUND};

const BINS_PER_CHANNEL: usize = 16;
const BINS: usize = BINS_PER_CHANNEL * BINS_PER_CHANNEL * BINS_PER_CHANNEL;

/// Iterative colour-model cut seeded from an inset rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionGrowingParams {
    /// Inset of the seed rectangle as a fraction of the shorter image side.
    pub inset_ratio: f64,
    pub max_iterations: usize,
    pub cleanup_radius: u8,
}

impl Default for RegionGrowingParams {
    fn default() -> Self {
        Self {
            inset_ratio: 0.1,
            max_iterations: 5,
            cleanup_radius: 1,
        }
    }
}

struct ColorModel {
    counts: Vec<u32>,
    total: u32,
}

impl ColorModel {
    fn new() -> Self {
        Self {
            counts: vec![0; BINS],
            total: 0,
        }
    }

    fn add(&mut self, pixel: &Rgb<u8>) {
        self.counts[bin(pixel)] += 1;
        self.total += 1;
    }

    /// Laplace-smoothed likelihood of the colour's bin.
    fn likelihood(&self, pixel: &Rgb<u8>) -> f64 {
        (self.counts[bin(pixel)] as f64 + 1.0) / (self.total as f64 + BINS as f64)
    }
}

fn bin(Rgb([r, g, b]): &Rgb<u8>) -> usize {
    let shift = 8 - BINS_PER_CHANNEL.trailing_zeros();
    let (r, g, b) = (
        (*r >> shift) as usize,
        (*g >> shift) as usize,
        (*b >> shift) as usize,
    );
    (r * BINS_PER_CHANNEL + g) * BINS_PER_CHANNEL + b
}

#[derive(Debug, Clone, Copy)]
struct SeedRect {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl SeedRect {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

pub(super) fn segment(image: &RgbImage, params: &RegionGrowingParams) -> Mask {
    let (width, height) = image.dimensions();
    let inset = ((width.min(height) as f64 * params.inset_ratio).round() as u32).max(1);
    if width <= 2 * inset || height <= 2 * inset {
        return Mask::empty(width, height);
    }
    let rect = SeedRect {
        left: inset,
        top: inset,
        right: width - inset,
        bottom: height - inset,
    };

    let mut labels = GrayImage::from_fn(width, height, |x, y| {
        Luma([if rect.contains(x, y) { FOREGROUND } else { 0 }])
    });

    for iteration in 0..params.max_iterations {
        let (foreground, background) = fit_models(image, &labels);

        let relabelled = GrayImage::from_fn(width, height, |x, y| {
            let pixel = image.get_pixel(x, y);
            let is_foreground = rect.contains(x, y)
                && foreground.likelihood(pixel) > background.likelihood(pixel);
            Luma([if is_foreground { FOREGROUND } else { 0 }])
        });
        let mut relabelled = clean(&relabelled, params.cleanup_radius);
        for (x, y, pixel) in relabelled.enumerate_pixels_mut() {
            if !rect.contains(x, y) {
                pixel[0] = 0;
            }
        }

        let converged = relabelled == labels;
        labels = relabelled;
        trace!(iteration, converged, "Region growing iteration");
        if converged {
            break;
        }
    }

    Mask::from_luma(&labels, 0)
}

fn fit_models(image: &RgbImage, labels: &GrayImage) -> (ColorModel, ColorModel) {
    let mut foreground = ColorModel::new();
    let mut background = ColorModel::new();
    for (pixel, label) in image.pixels().zip(labels.pixels()) {
        if label[0] == FOREGROUND {
            foreground.add(pixel);
        } else {
            background.add(pixel);
        }
    }
    (foreground, background)
}
