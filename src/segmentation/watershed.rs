use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::gradients::sobel_gradients;
use imageproc::morphology::{dilate, open};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::trace;

use super::threshold::binarize;
use crate::types::{Mask, FOREGROUND};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatershedParams {
    /// Extra opening applied to the coarse threshold mask.
    pub opening_radius: u8,
    /// Dilation of the coarse mask; anything outside it is certain background.
    pub background_margin: u8,
    /// Pixels at least this fraction of the maximum distance from background are certain
    /// foreground.
    pub foreground_distance_ratio: f32,
}

impl Default for WatershedParams {
    fn default() -> Self {
        Self {
            opening_radius: 2,
            background_margin: 2,
            foreground_distance_ratio: 0.5,
        }
    }
}

const UNKNOWN: u32 = 0;
const BACKGROUND_LABEL: u32 = 1;

pub(super) fn segment(image: &RgbImage, params: &WatershedParams) -> Mask {
    let gray = imageops::grayscale(image);
    let (width, height) = gray.dimensions();

    let coarse = open(&binarize(&gray, 1), Norm::LInf, params.opening_radius);
    if coarse.pixels().all(|p| p[0] == FOREGROUND) {
        return Mask::from_fn(width, height, |_, _| true);
    }
    let markers = markers(&coarse, params);
    let foreground_markers = markers.iter().filter(|&&l| l > BACKGROUND_LABEL).count();
    if foreground_markers == 0 {
        return Mask::empty(width, height);
    }

    let gradient = sobel_gradients(&gray);
    let labels = flood(markers, width, height, |x, y| gradient.get_pixel(x, y)[0]);
    trace!(foreground_markers, "Watershed flooding completed");

    Mask::from_fn(width, height, |x, y| {
        labels[(y * width + x) as usize] > BACKGROUND_LABEL
    })
}

/// Label every pixel as unknown, certain background, or one of the certain foreground
/// components (2 and up).
fn markers(coarse: &GrayImage, params: &WatershedParams) -> Vec<u32> {
    let (width, height) = coarse.dimensions();

    let reach = dilate(coarse, Norm::LInf, params.background_margin);

    let background = imageproc::map::map_colors(coarse, |Luma([v])| {
        Luma([if v == FOREGROUND { 0 } else { FOREGROUND }])
    });
    // Squared Euclidean distance to the nearest background pixel.
    let depth = euclidean_squared_distance_transform(&background);
    let max_depth = coarse
        .pixels()
        .zip(depth.pixels())
        .filter(|(c, _)| c[0] == FOREGROUND)
        .map(|(_, d)| d[0])
        .fold(0.0, f64::max);

    let cutoff = max_depth * (params.foreground_distance_ratio as f64).powi(2);
    let sure_foreground = GrayImage::from_fn(width, height, |x, y| {
        let inside = coarse.get_pixel(x, y)[0] == FOREGROUND;
        let deep = depth.get_pixel(x, y)[0] >= cutoff;
        Luma([if inside && max_depth > 0.0 && deep { FOREGROUND } else { 0 }])
    });
    let components = connected_components(&sure_foreground, Connectivity::Eight, Luma([0u8]));

    let mut markers = vec![UNKNOWN; (width * height) as usize];
    for (x, y, Luma([label])) in components.enumerate_pixels() {
        let index = (y * width + x) as usize;
        if *label > 0 {
            markers[index] = label + BACKGROUND_LABEL;
        } else if reach.get_pixel(x, y)[0] == 0 {
            markers[index] = BACKGROUND_LABEL;
        }
    }
    markers
}

/// Priority, insertion sequence, x, y, label.
type FloodEntry = (u16, u64, u32, u32, u32);

/// Meyer flooding: grow every marker into the unknown pixels in order of increasing
/// `priority`, ties resolved by insertion order.
fn flood(
    mut labels: Vec<u32>,
    width: u32,
    height: u32,
    priority: impl Fn(u32, u32) -> u16,
) -> Vec<u32> {
    let mut queue: BinaryHeap<Reverse<FloodEntry>> = BinaryHeap::new();
    let mut sequence = 0u64;

    let mut push_neighbours = |queue: &mut BinaryHeap<Reverse<FloodEntry>>,
                               labels: &[u32],
                               x: u32,
                               y: u32,
                               label: u32| {
        for (nx, ny) in neighbours(x, y, width, height) {
            if labels[(ny * width + nx) as usize] == UNKNOWN {
                queue.push(Reverse((priority(nx, ny), sequence, nx, ny, label)));
                sequence += 1;
            }
        }
    };

    for y in 0..height {
        for x in 0..width {
            let label = labels[(y * width + x) as usize];
            if label != UNKNOWN {
                push_neighbours(&mut queue, &labels, x, y, label);
            }
        }
    }

    while let Some(Reverse((_, _, x, y, label))) = queue.pop() {
        let index = (y * width + x) as usize;
        if labels[index] != UNKNOWN {
            continue;
        }
        labels[index] = label;
        push_neighbours(&mut queue, &labels, x, y, label);
    }
    labels
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let candidates = [
        (x.checked_sub(1), Some(y)),
        (x.checked_add(1).filter(|&v| v < width), Some(y)),
        (Some(x), y.checked_sub(1)),
        (Some(x), y.checked_add(1).filter(|&v| v < height)),
    ];
    candidates
        .into_iter()
        .filter_map(|(x, y)| Some((x?, y?)))
}
