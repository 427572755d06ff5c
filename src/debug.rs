//! Intermediate artifacts for inspecting a run: the mask, the selected contour, the detected
//! corners and the rectified result.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use imageproc::point::Point;
use tracing::debug;

use crate::errors::{PerspectraError, Result};
use crate::traits::DebugSink;
use crate::types::{Mask, Quadrilateral};

pub const LABEL_MASK: &str = "mask";
pub const LABEL_CONTOURS: &str = "contours";
pub const LABEL_CORNERS: &str = "corners-overlay";
pub const LABEL_WARPED: &str = "warped";

/// TL, TR, BR, BL.
pub const CORNER_COLORS: [Rgb<u8>; 4] = [
    Rgb([0, 255, 0]),
    Rgb([255, 0, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
];
const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const QUAD_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);

/// Writes every artifact as `<seq>-<label>.png` into one directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DebugSink for DirectorySink {
    fn record(&self, label: &str, image: &DynamicImage) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PerspectraError::encode(format!("creating {}", self.dir.display()), e))?;

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("{seq:06}-{label}.png"));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| PerspectraError::encode(format!("writing {}", path.display()), e))?;
        debug!(path = %path.display(), "Debug artifact written");
        Ok(())
    }
}

/// The mask in grey with the selected contour and its quadrilateral traced on top.
pub fn contour_overlay(mask: &Mask, contour: &[Point<i32>], quad: &Quadrilateral) -> RgbImage {
    let mut canvas = DynamicImage::ImageLuma8(mask.as_image().clone()).to_rgb8();

    let points: Vec<(f32, f32)> = contour.iter().map(|p| (p.x as f32, p.y as f32)).collect();
    draw_closed_path(&mut canvas, &points, CONTOUR_COLOR);
    draw_closed_path(&mut canvas, &quad.to_tuples(), QUAD_COLOR);
    canvas
}

/// The source image with the quadrilateral outlined and one coloured disc per corner.
pub fn corners_overlay(image: &RgbImage, quad: &Quadrilateral) -> RgbImage {
    let mut canvas = image.clone();
    draw_closed_path(&mut canvas, &quad.to_tuples(), OUTLINE_COLOR);

    let radius = (image.width().min(image.height()) / 100).max(3) as i32;
    for (corner, color) in quad.corners.iter().zip(CORNER_COLORS) {
        let center = (corner.x.round() as i32, corner.y.round() as i32);
        draw_filled_circle_mut(&mut canvas, center, radius, color);
    }
    canvas
}

fn draw_closed_path(canvas: &mut RgbImage, points: &[(f32, f32)], color: Rgb<u8>) {
    for (i, &start) in points.iter().enumerate() {
        let end = points[(i + 1) % points.len()];
        draw_line_segment_mut(canvas, start, end, color);
    }
}
