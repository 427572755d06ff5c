use std::time::Duration;

use image::{DynamicImage, GrayImage, Luma};
use imageproc::point::Point;
use serde::Serialize;

use crate::errors::{ErrorKind, PerspectraError};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Binary foreground mask. Every pixel is either [`FOREGROUND`] or [`BACKGROUND`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Binarize a grayscale image: pixels strictly above `threshold` become foreground.
    pub fn from_luma(image: &GrayImage, threshold: u8) -> Self {
        Self(imageproc::map::map_colors(image, |Luma([v])| {
            Luma([if v > threshold { FOREGROUND } else { BACKGROUND }])
        }))
    }

    pub fn from_fn(width: u32, height: u32, mut is_foreground: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if is_foreground(x, y) {
                FOREGROUND
            } else {
                BACKGROUND
            }])
        }))
    }

    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] == FOREGROUND
    }

    pub fn foreground_count(&self) -> usize {
        self.0.pixels().filter(|p| p[0] == FOREGROUND).count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Four corners ordered top-left, top-right, bottom-right, bottom-left (clockwise in image
/// coordinates, y pointing down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    pub corners: [Point<f32>; 4],
}

impl Quadrilateral {
    pub const LABELS: [&'static str; 4] = ["TL", "TR", "BR", "BL"];

    pub fn top_left(&self) -> Point<f32> {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point<f32> {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point<f32> {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point<f32> {
        self.corners[3]
    }

    pub fn area(&self) -> f64 {
        imageproc::geometry::contour_area(&self.corners)
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            corners: self.corners.map(|p| Point::new(p.x * sx, p.y * sy)),
        }
    }

    pub fn to_tuples(&self) -> [(f32, f32); 4] {
        self.corners.map(|p| (p.x, p.y))
    }
}

/// Last pipeline stage an invocation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Decoded,
    Segmented,
    CornersFound,
    Warped,
    Encoded,
}

/// Outcome of one pipeline invocation.
///
/// Always fully populated: on failure `image` is `None`, `error_message` carries the failing
/// stage's message and `duration` covers the work done up to the failure.
#[derive(Debug, Clone)]
pub struct ProcessingResult<T = DynamicImage> {
    pub success: bool,
    pub error_message: String,
    pub error_kind: Option<ErrorKind>,
    pub stage: Stage,
    pub image: Option<T>,
    pub duration: Duration,
}

impl<T> ProcessingResult<T> {
    pub fn succeeded(image: T, stage: Stage, duration: Duration) -> Self {
        Self {
            success: true,
            error_message: String::new(),
            error_kind: None,
            stage,
            image: Some(image),
            duration,
        }
    }

    pub fn failed(error: &PerspectraError, stage: Stage, duration: Duration) -> Self {
        Self {
            success: false,
            error_message: error.to_string(),
            error_kind: Some(error.kind()),
            stage,
            image: None,
            duration,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Carry a failure over to another payload type.
    pub(crate) fn map_failure<U>(self) -> ProcessingResult<U> {
        ProcessingResult {
            success: false,
            error_message: self.error_message,
            error_kind: self.error_kind,
            stage: self.stage,
            image: None,
            duration: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_from_luma_is_binary() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([(x * 80) as u8]));
        let mask = Mask::from_luma(&gray, 100);
        let values: Vec<u8> = mask.as_image().pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 0, 255, 255]);
        assert_eq!(mask.foreground_count(), 2);
    }

    #[test]
    fn test_failed_result_is_fully_populated() {
        let err = PerspectraError::NoContourFound { min_area: 1.0 };
        let result: ProcessingResult =
            ProcessingResult::failed(&err, Stage::Segmented, Duration::from_millis(3));
        assert!(!result.success);
        assert!(result.image.is_none());
        assert_eq!(result.error_kind, Some(ErrorKind::NoContourFound));
        assert!(!result.error_message.is_empty());
        assert!(result.duration_secs() > 0.0);
    }
}
