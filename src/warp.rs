use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::debug;

use crate::errors::{PerspectraError, Result};
use crate::geometry::distance;
use crate::types::Quadrilateral;

/// Largest accepted side of a rectified image, padding included.
pub const MAX_OUTPUT_SIDE: u32 = 1 << 15;

/// Output size of a rectification before and after padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpGeometry {
    pub width: u32,
    pub height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl WarpGeometry {
    /// Size the destination rectangle from the longer edge of each opposing pair, then add
    /// `padding_ratio` of each dimension as margin on every side.
    pub fn for_quad(quad: &Quadrilateral, padding_ratio: f64) -> Result<Self> {
        let top = distance(quad.top_left(), quad.top_right());
        let bottom = distance(quad.bottom_left(), quad.bottom_right());
        let left = distance(quad.top_left(), quad.bottom_left());
        let right = distance(quad.top_right(), quad.bottom_right());

        let width = top.max(bottom).round() as u32;
        let height = left.max(right).round() as u32;
        if width == 0 || height == 0 {
            return Err(PerspectraError::InvalidGeometry { width, height });
        }

        let padding_ratio = padding_ratio.max(0.0);
        // Padding of one side, provided the padded side stays within MAX_OUTPUT_SIDE.
        let padded = |side: u32| -> Option<u32> {
            let pad = (side as f64 * padding_ratio).round();
            if !pad.is_finite() || pad > MAX_OUTPUT_SIDE as f64 {
                return None;
            }
            let pad = pad as u32;
            let total = pad.checked_mul(2)?.checked_add(side)?;
            (total <= MAX_OUTPUT_SIDE).then_some(pad)
        };
        let (Some(pad_x), Some(pad_y)) = (padded(width), padded(height)) else {
            let oversized = |side: u32| (side as f64 * (1.0 + 2.0 * padding_ratio)) as u32;
            return Err(PerspectraError::InvalidGeometry {
                width: oversized(width),
                height: oversized(height),
            });
        };
        Ok(Self {
            width,
            height,
            pad_x,
            pad_y,
        })
    }

    pub fn output_width(&self) -> u32 {
        self.width + 2 * self.pad_x
    }

    pub fn output_height(&self) -> u32 {
        self.height + 2 * self.pad_y
    }

    /// Destination corners in TL, TR, BR, BL order.
    pub fn destination(&self) -> [(f32, f32); 4] {
        let (left, top) = (self.pad_x as f32, self.pad_y as f32);
        let right = (self.pad_x + self.width - 1) as f32;
        let bottom = (self.pad_y + self.height - 1) as f32;
        [(left, top), (right, top), (right, bottom), (left, bottom)]
    }

    pub fn projection(&self, quad: &Quadrilateral) -> Result<Projection> {
        Projection::from_control_points(quad.to_tuples(), self.destination()).ok_or(
            PerspectraError::InvalidGeometry {
                width: self.width,
                height: self.height,
            },
        )
    }
}

/// Rectify the region bounded by `quad`. Samples falling outside the source are black, or
/// fully transparent for images with an alpha channel.
pub fn warp(image: &DynamicImage, quad: &Quadrilateral, padding_ratio: f64) -> Result<DynamicImage> {
    let geometry = WarpGeometry::for_quad(quad, padding_ratio)?;
    let projection = geometry.projection(quad)?;
    debug!(
        width = geometry.width,
        height = geometry.height,
        output_width = geometry.output_width(),
        output_height = geometry.output_height(),
        padding_ratio,
        "Perspective transformation"
    );

    let warped = match image {
        DynamicImage::ImageRgba8(rgba) => {
            DynamicImage::ImageRgba8(warp_rgba(rgba, &projection, &geometry))
        }
        DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(warp_rgb(rgb, &projection, &geometry)),
        other if other.color().has_alpha() => {
            DynamicImage::ImageRgba8(warp_rgba(&other.to_rgba8(), &projection, &geometry))
        }
        other => DynamicImage::ImageRgb8(warp_rgb(&other.to_rgb8(), &projection, &geometry)),
    };
    Ok(warped)
}

fn warp_rgb(image: &RgbImage, projection: &Projection, geometry: &WarpGeometry) -> RgbImage {
    let fill = Rgb([0, 0, 0]);
    let mut out = RgbImage::from_pixel(geometry.output_width(), geometry.output_height(), fill);
    warp_into(image, projection, Interpolation::Bilinear, fill, &mut out);
    out
}

fn warp_rgba(image: &RgbaImage, projection: &Projection, geometry: &WarpGeometry) -> RgbaImage {
    let fill = Rgba([0, 0, 0, 0]);
    let mut out = RgbaImage::from_pixel(geometry.output_width(), geometry.output_height(), fill);
    warp_into(image, projection, Interpolation::Bilinear, fill, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use image::GenericImageView;
    use imageproc::point::Point;

    fn quad(coords: [(f32, f32); 4]) -> Quadrilateral {
        Quadrilateral {
            corners: coords.map(|(x, y)| Point::new(x, y)),
        }
    }

    fn square() -> Quadrilateral {
        quad([(20.0, 20.0), (80.0, 20.0), (80.0, 80.0), (20.0, 80.0)])
    }

    #[test]
    fn test_unpadded_size_is_longest_edges() {
        let trapezoid = quad([(10.0, 10.0), (70.0, 10.0), (90.0, 50.0), (0.0, 50.0)]);
        let geometry = WarpGeometry::for_quad(&trapezoid, 0.0).unwrap();
        assert_eq!(geometry.width, 90);
        // Left edge sqrt(10² + 40²) ≈ 41.2, right edge sqrt(20² + 40²) ≈ 44.7.
        assert_eq!(geometry.height, 45);
        assert_eq!(geometry.output_width(), 90);
    }

    #[test]
    fn test_padding_scales_by_one_plus_two_p() {
        let base = WarpGeometry::for_quad(&square(), 0.0).unwrap();
        for p in [0.05, 0.1, 0.25] {
            let padded = WarpGeometry::for_quad(&square(), p).unwrap();
            let expected = base.output_width() as f64 * (1.0 + 2.0 * p);
            assert!((padded.output_width() as f64 - expected).abs() <= 1.0);
            assert!((padded.output_height() as f64 - expected).abs() <= 1.0);
        }
    }

    #[test]
    fn test_collapsed_quad_is_invalid_geometry() {
        let point = quad([(5.0, 5.0), (5.2, 5.0), (5.2, 5.3), (5.0, 5.3)]);
        let err = WarpGeometry::for_quad(&point, 0.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
    }

    #[test]
    fn test_oversized_padding_is_invalid_geometry() {
        for p in [1e9, 1e300, f64::INFINITY] {
            let err = WarpGeometry::for_quad(&square(), p).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
        }
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let err = warp(&image, &square(), 1e9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
    }

    #[test]
    fn test_output_side_limit_is_inclusive() {
        let wide = quad([(0.0, 0.0), (1000.0, 0.0), (1000.0, 10.0), (0.0, 10.0)]);
        // (32768 - 1000) / 2 = 15884 px of padding on each side.
        let geometry = WarpGeometry::for_quad(&wide, 15.884).unwrap();
        assert_eq!(geometry.output_width(), MAX_OUTPUT_SIDE);
        assert!(WarpGeometry::for_quad(&wide, 15.9).is_err());
    }

    #[test]
    fn test_warp_square_region() {
        let image = RgbImage::from_fn(100, 100, |x, y| {
            if (20..=80).contains(&x) && (20..=80).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let warped = warp(&DynamicImage::ImageRgb8(image), &square(), 0.0).unwrap();
        assert_eq!(warped.dimensions(), (60, 60));
        let rgb = warped.to_rgb8();
        assert_eq!(rgb.get_pixel(30, 30), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_padding_is_filled_with_background() {
        let image = RgbImage::from_pixel(100, 100, Rgb([200, 200, 200]));
        let tight = quad([(0.0, 0.0), (99.0, 0.0), (99.0, 99.0), (0.0, 99.0)]);
        let warped = warp(&DynamicImage::ImageRgb8(image), &tight, 0.1)
            .unwrap()
            .to_rgb8();
        assert_eq!(warped.dimensions(), (119, 119));
        assert_eq!(warped.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(warped.get_pixel(59, 59), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_rgba_padding_is_transparent() {
        let image = RgbaImage::from_pixel(50, 50, Rgba([10, 20, 30, 255]));
        let tight = quad([(0.0, 0.0), (49.0, 0.0), (49.0, 49.0), (0.0, 49.0)]);
        let warped = warp(&DynamicImage::ImageRgba8(image), &tight, 0.2)
            .unwrap()
            .to_rgba8();
        assert_eq!(warped.get_pixel(0, 0)[3], 0);
        assert_eq!(warped.get_pixel(30, 30)[3], 255);
    }
}
