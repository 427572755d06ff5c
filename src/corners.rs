use image::{imageops, GrayImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, min_area_rect};
use imageproc::point::Point;
use tracing::debug;

use crate::errors::{PerspectraError, Result};
use crate::geometry::{distance, order_corners};
use crate::types::{Mask, Quadrilateral};

/// Polygon approximation tolerances, as fractions of the contour perimeter, tried in order.
pub const EPSILON_FACTORS: [f64; 5] = [0.01, 0.02, 0.03, 0.05, 0.1];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerParams {
    /// Contours enclosing less than this fraction of the mask area are ignored.
    pub min_contour_area_ratio: f64,
    /// Quadrilaterals enclosing less than this fraction of the mask area are degenerate.
    pub min_quad_area_ratio: f64,
    /// Corners closer than this many pixels are considered coincident.
    pub coincidence_tolerance: f64,
}

impl Default for CornerParams {
    fn default() -> Self {
        Self {
            min_contour_area_ratio: 0.0005,
            min_quad_area_ratio: 0.001,
            coincidence_tolerance: 2.0,
        }
    }
}

/// How the four raw corners were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerSource {
    /// Douglas–Peucker approximation with a tolerance of the given percent of the perimeter.
    Approximation(u8),
    MinAreaRect,
}

/// The dominant contour of a mask and the quadrilateral derived from it.
#[derive(Debug, Clone)]
pub struct CornerDetection {
    pub contour: Vec<Point<i32>>,
    pub contour_area: f64,
    pub quad: Quadrilateral,
    pub source: CornerSource,
}

pub fn extract_corners(mask: &Mask) -> Result<Quadrilateral> {
    detect_corners(mask, &CornerParams::default()).map(|d| d.quad)
}

/// Find the largest foreground contour and reduce it to an ordered quadrilateral.
pub fn detect_corners(mask: &Mask, params: &CornerParams) -> Result<CornerDetection> {
    let (width, height) = mask.dimensions();
    let image_area = width as f64 * height as f64;
    let min_area = image_area * params.min_contour_area_ratio;

    let (contour, contour_area) = largest_contour(mask, min_area)
        .ok_or(PerspectraError::NoContourFound { min_area })?;
    debug!(
        points = contour.len(),
        area = contour_area,
        "Selected dominant contour"
    );

    let (raw, source) = four_corners(&contour);
    let quad = Quadrilateral {
        corners: order_corners(raw),
    };
    check_degenerate(&quad, image_area, params)?;

    debug!(
        top_left = ?quad.top_left(),
        top_right = ?quad.top_right(),
        bottom_right = ?quad.bottom_right(),
        bottom_left = ?quad.bottom_left(),
        ?source,
        "Quadrilateral corners computed"
    );

    Ok(CornerDetection {
        contour,
        contour_area,
        quad,
        source,
    })
}

fn to_f32(points: &[Point<i32>]) -> Vec<Point<f32>> {
    points
        .iter()
        .map(|p| Point::new(p.x as f32, p.y as f32))
        .collect()
}

/// Largest outer contour by enclosed area. Equal areas go to the contour whose bounding box
/// starts highest, then leftmost.
fn largest_contour(mask: &Mask, min_area: f64) -> Option<(Vec<Point<i32>>, f64)> {
    let contours: Vec<Contour<i32>> = find_contours(&framed(mask.as_image()));

    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| {
            let points: Vec<Point<i32>> = c
                .points
                .into_iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();
            let area = contour_area(&points);
            (points, area)
        })
        .filter(|(points, area)| !points.is_empty() && *area > 0.0 && *area >= min_area)
        .min_by(|(a_points, a_area), (b_points, b_area)| {
            b_area
                .total_cmp(a_area)
                .then_with(|| top_left_of(a_points).cmp(&top_left_of(b_points)))
        })
}

/// Copy of `image` inside a one-pixel background frame. The contour tracer only starts an outer
/// border next to a background pixel, so regions touching the image edge need the frame.
fn framed(image: &GrayImage) -> GrayImage {
    let mut framed = GrayImage::new(image.width() + 2, image.height() + 2);
    imageops::replace(&mut framed, image, 1, 1);
    framed
}

fn top_left_of(points: &[Point<i32>]) -> (i32, i32) {
    let top = points.iter().map(|p| p.y).min().unwrap_or(i32::MAX);
    let left = points.iter().map(|p| p.x).min().unwrap_or(i32::MAX);
    (top, left)
}

/// Relax the approximation tolerance until exactly four vertices remain, falling back to the
/// minimum-area rectangle.
fn four_corners(contour: &[Point<i32>]) -> ([Point<f32>; 4], CornerSource) {
    let points = starting_at_extreme(contour);
    let perimeter = arc_length(&points, true);

    for factor in EPSILON_FACTORS {
        let approx = approximate_polygon_dp(&points, factor * perimeter, true);
        match approx.len() {
            4 => {
                let percent = (factor * 100.0).round() as u8;
                let corners = to_f32(&approx);
                return (
                    [corners[0], corners[1], corners[2], corners[3]],
                    CornerSource::Approximation(percent),
                );
            }
            n if n < 4 => break,
            _ => {}
        }
    }

    let rect = to_f32(&min_area_rect(contour));
    (
        [rect[0], rect[1], rect[2], rect[3]],
        CornerSource::MinAreaRect,
    )
}

/// Rotate a closed contour to start at its smallest (x+y, y) point.
///
/// Douglas–Peucker always keeps the first point, so it must be a hull vertex rather than a point
/// in the middle of an edge.
fn starting_at_extreme(contour: &[Point<i32>]) -> Vec<Point<i32>> {
    let start = contour
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.x + p.y, p.y))
        .map_or(0, |(i, _)| i);
    let mut points = contour.to_vec();
    points.rotate_left(start);
    points
}

fn check_degenerate(quad: &Quadrilateral, image_area: f64, params: &CornerParams) -> Result<()> {
    for i in 0..4 {
        for j in (i + 1)..4 {
            let d = distance(quad.corners[i], quad.corners[j]);
            if d < params.coincidence_tolerance {
                return Err(PerspectraError::degenerate(format!(
                    "corners {} and {} coincide ({d:.2} px apart)",
                    Quadrilateral::LABELS[i],
                    Quadrilateral::LABELS[j]
                )));
            }
        }
    }

    let area = quad.area();
    let min_area = image_area * params.min_quad_area_ratio;
    if area < min_area {
        return Err(PerspectraError::degenerate(format!(
            "quadrilateral area {area:.1} px² is below the minimum {min_area:.1} px²"
        )));
    }
    Ok(())
}
