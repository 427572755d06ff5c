//! Corner ordering used for the perspective warp. Areas, perimeters, polygon simplification and
//! minimum-area rectangles come from [`imageproc::geometry`].

use std::cmp::Ordering;

use imageproc::point::Point;

pub fn distance(a: Point<f32>, b: Point<f32>) -> f64 {
    ((a.x as f64 - b.x as f64).powi(2) + (a.y as f64 - b.y as f64).powi(2)).sqrt()
}

fn sum(p: &Point<f32>) -> f32 {
    p.x + p.y
}

fn diff(p: &Point<f32>) -> f32 {
    p.x - p.y
}

/// Total order on points used to break ties: `key`, then y, then x.
fn cmp_by(key: fn(&Point<f32>) -> f32, a: &Point<f32>, b: &Point<f32>) -> Ordering {
    key(a)
        .total_cmp(&key(b))
        .then(a.y.total_cmp(&b.y))
        .then(a.x.total_cmp(&b.x))
}

/// Label four points top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest x+y, bottom-right the largest; of the other two, top-right has the
/// larger x−y. When that labelling does not trace a simple clockwise polygon (heavily rotated or
/// skewed input) the points are re-ordered clockwise around their centroid, starting from the
/// top-left candidate. The result never depends on the order of `points`.
pub fn order_corners(points: [Point<f32>; 4]) -> [Point<f32>; 4] {
    let mut remaining = points.to_vec();

    let tl_index = (0..remaining.len())
        .min_by(|&a, &b| cmp_by(sum, &remaining[a], &remaining[b]))
        .unwrap_or(0);
    let top_left = remaining.swap_remove(tl_index);

    let br_index = (0..remaining.len())
        .max_by(|&a, &b| cmp_by(sum, &remaining[a], &remaining[b]))
        .unwrap_or(0);
    let bottom_right = remaining.swap_remove(br_index);

    remaining.sort_by(|a, b| cmp_by(diff, a, b));
    let (bottom_left, top_right) = (remaining[0], remaining[1]);

    let ordered = [top_left, top_right, bottom_right, bottom_left];
    if is_simple_clockwise(&ordered) {
        ordered
    } else {
        order_by_angle(top_left, points)
    }
}

fn cross(o: Point<f32>, a: Point<f32>, b: Point<f32>) -> f64 {
    (a.x as f64 - o.x as f64) * (b.y as f64 - o.y as f64)
        - (a.y as f64 - o.y as f64) * (b.x as f64 - o.x as f64)
}

/// Convex and clockwise (in image coordinates) with every turn strictly positive.
pub fn is_simple_clockwise(quad: &[Point<f32>; 4]) -> bool {
    (0..4).all(|i| cross(quad[i], quad[(i + 1) % 4], quad[(i + 2) % 4]) > 0.0)
}

fn order_by_angle(start: Point<f32>, points: [Point<f32>; 4]) -> [Point<f32>; 4] {
    let cx = points.iter().map(|p| p.x as f64).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y as f64).sum::<f64>() / 4.0;
    let angle = |p: &Point<f32>| (p.y as f64 - cy).atan2(p.x as f64 - cx);

    let mut sorted = points;
    // Increasing atan2 with y down is a clockwise sweep on screen.
    sorted.sort_by(|a, b| angle(a).total_cmp(&angle(b)).then(cmp_by(sum, a, b)));
    let offset = sorted.iter().position(|p| *p == start).unwrap_or(0);
    sorted.rotate_left(offset);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: [(f32, f32); 4]) -> [Point<f32>; 4] {
        coords.map(|(x, y)| Point::new(x, y))
    }

    fn permutations(p: [Point<f32>; 4]) -> Vec<[Point<f32>; 4]> {
        let mut out = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let idx = [a, b, c, d];
                        let mut seen = [false; 4];
                        idx.iter().for_each(|&i| seen[i] = true);
                        if seen.iter().all(|&s| s) {
                            out.push(idx.map(|i| p[i]));
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_order_axis_aligned_square() {
        let expected = pts([(20.0, 20.0), (80.0, 20.0), (80.0, 80.0), (20.0, 80.0)]);
        for permuted in permutations(expected) {
            assert_eq!(order_corners(permuted), expected);
        }
    }

    #[test]
    fn test_order_is_permutation_invariant_for_rotated_quads() {
        let quads = [
            pts([(30.0, 10.0), (90.0, 25.0), (75.0, 85.0), (15.0, 70.0)]),
            pts([(12.0, 40.0), (70.0, 5.0), (95.0, 60.0), (40.0, 98.0)]),
            pts([(0.0, 0.0), (100.0, 10.0), (90.0, 60.0), (5.0, 50.0)]),
        ];
        for quad in quads {
            let reference = order_corners(quad);
            assert!(is_simple_clockwise(&reference));
            for permuted in permutations(quad) {
                assert_eq!(order_corners(permuted), reference);
            }
        }
    }

    #[test]
    fn test_order_diamond_uses_tie_breaks() {
        // A square rotated by 45°: x+y ties for two pairs of corners.
        let diamond = pts([(50.0, 0.0), (100.0, 50.0), (50.0, 100.0), (0.0, 50.0)]);
        let expected = diamond;
        for permuted in permutations(diamond) {
            assert_eq!(order_corners(permuted), expected);
        }
    }

    #[test]
    fn test_order_steep_rotation_stays_clockwise() {
        let quad = pts([(60.0, 0.0), (100.0, 70.0), (45.0, 100.0), (5.0, 30.0)]);
        let ordered = order_corners(quad);
        assert!(is_simple_clockwise(&ordered));
        assert_eq!(
            ordered,
            pts([(5.0, 30.0), (60.0, 0.0), (100.0, 70.0), (45.0, 100.0)])
        );
    }

    #[test]
    fn test_order_falls_back_to_angle_for_diagonal_sliver() {
        // Elongated along the main diagonal: min and max x+y are adjacent corners, so the
        // sum/difference labelling would cross itself.
        let sliver = pts([(0.0, 0.0), (100.0, 100.0), (90.0, 104.0), (-2.0, 4.0)]);
        for permuted in permutations(sliver) {
            let ordered = order_corners(permuted);
            assert!(is_simple_clockwise(&ordered));
            assert_eq!(ordered, sliver);
        }
    }
}
