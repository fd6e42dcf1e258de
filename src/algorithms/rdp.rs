//! Ramer-Douglas-Peucker polyline simplification.
//!
//! Returns a keep-mask instead of a reduced polyline so that two masks over
//! different projections of the same course (plan view, elevation profile)
//! can be OR-combined before any point is dropped.

/// Keep-mask for `points` simplified with tolerance `epsilon`.
///
/// The first and last points are always kept. Degenerate segments (identical
/// endpoints) fall back to point-to-point distance.
pub fn rdp_mask(points: &[(f64, f64)], epsilon: f64) -> Vec<bool> {
    let n = points.len();
    let mut mask = vec![false; n];
    if n == 0 {
        return mask;
    }
    mask[0] = true;
    mask[n - 1] = true;
    if n <= 2 {
        return mask;
    }

    let mut stack = vec![(0usize, n - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut max_idx = first;
        for i in (first + 1)..last {
            let d = perpendicular_distance(points[i], points[first], points[last]);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }
        if max_dist > epsilon {
            mask[max_idx] = true;
            stack.push((first, max_idx));
            stack.push((max_idx, last));
        }
    }
    mask
}

fn perpendicular_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let norm = (dx * dx + dy * dy).sqrt();
    if norm == 0.0 {
        let (ex, ey) = (p.0 - a.0, p.1 - a.1);
        return (ex * ex + ey * ey).sqrt();
    }
    ((p.0 - a.0) * dy - (p.1 - a.1) * dx).abs() / norm
}
