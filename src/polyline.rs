/*!
Free functions over polylines stored as slices of points. A polyline is
either open, or cyclic in which case the closing segment from the last
point back to the first is implied and the first point is not repeated.
*/

use glam::{DQuat, DVec2, DVec3};

use crate::math::{EPS, Frame, Plane, signed_angle};

/// Length of the polyline, including the closing segment if `cyclic`.
pub fn path_length(points: &[DVec3], cyclic: bool) -> f64 {
    let open: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    match (cyclic, points.first(), points.last()) {
        (true, Some(first), Some(last)) if points.len() > 2 => open + last.distance(*first),
        _ => open,
    }
}

/// Cumulative arc length at each vertex. For cyclic polylines the table has an
/// extra entry for the return to the first point.
pub fn cumulative_lengths(points: &[DVec3], cyclic: bool) -> Vec<f64> {
    let mut table = Vec::with_capacity(points.len() + 1);
    let mut total = 0.0;
    table.push(total);
    for w in points.windows(2) {
        total += w[0].distance(w[1]);
        table.push(total);
    }
    if cyclic && points.len() > 2 {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            total += last.distance(*first);
            table.push(total);
        }
    }
    table
}

/// Point at arc length `target`, given the cumulative length table of
/// `points`. `table.len()` may exceed `points.len()` by one for cyclic
/// polylines, in which case the extra entry refers back to the first point.
fn point_at(points: &[DVec3], table: &[f64], target: f64) -> DVec3 {
    let vertex = |i: usize| points[i % points.len()];
    let j = table.partition_point(|&len| len < target);
    if j == 0 {
        return points[0];
    }
    if j >= table.len() {
        return vertex(table.len() - 1);
    }
    let seg = table[j] - table[j - 1];
    let t = if seg < EPS {
        0.0
    } else {
        (target - table[j - 1]) / seg
    };
    vertex(j - 1).lerp(vertex(j), t)
}

/**
 * Resample the polyline to `count` points evenly spaced by arc length.
 *
 * Cyclic polylines are split into `count` equal segments, and the first sample
 * is placed `shift` segments along the loop from the first point. Open
 * polylines are split into `count - 1` segments, `shift` is ignored, and the
 * first and last points are preserved exactly.
 */
pub fn space_evenly(points: &[DVec3], cyclic: bool, count: usize, shift: f64) -> Vec<DVec3> {
    if points.is_empty() || count == 0 {
        return Vec::new();
    }
    let table = cumulative_lengths(points, cyclic);
    let total = table.last().copied().unwrap_or(0.0);
    if points.len() == 1 || total < EPS {
        return vec![points[0]; count];
    }
    if cyclic && points.len() > 2 {
        let step = total / count as f64;
        (0..count)
            .map(|i| point_at(points, &table, ((i as f64 + shift) * step).rem_euclid(total)))
            .collect()
    } else if count == 1 {
        vec![points[0]]
    } else {
        let last = points.len() - 1;
        let step = total / (count - 1) as f64;
        (0..count)
            .map(|i| match i {
                0 => points[0],
                i if i == count - 1 => points[last],
                i => point_at(points, &table, i as f64 * step),
            })
            .collect()
    }
}

/// Distance of `pt` from the infinite line through `a` and `b`.
fn altitude(pt: DVec3, a: DVec3, b: DVec3) -> f64 {
    let dir = b - a;
    let len = dir.length();
    if len < EPS {
        return pt.distance(a);
    }
    (pt - a).cross(dir).length() / len
}

/**
 * Ramer-Douglas-Peucker simplification. Returns the sorted indices of the
 * points that are kept. The first and last points are always kept.
 */
pub fn rdp_simplify(points: &[DVec3], tolerance: f64) -> Vec<usize> {
    if points.len() < 3 {
        return (0..points.len()).collect();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;
    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let (a, b) = (points[first], points[last]);
        let (imax, dmax) = ((first + 1)..last)
            .map(|i| (i, altitude(points[i], a, b)))
            .fold((first, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if dmax > tolerance {
            keep[imax] = true;
            stack.push((first, imax));
            stack.push((imax, last));
        }
    }
    keep.iter()
        .enumerate()
        .filter_map(|(i, k)| k.then_some(i))
        .collect()
}

/// One pass of Laplacian relaxation. The endpoints are fixed, and polylines
/// with fewer than 4 points are left untouched.
pub fn relax(points: &mut [DVec3], factor: f64) {
    if points.len() < 4 {
        return;
    }
    let deltas: Vec<DVec3> = points
        .windows(3)
        .map(|w| factor * (0.5 * (w[0] + w[2]) - w[1]))
        .collect();
    for (pt, delta) in points[1..].iter_mut().zip(deltas) {
        *pt += delta;
    }
}

/**
 * Rigidly rotate and uniformly scale the path so that its first and last
 * points land on `start` and `end`.
 */
pub fn fit_to_endpoints(points: &[DVec3], start: DVec3, end: DVec3) -> Vec<DVec3> {
    let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    let old = last - first;
    let new = end - start;
    if old.length() < EPS || new.length() < EPS {
        let offset = start - first;
        return points.iter().map(|p| *p + offset).collect();
    }
    let scale = new.length() / old.length();
    let rotation = DQuat::from_rotation_arc(old.normalize(), new.normalize());
    let mut fitted: Vec<DVec3> = points
        .iter()
        .map(|p| start + rotation * ((*p - first) * scale))
        .collect();
    if let Some(tail) = fitted.last_mut() {
        *tail = end;
    }
    fitted[0] = start;
    fitted
}

/// First crossing of the open polyline with the plane.
pub fn intersect_plane(points: &[DVec3], plane: &Plane) -> Option<DVec3> {
    points
        .windows(2)
        .find_map(|w| plane.intersect_segment(w[0], w[1]))
}

pub fn centroid(points: &[DVec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    points.iter().copied().sum::<DVec3>() / points.len() as f64
}

/// Length of the diagonal of the axis aligned bounding box.
pub fn bbox_diagonal(points: &[DVec3]) -> f64 {
    let Some(&first) = points.first() else {
        return 0.0;
    };
    let (min, max) = points
        .iter()
        .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
    min.distance(max)
}

/// Newell's normal of the polygon. Its direction follows the winding, and it
/// is not normalized.
pub fn newell_normal(points: &[DVec3]) -> DVec3 {
    let n = points.len();
    (0..n).fold(DVec3::ZERO, |acc, i| {
        let a = points[i];
        let b = points[(i + 1) % n];
        acc + DVec3::new(
            (a.y - b.y) * (a.z + b.z),
            (a.z - b.z) * (a.x + b.x),
            (a.x - b.x) * (a.y + b.y),
        )
    })
}

/**
 * Sum of the turning angles of the closed polygon about `axis`, with the
 * edges projected onto the plane perpendicular to the axis. A simple loop
 * winding counter clockwise when viewed from the tip of the axis has a curl
 * of `2 * PI`.
 */
pub fn discrete_curl(points: &[DVec3], axis: DVec3) -> Option<f64> {
    let n = points.len();
    if n < 3 || axis.length() < EPS {
        return None;
    }
    let z = axis.normalize();
    let flat = |v: DVec3| v - z * v.dot(z);
    Some(
        (0..n)
            .map(|i| {
                let a = points[(i + n - 1) % n];
                let b = points[i];
                let c = points[(i + 1) % n];
                signed_angle(flat(b - a), flat(c - b), z)
            })
            .sum(),
    )
}

fn inside_polygon_2d(polygon: &[DVec2], pt: DVec2) -> bool {
    let n = polygon.len();
    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + n - 1) % n];
        if (a.y > pt.y) != (b.y > pt.y) && pt.x < (b.x - a.x) * (pt.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
    }
    inside
}

/**
 * Whether `pt` lies within `tolerance` of the loop's plane and inside the
 * loop. Cyclic loops use an even-odd test on the projected polygon. Open
 * chains enclose no area, so the bounding box of the projected chain, grown
 * by `tolerance`, is used instead.
 */
pub fn point_in_loop(pt: DVec3, points: &[DVec3], cyclic: bool, frame: &Frame, tolerance: f64) -> bool {
    if points.len() < 2 || frame.plane().signed_distance(pt).abs() > tolerance {
        return false;
    }
    let local: Vec<DVec2> = points.iter().map(|p| frame.to_local(*p)).collect();
    let query = frame.to_local(pt);
    if cyclic && local.len() > 2 {
        return inside_polygon_2d(&local, query);
    }
    let (min, max) = local
        .iter()
        .fold((local[0], local[0]), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
    let grow = DVec2::splat(tolerance);
    let (min, max) = (min - grow, max + grow);
    query.x >= min.x && query.y >= min.y && query.x <= max.x && query.y <= max.y
}
