/*!
Vertex correspondence between two loops of equal resolution. Bridging vertex
`i` of one loop to vertex `i` of the next must not twist, so the loops need
the same winding and a matching starting vertex.
*/

use glam::DVec3;

use crate::{
    config::AlignSearch,
    math::EPS,
    polyline::{centroid, discrete_curl, newell_normal},
};

/**
 * Anything that can sit at either end of a bridge: a cut or an existing
 * boundary loop.
 */
pub trait LoopLike {
    /// The loop at the resolution it is bridged at.
    fn simplified(&self) -> &[DVec3];

    fn plane_normal(&self) -> DVec3;

    fn plane_origin(&self) -> DVec3;

    fn is_cyclic(&self) -> bool;
}

/// Outcome of aligning one loop to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Whether the loop was reversed to match the winding of the other.
    pub reversed: bool,
    /// Discrete rotation that minimizes the total bridge length.
    pub rotation: usize,
    /// Continuous phase after alignment, in segments.
    pub shift: f64,
    /// Connectivity cost of the final correspondence.
    pub cost: f64,
    /// Best cost after each step of the continuous refinement, starting with
    /// the cost of the discrete rotation alone.
    pub trace: Vec<f64>,
}

/**
 * Whether `this` must be reversed to run in the same direction as `other`.
 *
 * Closed loops compare their curl about an axis averaged from both loop
 * normals. Open chains compare their end to end chords.
 */
pub fn needs_reverse(this: &[DVec3], other: &[DVec3], cyclic: bool) -> bool {
    if this.len() < 2 || other.len() < 2 {
        return false;
    }
    if !cyclic || this.len() < 3 || other.len() < 3 {
        let chord = |pts: &[DVec3]| pts[pts.len() - 1] - pts[0];
        return chord(this).dot(chord(other)) < 0.0;
    }
    let n0 = newell_normal(this).normalize_or_zero();
    let mut n1 = newell_normal(other).normalize_or_zero();
    if n0.dot(n1) < 0.0 {
        n1 = -n1;
    }
    let axis = if (n0 + n1).length() < EPS { n0 } else { n0 + n1 };
    match (discrete_curl(this, axis), discrete_curl(other, axis)) {
        (Some(a), Some(b)) => a * b < 0.0,
        _ => false,
    }
}

/**
 * Rotation `r` minimizing the summed distance between `this[(i + r) % n]`
 * and `other[i]`.
 */
pub fn rough_rotation(this: &[DVec3], other: &[DVec3]) -> usize {
    let n = this.len().min(other.len());
    if n == 0 {
        return 0;
    }
    let table: Vec<f64> = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .map(|(i, j)| this[i].distance(other[j]))
        .collect();
    (0..n)
        .map(|r| {
            let total: f64 = (0..n).map(|i| table[((i + r) % n) * n + i]).sum();
            (r, total)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(r, _)| r)
        .unwrap_or(0)
}

/**
 * How far the bridges `this[i] -> other[i]` deviate from the direction
 * between the loop centroids. Zero when every bridge is parallel to that
 * direction, one when every bridge is perpendicular to it.
 */
pub fn connectivity_cost(this: &[DVec3], other: &[DVec3]) -> f64 {
    let n = this.len().min(other.len());
    if n == 0 {
        return 0.0;
    }
    let axis = (centroid(this) - centroid(other)).normalize_or_zero();
    let agreement: f64 = this
        .iter()
        .zip(other.iter())
        .map(|(a, b)| (*a - *b).normalize_or_zero().dot(axis).abs())
        .sum();
    1.0 - agreement / n as f64
}

/// Result of [`refine_shift`].
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    pub shift: f64,
    pub cost: f64,
    pub trace: Vec<f64>,
}

/**
 * Ternary style search for the phase with the lowest cost, starting from a
 * shift of zero.
 *
 * Each step samples the midpoint and the two tercile points of the interval.
 * If the midpoint is the best the interval shrinks by an eighth on either
 * side. If it is the worst the interval loses a quarter on the side of the
 * worse tercile. Otherwise it loses a quarter on the side that is rising. The
 * narrowing is a heuristic, so the best sample seen so far is returned rather
 * than the final midpoint.
 */
pub fn refine_shift(search: &AlignSearch, mut cost: impl FnMut(f64) -> f64) -> Refinement {
    let mut best = (0.0, cost(0.0));
    let mut trace = Vec::with_capacity(search.iterations + 1);
    trace.push(best.1);
    let (mut left, mut right) = (search.lower, search.upper);
    for _ in 0..search.iterations {
        let width = right - left;
        if width <= EPS {
            break;
        }
        let (lo, mid, hi) = (left + width / 3.0, 0.5 * (left + right), right - width / 3.0);
        let (c_lo, c_mid, c_hi) = (cost(lo), cost(mid), cost(hi));
        for (s, c) in [(lo, c_lo), (mid, c_mid), (hi, c_hi)] {
            if c < best.1 {
                best = (s, c);
            }
        }
        trace.push(best.1);
        if c_mid < c_lo && c_mid < c_hi {
            left += width / 8.0;
            right -= width / 8.0;
        } else if c_mid > c_lo && c_mid > c_hi {
            if c_lo < c_hi {
                right -= width / 4.0;
            } else {
                left += width / 4.0;
            }
        } else if c_hi < c_mid {
            left += width / 4.0;
        } else {
            right -= width / 4.0;
        }
    }
    Refinement {
        shift: best.0,
        cost: best.1,
        trace,
    }
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;

    use glam::{DVec3, dvec3};

    use super::*;
    use crate::{macros::assert_f64_eq, polyline::space_evenly};

    fn ring(n: usize, phase: f64, x: f64) -> Vec<DVec3> {
        (0..n)
            .map(|i| {
                let t = 2.0 * PI * (i as f64 + phase) / n as f64;
                dvec3(x, t.cos(), t.sin())
            })
            .collect()
    }

    #[test]
    fn t_needs_reverse_cyclic() {
        let a = ring(8, 0.0, 0.0);
        let mut b = ring(8, 0.0, 1.0);
        assert!(!needs_reverse(&a, &b, true));
        b.reverse();
        assert!(needs_reverse(&a, &b, true));
    }

    #[test]
    fn t_needs_reverse_open() {
        let a = vec![DVec3::ZERO, DVec3::Y, dvec3(0.0, 2.0, 0.0)];
        let b = vec![DVec3::X, dvec3(1.0, 2.0, 0.0)];
        assert!(!needs_reverse(&a, &b, false));
        let c = vec![dvec3(1.0, 2.0, 0.0), DVec3::X];
        assert!(needs_reverse(&a, &c, false));
    }

    #[test]
    fn t_rough_rotation() {
        let other = ring(8, 0.0, 1.0);
        let this = ring(8, 3.0, 0.0);
        // this[(i + 5) % 8] has phase i + 8 which matches other[i].
        assert_eq!(rough_rotation(&this, &other), 5);
        assert_eq!(rough_rotation(&other, &other), 0);
    }

    #[test]
    fn t_connectivity_cost() {
        let a = ring(8, 0.0, 0.0);
        let b = ring(8, 0.0, 1.0);
        assert_f64_eq!(connectivity_cost(&a, &b), 0.0, 1e-12);
        let twisted = ring(8, 2.0, 1.0);
        assert!(connectivity_cost(&a, &twisted) > 0.3);
    }

    #[test]
    fn t_refine_shift_finds_minimum() {
        let search = AlignSearch::default();
        let result = refine_shift(&search, |s| (s - 0.3).powi(2));
        assert_f64_eq!(result.shift, 0.3, 0.02);
        assert!(result.cost <= 0.09);
        assert_eq!(result.trace.len(), search.iterations + 1);
    }

    #[test]
    fn t_refine_shift_is_monotone() {
        let other = ring(10, 0.0, 1.0);
        let raw: Vec<DVec3> = ring(64, 0.0, 0.0)
            .into_iter()
            .map(|p| dvec3(p.x + 0.2 * p.y * p.z, 1.3 * p.y, p.z))
            .collect();
        let result = refine_shift(&AlignSearch::default(), |s| {
            connectivity_cost(&space_evenly(&raw, true, 10, s + 0.37), &other)
        });
        assert!(result.trace.windows(2).all(|w| w[1] <= w[0]));
        assert!(result.cost <= result.trace[0]);
    }
}
