use glam::DVec3;

use crate::{element::FH, error::Result, math::Plane};

/**
 * Polyline formed by intersecting a plane with a surface.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub points: Vec<DVec3>,
    /// Pairs of indices into `points`.
    pub edges: Vec<(u32, u32)>,
    /// Whether the polyline closes back on itself.
    pub cyclic: bool,
}

impl Section {
    /// Builds the section from an ordered chain of points.
    pub fn from_chain(points: Vec<DVec3>, cyclic: bool) -> Self {
        let n = points.len() as u32;
        let mut edges: Vec<(u32, u32)> = (1..n).map(|i| (i - 1, i)).collect();
        if cyclic && n > 2 {
            edges.push((n - 1, 0));
        }
        Section {
            points,
            edges,
            cyclic,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A point on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub point: DVec3,
    pub normal: DVec3,
    pub face: FH,
}

/**
 * The source surface that loops are cut from. All queries are read only.
 */
pub trait Surface {
    /**
     * The connected polyline formed by intersecting the plane with the surface,
     * localized to the component passing through `seed`. Fails with
     * [`Error::EmptyIntersection`](crate::Error::EmptyIntersection) if the plane
     * misses the surface.
     */
    fn cross_section(&self, plane: &Plane, seed: FH) -> Result<Section>;

    /// Nearest intersection of the ray with the surface.
    fn raycast(&self, origin: DVec3, direction: DVec3) -> Option<SurfaceHit>;

    /// Point on the surface closest to `point`.
    fn closest_point(&self, point: DVec3) -> Option<SurfaceHit>;

    /**
     * Walk across the surface from `point` on face `seed`, along the
     * intersection of the surface with the plane through `point` with normal
     * `cut_normal`, until `stop` is reached. The walk goes in whichever
     * direction reaches `stop` first, and the returned polyline ends on
     * `stop`. Fails with [`Error::CrawlFailed`](crate::Error::CrawlFailed) if
     * `stop` is not reached within `max_steps` segments.
     */
    fn crawl(
        &self,
        seed: FH,
        point: DVec3,
        cut_normal: DVec3,
        stop: &Plane,
        max_steps: usize,
    ) -> Result<Vec<DVec3>>;
}

impl<S: Surface + ?Sized> Surface for &S {
    fn cross_section(&self, plane: &Plane, seed: FH) -> Result<Section> {
        (**self).cross_section(plane, seed)
    }

    fn raycast(&self, origin: DVec3, direction: DVec3) -> Option<SurfaceHit> {
        (**self).raycast(origin, direction)
    }

    fn closest_point(&self, point: DVec3) -> Option<SurfaceHit> {
        (**self).closest_point(point)
    }

    fn crawl(
        &self,
        seed: FH,
        point: DVec3,
        cut_normal: DVec3,
        stop: &Plane,
        max_steps: usize,
    ) -> Result<Vec<DVec3>> {
        (**self).crawl(seed, point, cut_normal, stop, max_steps)
    }
}
