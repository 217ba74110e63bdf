use glam::DVec3;

use crate::{
    align::{Alignment, LoopLike, connectivity_cost, needs_reverse, refine_shift, rough_rotation},
    config::AlignSearch,
    element::FH,
    error::{Error, Result},
    math::{Frame, Plane},
    polyline::{bbox_diagonal, centroid, space_evenly},
    surface::Surface,
};

/**
 * A single loop made by cutting the surface with a plane.
 *
 * The loop is kept at two resolutions: the raw polyline returned by the
 * surface, and a simplified loop with a fixed number of vertices evenly spaced
 * along the raw polyline. The simplified loop is a function of the raw
 * polyline, the shift and the rotation offset, and is recomputed whenever any
 * of them change.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSectionCut {
    plane_point: DVec3,
    plane_normal: DVec3,
    seed: FH,
    raw: Vec<DVec3>,
    raw_edges: Vec<(u32, u32)>,
    cyclic: bool,
    ring_segments: usize,
    simplified: Vec<DVec3>,
    shift: f64,
    rotation_offset: usize,
    frame: Frame,
}

/// Placement of a cut that can be restored bit for bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlacement {
    pub plane_point: DVec3,
    pub plane_normal: DVec3,
    pub seed: FH,
    pub shift: f64,
    pub rotation_offset: usize,
    pub frame: Frame,
}

impl CrossSectionCut {
    /// A cut that has not yet been intersected with a surface.
    pub fn new(plane_point: DVec3, plane_normal: DVec3) -> Self {
        let plane_normal = plane_normal.normalize_or_zero();
        CrossSectionCut {
            plane_point,
            plane_normal,
            seed: FH::default(),
            raw: Vec::new(),
            raw_edges: Vec::new(),
            cyclic: false,
            ring_segments: 0,
            simplified: Vec::new(),
            shift: 0.0,
            rotation_offset: 0,
            frame: Frame::new(plane_point, plane_normal),
        }
    }

    /// Cuts the surface with the plane through `plane_point`, seeded at the
    /// face closest to `plane_point`, and simplifies the loop to
    /// `ring_segments` vertices.
    pub fn on_surface<S: Surface + ?Sized>(
        surface: &S,
        plane_point: DVec3,
        plane_normal: DVec3,
        ring_segments: usize,
    ) -> Result<Self> {
        let hit = surface.closest_point(plane_point).ok_or(Error::EmptySurface)?;
        let mut cut = Self::new(hit.point, plane_normal);
        cut.cut(surface, hit.point, plane_normal, hit.face)?;
        cut.simplify(ring_segments, 0.0, 0);
        Ok(cut)
    }

    pub fn plane_point(&self) -> DVec3 {
        self.plane_point
    }

    pub fn plane_normal(&self) -> DVec3 {
        self.plane_normal
    }

    pub fn plane(&self) -> Plane {
        Plane::new(self.plane_point, self.plane_normal)
    }

    pub fn seed(&self) -> FH {
        self.seed
    }

    pub fn raw(&self) -> &[DVec3] {
        &self.raw
    }

    pub fn raw_edges(&self) -> &[(u32, u32)] {
        &self.raw_edges
    }

    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    pub fn simplified(&self) -> &[DVec3] {
        &self.simplified
    }

    pub fn ring_segments(&self) -> usize {
        self.ring_segments
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    pub fn rotation_offset(&self) -> usize {
        self.rotation_offset
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Centroid of the simplified loop, or of the raw loop before it is
    /// simplified.
    pub fn origin(&self) -> DVec3 {
        self.frame.origin
    }

    /// Size of the loop, as the diagonal of its bounding box.
    pub fn size(&self) -> f64 {
        bbox_diagonal(if self.simplified.is_empty() {
            &self.raw
        } else {
            &self.simplified
        })
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /**
     * Replaces the raw polyline with the intersection of the plane with the
     * surface near `seed`, and re-simplifies at the current resolution. On
     * failure both polylines are cleared, and the plane is kept so the cut can
     * be retried.
     */
    pub fn cut<S: Surface + ?Sized>(
        &mut self,
        surface: &S,
        plane_point: DVec3,
        plane_normal: DVec3,
        seed: FH,
    ) -> Result<()> {
        self.plane_point = plane_point;
        self.plane_normal = plane_normal.normalize_or_zero();
        self.seed = seed;
        match surface.cross_section(&self.plane(), seed) {
            Ok(section) if section.points.len() > 1 => {
                self.raw = section.points;
                self.raw_edges = section.edges;
                self.cyclic = section.cyclic;
                self.resample();
                Ok(())
            }
            Ok(_) | Err(Error::EmptyIntersection) => {
                self.clear();
                Err(Error::EmptyIntersection)
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Cuts again with the current plane and seed.
    pub fn recut<S: Surface + ?Sized>(&mut self, surface: &S) -> Result<()> {
        self.cut(surface, self.plane_point, self.plane_normal, self.seed)
    }

    fn clear(&mut self) {
        self.raw.clear();
        self.raw_edges.clear();
        self.simplified.clear();
        self.frame = Frame::new(self.plane_point, self.plane_normal);
    }

    /**
     * Resamples the raw polyline to `n` points evenly spaced by arc length.
     * Closed loops start `shift` segments along the loop and are then rotated
     * by `rotation_offset` indices. Open chains keep their endpoints and have
     * no phase.
     */
    pub fn simplify(&mut self, n: usize, shift: f64, rotation_offset: usize) {
        self.ring_segments = n;
        self.shift = shift;
        self.rotation_offset = rotation_offset;
        self.resample();
    }

    fn resample(&mut self) {
        if self.raw.is_empty() || self.ring_segments == 0 {
            self.simplified.clear();
            let origin = if self.raw.is_empty() {
                self.plane_point
            } else {
                centroid(&self.raw)
            };
            self.frame = Frame::new(origin, self.plane_normal);
            return;
        }
        let n = self.ring_segments;
        if self.cyclic {
            self.rotation_offset %= n;
            self.simplified = space_evenly(&self.raw, true, n, self.shift);
            self.simplified.rotate_left(self.rotation_offset);
        } else {
            self.shift = 0.0;
            self.rotation_offset = 0;
            self.simplified = space_evenly(&self.raw, false, n, 0.0);
        }
        self.frame = Frame::new(centroid(&self.simplified), self.plane_normal);
    }

    /// Nudges the phase of the loop by `delta` segments.
    pub fn shift_by(&mut self, delta: f64) {
        self.shift += delta;
        self.resample();
    }

    /// Changes the resolution, keeping the phase at the same place along the
    /// loop.
    pub fn set_ring_segments(&mut self, n: usize) {
        if self.ring_segments > 0 && n > 0 {
            let scale = n as f64 / self.ring_segments as f64;
            self.shift = (self.shift + self.rotation_offset as f64) * scale;
            self.rotation_offset = 0;
        }
        self.ring_segments = n;
        self.resample();
    }

    /**
     * Reverses the direction of the loop. Closed loops keep their first
     * vertex, so re-simplifying the reversed raw loop reproduces the reversed
     * simplified loop.
     */
    pub fn reverse(&mut self) {
        if self.cyclic {
            if let Some(rest) = self.raw.get_mut(1..) {
                rest.reverse();
            }
            if let Some(rest) = self.simplified.get_mut(1..) {
                rest.reverse();
            }
            self.shift = -self.shift;
            if self.ring_segments > 0 {
                self.rotation_offset = (self.ring_segments - self.rotation_offset) % self.ring_segments;
            }
        } else {
            self.raw.reverse();
            self.simplified.reverse();
        }
        let n = self.raw.len() as u32;
        self.raw_edges = (1..n).map(|i| (i - 1, i)).collect();
        if self.cyclic && n > 2 {
            self.raw_edges.push((n - 1, 0));
        }
    }

    /// Flips the plane normal without touching the loop.
    pub fn flip_normal(&mut self) {
        self.plane_normal = -self.plane_normal;
        self.frame = Frame::new(self.frame.origin, self.plane_normal);
    }

    /**
     * Makes the winding and starting vertex of this loop consistent with
     * `other`, so that bridging vertex `i` of both loops does not twist.
     *
     * Loops of different resolution cannot be bridged, in which case nothing
     * changes and `None` is returned. With `auto_align`, closed loops also
     * search for the continuous phase with the lowest connectivity cost, and
     * the discrete rotation is folded into the shift.
     */
    pub fn align_to(
        &mut self,
        other: &dyn LoopLike,
        auto_align: bool,
        search: &AlignSearch,
    ) -> Option<Alignment> {
        let n = self.simplified.len();
        if n == 0 || n != other.simplified().len() {
            log::warn!(
                "Cannot align a loop of {} vertices to one of {} vertices",
                n,
                other.simplified().len()
            );
            return None;
        }
        let reversed = needs_reverse(
            &self.simplified,
            other.simplified(),
            self.cyclic && other.is_cyclic(),
        );
        if reversed {
            self.reverse();
        }
        if !(self.cyclic && other.is_cyclic()) {
            return Some(Alignment {
                reversed,
                rotation: 0,
                shift: self.shift,
                cost: connectivity_cost(&self.simplified, other.simplified()),
                trace: Vec::new(),
            });
        }
        if !auto_align {
            let rotation = rough_rotation(&self.simplified, other.simplified());
            self.rotation_offset = (self.rotation_offset + rotation) % n;
            self.resample();
            return Some(Alignment {
                reversed,
                rotation,
                shift: self.shift,
                cost: connectivity_cost(&self.simplified, other.simplified()),
                trace: Vec::new(),
            });
        }
        self.shift = 0.0;
        self.rotation_offset = 0;
        self.resample();
        let rotation = rough_rotation(&self.simplified, other.simplified());
        let raw = &self.raw;
        let refined = refine_shift(search, |s| {
            connectivity_cost(
                &space_evenly(raw, true, n, s + rotation as f64),
                other.simplified(),
            )
        });
        self.shift = (rotation as f64 + refined.shift).rem_euclid(n as f64);
        self.resample();
        log::debug!(
            "Aligned loop with rotation {} and shift {:.4}, cost {:.4}",
            rotation,
            self.shift,
            refined.cost
        );
        Some(Alignment {
            reversed,
            rotation,
            shift: self.shift,
            cost: refined.cost,
            trace: refined.trace,
        })
    }

    pub fn placement(&self) -> CutPlacement {
        CutPlacement {
            plane_point: self.plane_point,
            plane_normal: self.plane_normal,
            seed: self.seed,
            shift: self.shift,
            rotation_offset: self.rotation_offset,
            frame: self.frame,
        }
    }

    /// Restores a placement and cuts the surface with it again. The phase is
    /// restored as is, without re-aligning.
    pub fn restore<S: Surface + ?Sized>(&mut self, surface: &S, placement: &CutPlacement) -> Result<()> {
        self.shift = placement.shift;
        self.rotation_offset = placement.rotation_offset;
        let result = self.cut(
            surface,
            placement.plane_point,
            placement.plane_normal,
            placement.seed,
        );
        self.plane_normal = placement.plane_normal;
        self.frame = placement.frame;
        result
    }

    /// Moves the plane and cuts again, seeding the cut at the surface point
    /// closest to the new plane point.
    pub fn move_plane<S: Surface + ?Sized>(
        &mut self,
        surface: &S,
        plane_point: DVec3,
        plane_normal: DVec3,
    ) -> Result<()> {
        let hit = surface.closest_point(plane_point).ok_or(Error::EmptySurface)?;
        self.cut(surface, hit.point, plane_normal, hit.face)
    }
}

impl LoopLike for CrossSectionCut {
    fn simplified(&self) -> &[DVec3] {
        &self.simplified
    }

    fn plane_normal(&self) -> DVec3 {
        self.plane_normal
    }

    fn plane_origin(&self) -> DVec3 {
        self.frame.origin
    }

    fn is_cyclic(&self) -> bool {
        self.cyclic
    }
}
