use glam::{DVec2, DVec3};

use super::{CutSeries, SeriesState};
use crate::{
    arena::CutArena,
    config::Settings,
    cut::CrossSectionCut,
    error::{Error, Result},
    math::EPS,
    polyline::{bbox_diagonal, discrete_curl, path_length, rdp_simplify, relax, space_evenly},
    surface::Surface,
    view::View,
};

/// Relaxation weight of each smoothing pass.
const RELAX_FACTOR: f64 = 0.75;

fn snap<S: Surface + ?Sized>(surface: &S, pt: DVec3) -> DVec3 {
    surface.closest_point(pt).map_or(pt, |h| h.point)
}

/**
 * Normals of the cut planes at the given points along a path. Each normal
 * follows the averaged direction of the path at the point, projected onto
 * the screen plane so that the cuts face the viewer edge on.
 */
pub(crate) fn cut_normals(points: &[DVec3], view_dir: DVec3) -> Vec<DVec3> {
    let n = points.len();
    let chord = |a: usize, b: usize| (points[b] - points[a]).normalize_or_zero();
    (0..n)
        .map(|i| {
            let avg = match i {
                _ if n < 2 => DVec3::ZERO,
                _ if n == 2 => chord(0, 1),
                0 => chord(0, 1) + chord(0, 2),
                i if i == n - 1 => chord(n - 2, n - 1) + chord(n - 3, n - 1),
                i => chord(i - 1, i) + chord(i, i + 1),
            };
            let projected = view_dir.cross(avg.cross(view_dir));
            if projected.length_squared() > EPS {
                projected.normalize()
            } else if avg.length_squared() > EPS {
                avg.normalize()
            } else {
                DVec3::X
            }
        })
        .collect()
}

impl CutSeries {
    /**
     * Projects a screen space stroke onto the surface and smooths it into the
     * path of a new series. One in every `cull_factor` samples is kept, along
     * with the last one. Samples that miss the surface are dropped, but the
     * stroke must start on the surface.
     */
    pub fn from_stroke<S: Surface + ?Sized, V: View + ?Sized>(
        surface: &S,
        view: &V,
        stroke: &[DVec2],
        settings: &Settings,
    ) -> Result<Self> {
        if stroke.len() < settings.min_stroke_points.max(2) {
            return Err(Error::DegenerateStroke("too few points"));
        }
        let step = settings.cull_factor.max(1);
        let mut culled: Vec<DVec2> = stroke.iter().step_by(step).copied().collect();
        if (stroke.len() - 1) % step != 0 {
            culled.push(stroke[stroke.len() - 1]);
        }
        let project = |s: DVec2| {
            let (origin, dir) = view.ray(s);
            surface.raycast(origin, dir).map(|h| h.point)
        };
        let first = project(culled[0])
            .ok_or(Error::DegenerateStroke("stroke does not start on the surface"))?;
        let mut raw = vec![first];
        raw.extend(culled[1..].iter().filter_map(|s| project(*s)));
        if raw.len() < 2 || path_length(&raw, false) < EPS {
            return Err(Error::DegenerateStroke("stroke is too short"));
        }
        log::debug!(
            "Stroke of {} samples kept {} surface points",
            stroke.len(),
            raw.len()
        );
        let mut series = Self::new(settings.ring_segments);
        series.raw_world = raw;
        series.segment_count = settings.segments;
        series.state = SeriesState::Building;
        series.smooth_path(surface, settings);
        Ok(series)
    }

    /// Knots are the stroke samples that survive simplification at a
    /// tolerance relative to the size of the stroke.
    pub fn find_knots(&mut self, feature_factor: f64) {
        let tolerance = bbox_diagonal(&self.raw_world) / feature_factor.max(EPS);
        self.knots = rdp_simplify(&self.raw_world, tolerance);
    }

    /**
     * Relaxes the stroke between consecutive knots, pulling the relaxed points
     * back onto the surface after every pass. The knots stay fixed, so sharp
     * turns of the stroke survive.
     */
    pub fn smooth_path<S: Surface + ?Sized>(&mut self, surface: &S, settings: &Settings) {
        self.find_knots(settings.feature_factor);
        let mut path: Vec<DVec3> = Vec::with_capacity(self.raw_world.len());
        for w in self.knots.windows(2) {
            let mut piece = self.raw_world[w[0]..=w[1]].to_vec();
            let last = piece.len() - 1;
            for _ in 0..settings.smooth_factor {
                relax(&mut piece, RELAX_FACTOR);
                for p in &mut piece[1..last] {
                    *p = snap(surface, *p);
                }
            }
            if !path.is_empty() {
                piece.remove(0);
            }
            path.extend(piece);
        }
        self.path_raw = path;
    }

    /// Replaces the path with the given polyline on the surface.
    pub(crate) fn set_path(&mut self, path: Vec<DVec3>) {
        self.knots = rdp_simplify(&path, f64::INFINITY);
        self.raw_world = path.clone();
        self.path_raw = path;
    }

    /// Series made of individually placed cuts have no stroke, so their path
    /// is stitched together from the backbone.
    fn ensure_path(&mut self) {
        if self.path_raw.len() > 1 {
            return;
        }
        let mut path: Vec<DVec3> = Vec::new();
        for segment in &self.backbone {
            let skip = if path.is_empty() { 0 } else { 1 };
            path.extend(segment.iter().skip(skip));
        }
        if path.len() > 1 {
            self.set_path(path);
        }
    }

    /**
     * Places the points where cuts are made, evenly spaced along the path and
     * snapped to the surface. Existing loops at either end take up one point
     * each, so the number of cuts matches the segment count.
     */
    pub fn create_cut_points<S: Surface + ?Sized>(&mut self, surface: &S) {
        let count = (self.segment_count
            + self.existing_head.is_some() as usize
            + self.existing_tail.is_some() as usize)
            .max(2);
        self.cut_points = space_evenly(&self.path_raw, false, count, 0.0)
            .into_iter()
            .map(|p| snap(surface, p))
            .collect();
    }

    /**
     * Replaces the cuts of the series with new cuts at the cut points. Cuts
     * whose plane misses the surface are skipped. The first loop is wound
     * counter clockwise about its normal, unless it has to follow an existing
     * loop, and every other loop is aligned to the one behind it.
     */
    pub fn cuts_on_path<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        view_dir: DVec3,
        settings: &Settings,
    ) -> Result<()> {
        for id in self.cuts.drain(..) {
            arena.remove(id)?;
        }
        self.create_cut_points(surface);
        let normals = cut_normals(&self.cut_points, view_dir);
        let first = self.existing_head.is_some() as usize;
        let last = self
            .cut_points
            .len()
            .saturating_sub(self.existing_tail.is_some() as usize);
        for i in first..last {
            match CrossSectionCut::on_surface(
                surface,
                self.cut_points[i],
                normals[i],
                self.ring_segment_count,
            ) {
                Ok(cut) => self.cuts.push(arena.insert(cut)),
                Err(e) => log::warn!("Skipping cut {} of the series: {}", i, e),
            }
        }
        if self.existing_head.is_none() {
            if let Some(&id) = self.cuts.first() {
                let cut = arena.get_mut(id)?;
                if cut.is_cyclic()
                    && discrete_curl(cut.simplified(), cut.plane_normal()).is_some_and(|c| c < 0.0)
                {
                    cut.reverse();
                }
            }
        }
        self.align_all(arena, &settings.align)?;
        if self.cuts.len() != self.segment_count {
            log::warn!(
                "Series has {} of {} requested cuts",
                self.cuts.len(),
                self.segment_count
            );
        }
        self.segment_count = self.cuts.len();
        if self.state == SeriesState::Empty {
            self.state = SeriesState::Building;
        }
        self.backbone_from_cuts(arena, surface, settings.crawl_steps)
    }

    /// Regenerates the cuts with a different count.
    pub fn change_segments<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        view_dir: DVec3,
        count: usize,
        settings: &Settings,
    ) -> Result<()> {
        if self.seg_locked {
            return Err(Error::SeriesLocked);
        }
        if count == 0 || (count < 3 && self.cuts.len() > 1) {
            return Err(Error::TooFewSegments(count));
        }
        self.ensure_path();
        if self.path_raw.len() < 2 {
            return Err(Error::DegenerateStroke("series has no path"));
        }
        self.segment_count = count;
        self.cuts_on_path(arena, surface, view_dir, settings)
    }

    pub fn set_seg_locked(&mut self, locked: bool) {
        self.seg_locked = locked;
    }

    pub fn set_ring_locked(&mut self, locked: bool) {
        self.ring_locked = locked;
    }
}
