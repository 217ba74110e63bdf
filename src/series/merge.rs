use glam::DVec3;

use super::{AlignMode, CutSeries, SeriesState, path::cut_normals};
use crate::{
    align::LoopLike,
    anchor::ExistingLoopAnchor,
    arena::CutArena,
    config::Settings,
    cut::CrossSectionCut,
    error::{Error, Result},
    polyline::{fit_to_endpoints, path_length, space_evenly},
    surface::Surface,
};

/// One end of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesEnd {
    Head,
    Tail,
}

/// Vertex of the loop closest to `pt`. Paths are attached to loops there, so
/// they stay on the surface.
pub(crate) fn attach_point(anchor: &dyn LoopLike, pt: DVec3) -> DVec3 {
    anchor
        .simplified()
        .iter()
        .copied()
        .min_by(|a, b| a.distance_squared(pt).total_cmp(&b.distance_squared(pt)))
        .unwrap_or_else(|| anchor.plane_origin())
}

impl CutSeries {
    /**
     * The loop a new stroke can attach to at the given end. Ends that are
     * existing loops are fixed, except that a series made of a single existing
     * loop can be extended past it.
     */
    pub fn end_anchor<'a>(
        &'a self,
        arena: &'a CutArena,
        end: SeriesEnd,
    ) -> Result<Option<&'a dyn LoopLike>> {
        Ok(match end {
            SeriesEnd::Head if self.existing_head.is_some() => None,
            SeriesEnd::Head => match self.cuts.first() {
                Some(id) => Some(arena.get(*id)?),
                None => None,
            },
            SeriesEnd::Tail if self.existing_tail.is_some() => None,
            SeriesEnd::Tail => match self.cuts.last() {
                Some(id) => Some(arena.get(*id)?),
                None => self.existing_head.as_ref().map(|h| h as &dyn LoopLike),
            },
        })
    }

    /// Orients the path to start at the end nearest `pt`.
    fn path_from(&self, pt: DVec3) -> Result<Vec<DVec3>> {
        let (Some(first), Some(last)) = (self.path_raw.first(), self.path_raw.last()) else {
            return Err(Error::DegenerateStroke("series has no path"));
        };
        let mut path = self.path_raw.clone();
        if last.distance_squared(pt) < first.distance_squared(pt) {
            path.reverse();
        }
        Ok(path)
    }

    /**
     * Hands the loops along this series' path over to `other`, attached at the
     * given end of `other`. The path is refitted to start on the end loop of
     * `other`, and divided at the spacing of `other` with its resolution. The
     * cut that would land on the end loop is dropped. This series keeps no
     * cuts and is marked merged away.
     *
     * Returns the number of cuts added to `other`.
     */
    pub fn snap_merge<S: Surface + ?Sized>(
        &mut self,
        other: &mut CutSeries,
        end: SeriesEnd,
        arena: &mut CutArena,
        surface: &S,
        view_dir: DVec3,
        settings: &Settings,
    ) -> Result<usize> {
        let width = other.segment_width(arena)?;
        let (start, path) = {
            let anchor = other
                .end_anchor(arena, end)?
                .ok_or(Error::SeriesLocked)?;
            let path = self.path_from(anchor.plane_origin())?;
            (attach_point(anchor, path[0]), path)
        };
        let fitted = fit_to_endpoints(&path, start, path[path.len() - 1]);
        let length = path_length(&fitted, false);
        let width = width.unwrap_or(length / settings.segments.max(1) as f64);
        let segments = ((length / width).ceil() as usize).max(1);
        let points: Vec<DVec3> = space_evenly(&fitted, false, segments + 1, 0.0)
            .into_iter()
            .map(|p| surface.closest_point(p).map_or(p, |h| h.point))
            .collect();
        let normals = cut_normals(&points, view_dir);
        for id in self.cuts.drain(..) {
            arena.remove(id)?;
        }
        let mut added = Vec::with_capacity(segments);
        for i in 1..points.len() {
            match CrossSectionCut::on_surface(surface, points[i], normals[i], other.ring_segment_count)
            {
                Ok(cut) => added.push(arena.insert(cut)),
                Err(e) => log::warn!("Skipping merged cut {}: {}", i, e),
            }
        }
        let count = added.len();
        match end {
            SeriesEnd::Tail => {
                let from = other.cuts.len();
                other.cuts.extend(added);
                for i in from..other.cuts.len() {
                    if i > 0 || other.existing_head.is_some() {
                        other.align_cut(arena, i, AlignMode::Behind, &settings.align)?;
                    }
                }
                let mut joined = other.path_raw.clone();
                joined.extend(fitted.iter().skip(usize::from(!joined.is_empty())));
                other.set_path(joined);
            }
            SeriesEnd::Head => {
                added.reverse();
                for id in &added {
                    arena.get_mut(*id)?.flip_normal();
                }
                let rest = std::mem::replace(&mut other.cuts, added);
                other.cuts.extend(rest);
                for i in (0..count).rev() {
                    other.align_cut(arena, i, AlignMode::Ahead, &settings.align)?;
                }
                let mut joined: Vec<DVec3> = fitted.iter().rev().copied().collect();
                joined.extend(other.path_raw.iter().skip(1));
                other.set_path(joined);
            }
        }
        other.segment_count += count;
        other.backbone_from_cuts(arena, surface, settings.crawl_steps)?;
        self.path_raw = fitted;
        self.segment_count = segments;
        self.backbone.clear();
        self.state = SeriesState::MergedAway;
        log::info!("Merged {} cuts into a series of {}", count, other.cuts.len());
        Ok(count)
    }

    /// Makes an existing loop the head of the series. The series takes on the
    /// resolution of the loop, and can no longer change it.
    pub fn set_existing_head(&mut self, anchor: ExistingLoopAnchor) {
        self.ring_segment_count = anchor.len();
        self.ring_locked = true;
        self.existing_head = Some(anchor);
    }

    pub fn set_existing_tail(&mut self, anchor: ExistingLoopAnchor) {
        self.ring_segment_count = anchor.len();
        self.ring_locked = true;
        self.existing_tail = Some(anchor);
    }

    /**
     * Attaches the given end of the path to an existing loop, and regenerates
     * the cuts at the resolution of the loop. The path is refitted to start
     * or end on the loop vertex closest to it.
     */
    pub fn snap_end_to_existing<S: Surface + ?Sized>(
        &mut self,
        anchor: ExistingLoopAnchor,
        end: SeriesEnd,
        arena: &mut CutArena,
        surface: &S,
        view_dir: DVec3,
        settings: &Settings,
    ) -> Result<()> {
        if self.ring_locked && self.ring_segment_count != anchor.len() {
            return Err(Error::MismatchedResolution(self.ring_segment_count, anchor.len()));
        }
        let (Some(&first), Some(&last)) = (self.path_raw.first(), self.path_raw.last()) else {
            return Err(Error::DegenerateStroke("series has no path"));
        };
        let fitted = match end {
            SeriesEnd::Head => fit_to_endpoints(&self.path_raw, attach_point(&anchor, first), last),
            SeriesEnd::Tail => fit_to_endpoints(&self.path_raw, first, attach_point(&anchor, last)),
        };
        self.path_raw = fitted;
        match end {
            SeriesEnd::Head => self.set_existing_head(anchor),
            SeriesEnd::Tail => self.set_existing_tail(anchor),
        }
        self.cuts_on_path(arena, surface, view_dir, settings)
    }
}
