use std::f64::consts::FRAC_PI_3;

use glam::DVec3;

use super::{AlignMode, CutSeries, SeriesState};
use crate::{
    align::LoopLike,
    arena::{CutArena, CutId},
    config::Settings,
    cut::CrossSectionCut,
    error::{Error, Result},
    math::EPS,
    polyline::{bbox_diagonal, discrete_curl, point_in_loop},
    surface::Surface,
};

/// Tolerance of the point in loop test, relative to the size of the loop.
const INSIDE_TOLERANCE: f64 = 0.01;

/// Which geometric test accepted an inserted cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPath {
    /// The series was empty.
    Trivial,
    /// The series had a single loop, and the new cut is close to it and
    /// roughly in front of or behind it.
    SingleExtension,
    /// Between the existing head loop and the first cut.
    AfterHead,
    /// Between two consecutive loops.
    Between,
    BeforeFirst,
    AfterLast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    pub path: InsertPath,
    /// Index of the new cut in the series.
    pub index: usize,
}

fn inside(cut: &CrossSectionCut, pt: DVec3) -> bool {
    let tolerance = (INSIDE_TOLERANCE * cut.size()).max(EPS);
    point_in_loop(pt, cut.simplified(), cut.is_cyclic(), cut.frame(), tolerance)
}

/**
 * Whether the line between the origins of `a` and `b` crosses the plane of
 * `cut` inside the loop of `cut`, at a point that is on the same side of each
 * of the two planes as the other loop.
 */
fn lies_between(a: &dyn LoopLike, b: &dyn LoopLike, cut: &CrossSectionCut) -> bool {
    let (ao, bo) = (a.plane_origin(), b.plane_origin());
    let Some(x) = cut.plane().intersect_line(ao, bo) else {
        return false;
    };
    let same_side = |l: &dyn LoopLike, toward: DVec3| {
        let n = l.plane_normal();
        (x - l.plane_origin()).dot(n) * (toward - l.plane_origin()).dot(n) > 0.0
    };
    same_side(a, bo) && same_side(b, ao) && inside(cut, x)
}

/**
 * Whether `cut` continues the series past the end loop `end`, in the
 * direction from `inner` to `end`, within `reach` of `end`.
 */
fn extends(end: &dyn LoopLike, inner: &dyn LoopLike, cut: &CrossSectionCut, reach: f64) -> bool {
    let (eo, io) = (end.plane_origin(), inner.plane_origin());
    let Some(x) = cut.plane().intersect_line(io, eo) else {
        return false;
    };
    (x - eo).dot(eo - io) > 0.0 && x.distance(eo) < reach && inside(cut, x)
}

impl CutSeries {
    /**
     * Inserts a cut from the arena into the series, at the position along the
     * path that the cut's plane and loop imply. The cut is resampled to the
     * resolution of the series and aligned to its new neighbours, and the
     * backbone is updated around it.
     *
     * Returns `None` if the cut does not fit anywhere in the series.
     */
    pub fn insert<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        id: CutId,
        settings: &Settings,
    ) -> Result<Option<Insertion>> {
        if self.contains(id) {
            return Ok(None);
        }
        let found = if self.is_empty() {
            let ring = arena.get(id)?.ring_segments();
            self.ring_segment_count = ring;
            Some(Insertion {
                path: InsertPath::Trivial,
                index: 0,
            })
        } else {
            let cut = arena.get_mut(id)?;
            if cut.ring_segments() != self.ring_segment_count {
                cut.set_ring_segments(self.ring_segment_count);
            }
            if self.anchor_count() == 1 {
                self.single_extension(arena, id, settings)?
            } else {
                self.find_slot(arena, id, settings)?
            }
        };
        let Some(insertion) = found else {
            log::debug!("Cut does not fit anywhere in the series");
            return Ok(None);
        };
        let old_gaps = self.gap_count();
        let consistent = self.backbone.len() == old_gaps;
        self.cuts.insert(insertion.index, id);
        self.segment_count += 1;
        if self.state == SeriesState::Empty {
            self.state = SeriesState::Building;
        }
        let steps = settings.crawl_steps;
        match insertion.path {
            InsertPath::Trivial => self.backbone.clear(),
            InsertPath::SingleExtension => {
                self.align_tail(arena)?;
                self.backbone_from_cuts(arena, surface, steps)?;
            }
            path => {
                self.align_cut(arena, insertion.index, AlignMode::Between, &settings.align)?;
                let p = insertion.index + self.existing_head.is_some() as usize;
                if !consistent {
                    self.backbone_from_cuts(arena, surface, steps)?;
                } else if path == InsertPath::BeforeFirst {
                    let segment = self.bridge_gap(arena, surface, 0, steps)?;
                    self.backbone.insert(0, segment);
                } else if path == InsertPath::AfterLast {
                    let segment = self.bridge_gap(arena, surface, p - 1, steps)?;
                    self.backbone.push(segment);
                } else {
                    let before = self.bridge_gap(arena, surface, p - 1, steps)?;
                    let after = self.bridge_gap(arena, surface, p, steps)?;
                    self.backbone[p - 1] = before;
                    self.backbone.insert(p, after);
                }
            }
        }
        log::info!(
            "Inserted cut at {} of {} via {:?}",
            insertion.index,
            self.cuts.len(),
            insertion.path
        );
        Ok(Some(insertion))
    }

    /**
     * A series with a single loop accepts a cut whose centroid is within
     * `search_factor` loop sizes of the loop, and whose direction from the
     * loop is within 60 degrees of the loop's normal. Both loops are then
     * oriented to face along the series.
     */
    fn single_extension(
        &self,
        arena: &mut CutArena,
        id: CutId,
        settings: &Settings,
    ) -> Result<Option<Insertion>> {
        let Some(&lone_id) = self.cuts.first() else {
            return self.extend_existing(arena, id, settings);
        };
        let offset = arena.get(id)?.origin() - arena.get(lone_id)?.plane_origin();
        if !Self::within_reach(arena.get(lone_id)?, offset, settings.search_factor) {
            return Ok(None);
        }
        {
            let first = arena.get_mut(lone_id)?;
            if first.plane_normal().dot(offset) < 0.0 {
                first.flip_normal();
            }
            if first.is_cyclic()
                && discrete_curl(first.simplified(), first.plane_normal()).is_some_and(|c| c < 0.0)
            {
                first.reverse();
            }
        }
        let first = arena.shared(lone_id)?;
        let cut = arena.get_mut(id)?;
        if cut.plane_normal().dot(offset) < 0.0 {
            cut.flip_normal();
        }
        cut.align_to(&*first, true, &settings.align);
        Ok(Some(Insertion {
            path: InsertPath::SingleExtension,
            index: 1,
        }))
    }

    /// Single extension of a series whose only loop is an existing one.
    fn extend_existing(
        &self,
        arena: &mut CutArena,
        id: CutId,
        settings: &Settings,
    ) -> Result<Option<Insertion>> {
        let (existing, is_head) = match (&self.existing_head, &self.existing_tail) {
            (Some(h), _) => (h, true),
            (None, Some(t)) => (t, false),
            (None, None) => return Err(Error::NothingSelected),
        };
        let cut = arena.get_mut(id)?;
        let offset = cut.origin() - existing.plane_origin();
        if !Self::within_reach(existing, offset, settings.search_factor) {
            return Ok(None);
        }
        // Normals point from the head towards the tail.
        let along = if is_head { offset } else { -offset };
        if cut.plane_normal().dot(along) < 0.0 {
            cut.flip_normal();
        }
        cut.align_to(existing, true, &settings.align);
        Ok(Some(Insertion {
            path: InsertPath::SingleExtension,
            index: 0,
        }))
    }

    fn within_reach(lone: &dyn LoopLike, offset: DVec3, search_factor: f64) -> bool {
        let dist = offset.length();
        let reach = search_factor * bbox_diagonal(lone.simplified());
        if dist < EPS || dist >= reach {
            return false;
        }
        offset.dot(lone.plane_normal()).abs() / dist >= FRAC_PI_3.sin()
    }

    /// Tries the gaps between consecutive anchors, then both ends.
    fn find_slot(
        &self,
        arena: &CutArena,
        id: CutId,
        settings: &Settings,
    ) -> Result<Option<Insertion>> {
        let cut = arena.get(id)?;
        let anchors = self.anchors(arena)?;
        let head = self.existing_head.is_some() as usize;
        for g in 0..anchors.len().saturating_sub(1) {
            if lies_between(anchors[g], anchors[g + 1], cut) {
                let path = if g == 0 && head == 1 {
                    InsertPath::AfterHead
                } else {
                    InsertPath::Between
                };
                return Ok(Some(Insertion {
                    path,
                    index: g + 1 - head,
                }));
            }
        }
        let spacing = match self.average_backbone_length() {
            Some(len) => len,
            None => self.segment_width(arena)?.unwrap_or(0.0),
        };
        let reach = settings.search_factor * spacing;
        let n = anchors.len();
        if n >= 2 && self.existing_head.is_none() && extends(anchors[0], anchors[1], cut, reach) {
            return Ok(Some(Insertion {
                path: InsertPath::BeforeFirst,
                index: 0,
            }));
        }
        if n >= 2
            && self.existing_tail.is_none()
            && extends(anchors[n - 1], anchors[n - 2], cut, reach)
        {
            return Ok(Some(Insertion {
                path: InsertPath::AfterLast,
                index: self.cuts.len(),
            }));
        }
        Ok(None)
    }

    /**
     * Removes a cut from the series and the arena, and bridges the gap it
     * leaves in the backbone. The series is marked destroyed when nothing is
     * left in it.
     */
    pub fn remove<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        id: CutId,
        settings: &Settings,
    ) -> Result<CrossSectionCut> {
        let k = self.position(id).ok_or(Error::InvalidCut(id))?;
        let p = k + self.existing_head.is_some() as usize;
        let old_gaps = self.gap_count();
        let consistent = self.backbone.len() == old_gaps;
        self.cuts.remove(k);
        let cut = arena.remove(id)?;
        self.segment_count = self.segment_count.saturating_sub(1);
        if !consistent {
            self.backbone_from_cuts(arena, surface, settings.crawl_steps)?;
        } else if old_gaps == 0 {
            self.backbone.clear();
        } else if p == 0 {
            self.backbone.remove(0);
        } else if p == old_gaps {
            self.backbone.pop();
        } else {
            let segment = self.bridge_gap(arena, surface, p - 1, settings.crawl_steps)?;
            self.backbone[p - 1] = segment;
            self.backbone.remove(p);
        }
        self.mark_destroyed_if_empty();
        Ok(cut)
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use glam::{DVec3, dvec3};

    use super::InsertPath;
    use crate::{
        align::LoopLike,
        arena::CutArena,
        cut::CrossSectionCut,
        macros::assert_point_eq,
        series::{
            CutSeries, SeriesState,
            test::{flat_settings, plane_series},
        },
        trisurface::TriSurface,
    };

    fn x_cut(surf: &TriSurface, x: f64) -> CrossSectionCut {
        CrossSectionCut::on_surface(surf, dvec3(x, 0.1, 0.0), DVec3::X, 8).expect("Cannot cut")
    }

    fn origins_in_order(series: &CutSeries, arena: &CutArena) -> bool {
        series
            .cuts()
            .windows(2)
            .map(|w| {
                let a = arena.get(w[0]).expect("Cannot access cut").origin();
                let b = arena.get(w[1]).expect("Cannot access cut").origin();
                b.x - a.x
            })
            .all(|d| d > 0.0)
    }

    #[test]
    fn t_insert_trivial() {
        let surf = TriSurface::grid_plane(2.0, 8).expect("Cannot create grid");
        let mut arena = CutArena::default();
        let mut series = CutSeries::new(8);
        let id = arena.insert(x_cut(&surf, -0.45));
        let insertion = series
            .insert(&mut arena, &surf, id, &flat_settings())
            .expect("Cannot insert")
            .expect("Cut must be accepted");
        assert_eq!(insertion.path, InsertPath::Trivial);
        assert_eq!(series.cuts(), &[id]);
        assert!(series.backbone().is_empty());
        assert_eq!(series.series_state(), SeriesState::Building);
        assert_eq!(series.segment_count(), 1);
    }

    #[test]
    fn t_single_extension() {
        let surf = TriSurface::grid_plane(2.0, 8).expect("Cannot create grid");
        let settings = flat_settings();
        let mut arena = CutArena::default();
        let mut series = CutSeries::new(8);
        let first = arena.insert(x_cut(&surf, -0.45));
        series
            .insert(&mut arena, &surf, first, &settings)
            .expect("Cannot insert");
        // Off to the side of the first loop.
        let sideways = arena.insert(
            CrossSectionCut::on_surface(&surf, dvec3(0.0, 0.55, 0.0), DVec3::Y, 8)
                .expect("Cannot cut"),
        );
        assert_eq!(
            series
                .insert(&mut arena, &surf, sideways, &settings)
                .expect("Cannot insert"),
            None
        );
        let second = arena.insert(x_cut(&surf, 0.2));
        let insertion = series
            .insert(&mut arena, &surf, second, &settings)
            .expect("Cannot insert")
            .expect("Cut must be accepted");
        assert_eq!(insertion.path, InsertPath::SingleExtension);
        assert_eq!(series.cuts(), &[first, second]);
        assert_eq!(series.backbone().len(), 1);
        let a = arena.get(first).expect("Cannot access cut");
        let b = arena.get(second).expect("Cannot access cut");
        assert!(a.plane_normal().dot(b.plane_normal()) > 0.0);
        let chord = |c: &CrossSectionCut| c.simplified()[7] - c.simplified()[0];
        assert!(chord(a).dot(chord(b)) > 0.0);
    }

    #[test]
    fn t_insert_between() {
        let mut arena = CutArena::default();
        let (surf, mut series) = plane_series(&mut arena);
        let before: Vec<Rc<[DVec3]>> = series.backbone().to_vec();
        let mid = {
            let a = arena.get(series.cuts()[2]).expect("Cannot access cut");
            let b = arena.get(series.cuts()[3]).expect("Cannot access cut");
            0.5 * (a.origin().x + b.origin().x)
        };
        let id = arena.insert(x_cut(&surf, mid));
        let insertion = series
            .insert(&mut arena, &surf, id, &flat_settings())
            .expect("Cannot insert")
            .expect("Cut must be accepted");
        assert_eq!(insertion.path, InsertPath::Between);
        assert_eq!(insertion.index, 3);
        assert_eq!(series.cuts().len(), 5);
        assert_eq!(series.cuts()[3], id);
        assert_eq!(series.segment_count(), 5);
        assert!(origins_in_order(&series, &arena));
        let after = series.backbone();
        assert_eq!(after.len(), 4);
        assert!(Rc::ptr_eq(&before[0], &after[0]));
        assert!(Rc::ptr_eq(&before[1], &after[1]));
        assert!(!Rc::ptr_eq(&before[2], &after[2]));
    }

    #[test]
    fn t_extend_and_reject() {
        let mut arena = CutArena::default();
        let (surf, mut series) = plane_series(&mut arena);
        let settings = flat_settings();
        let parallel = arena.insert(
            CrossSectionCut::on_surface(&surf, dvec3(0.0, 0.55, 0.0), DVec3::Y, 8)
                .expect("Cannot cut"),
        );
        assert_eq!(
            series
                .insert(&mut arena, &surf, parallel, &settings)
                .expect("Cannot insert"),
            None
        );
        assert_eq!(series.cuts().len(), 4);
        let before = series.backbone().to_vec();
        let id = arena.insert(x_cut(&surf, 0.95));
        let insertion = series
            .insert(&mut arena, &surf, id, &settings)
            .expect("Cannot insert")
            .expect("Cut must be accepted");
        assert_eq!(insertion.path, InsertPath::AfterLast);
        assert_eq!(series.cuts()[4], id);
        assert_eq!(series.backbone().len(), 4);
        assert!(Rc::ptr_eq(&before[2], &series.backbone()[2]));
        let id = arena.insert(x_cut(&surf, -0.95));
        let insertion = series
            .insert(&mut arena, &surf, id, &settings)
            .expect("Cannot insert")
            .expect("Cut must be accepted");
        assert_eq!(insertion.path, InsertPath::BeforeFirst);
        assert_eq!(series.cuts()[0], id);
        assert!(origins_in_order(&series, &arena));
        assert_eq!(series.backbone().len(), series.gap_count());
    }

    #[test]
    fn t_remove() {
        let mut arena = CutArena::default();
        let (surf, mut series) = plane_series(&mut arena);
        let settings = flat_settings();
        let before = series.backbone().to_vec();
        let id = series.cuts()[2];
        let cut = series
            .remove(&mut arena, &surf, id, &settings)
            .expect("Cannot remove");
        assert_point_eq!(cut.plane_normal(), DVec3::X, 1e-12);
        assert_eq!(series.cuts().len(), 3);
        assert_eq!(arena.len(), 3);
        assert_eq!(series.backbone().len(), 2);
        assert!(Rc::ptr_eq(&before[0], &series.backbone()[0]));
        let end = series.backbone()[1][series.backbone()[1].len() - 1];
        let last = arena.get(series.cuts()[2]).expect("Cannot access cut");
        assert!((end - last.plane_origin()).dot(last.plane_normal()).abs() < 1e-9);
        assert!(series.remove(&mut arena, &surf, id, &settings).is_err());
        for id in series.cuts().to_vec() {
            series
                .remove(&mut arena, &surf, id, &settings)
                .expect("Cannot remove");
            assert_eq!(series.backbone().len(), series.gap_count());
        }
        assert_eq!(series.series_state(), SeriesState::Destroyed);
        assert!(arena.is_empty());
    }
}
