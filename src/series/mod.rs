/*!
An ordered run of loops along one stroke.

The loops of a series are its cuts, optionally preceded by an existing head
loop and followed by an existing tail loop. Together these are the anchors of
the series, and consecutive anchors are joined by backbone polylines crawled
across the surface.
*/

mod insert;
mod merge;
mod path;
mod smooth;

use std::rc::Rc;

use glam::DVec3;

use crate::{
    align::{Alignment, LoopLike},
    anchor::ExistingLoopAnchor,
    arena::{CutArena, CutId},
    config::AlignSearch,
    cut::CrossSectionCut,
    error::{Error, Result},
    math::Plane,
    polyline::path_length,
    surface::Surface,
};

pub use insert::{InsertPath, Insertion};
pub use merge::SeriesEnd;
pub(crate) use merge::attach_point;

/// One backbone polyline, shared with undo snapshots.
pub type BackboneSegment = Rc<[DVec3]>;

/// Lifecycle of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesState {
    /// No loops yet.
    Empty,
    /// Loops are being generated from a stroke or placed one at a time.
    Building,
    /// Loop counts are locked or confirmed by the user.
    Stable,
    /// The loops were handed over to another series.
    MergedAway,
    /// The last loop was removed.
    Destroyed,
}

/// Which neighbours a loop is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMode {
    /// Average of the phases that align to the loop behind and ahead.
    Between,
    Behind,
    Ahead,
    /// Only match the winding of the loop behind, or ahead for the first loop.
    Direction,
}

/// A loop next to a cut, borrowed from the arena or the series.
enum Neighbor<'a> {
    Cut(Rc<CrossSectionCut>),
    Existing(&'a ExistingLoopAnchor),
}

impl Neighbor<'_> {
    fn as_loop(&self) -> &dyn LoopLike {
        match self {
            Neighbor::Cut(c) => &**c,
            Neighbor::Existing(e) => *e,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CutSeries {
    cuts: Vec<CutId>,
    existing_head: Option<ExistingLoopAnchor>,
    existing_tail: Option<ExistingLoopAnchor>,
    /// Stroke samples projected onto the surface.
    raw_world: Vec<DVec3>,
    /// Smoothed stroke on the surface.
    path_raw: Vec<DVec3>,
    knots: Vec<usize>,
    cut_points: Vec<DVec3>,
    segment_count: usize,
    ring_segment_count: usize,
    seg_locked: bool,
    ring_locked: bool,
    backbone: Vec<BackboneSegment>,
    state: SeriesState,
}

impl CutSeries {
    /// An empty series, waiting for a loop to be placed.
    pub fn new(ring_segment_count: usize) -> Self {
        CutSeries {
            cuts: Vec::new(),
            existing_head: None,
            existing_tail: None,
            raw_world: Vec::new(),
            path_raw: Vec::new(),
            knots: Vec::new(),
            cut_points: Vec::new(),
            segment_count: 0,
            ring_segment_count,
            seg_locked: false,
            ring_locked: false,
            backbone: Vec::new(),
            state: SeriesState::Empty,
        }
    }

    /// A series starting on an existing boundary loop. The loop fixes the
    /// resolution of every cut added to the series.
    pub fn from_existing(anchor: ExistingLoopAnchor) -> Self {
        let mut series = Self::new(anchor.len());
        series.existing_head = Some(anchor);
        series.ring_locked = true;
        series.state = SeriesState::Stable;
        series
    }

    pub fn cuts(&self) -> &[CutId] {
        &self.cuts
    }

    pub fn existing_head(&self) -> Option<&ExistingLoopAnchor> {
        self.existing_head.as_ref()
    }

    pub fn existing_tail(&self) -> Option<&ExistingLoopAnchor> {
        self.existing_tail.as_ref()
    }

    pub fn path_raw(&self) -> &[DVec3] {
        &self.path_raw
    }

    pub fn raw_world(&self) -> &[DVec3] {
        &self.raw_world
    }

    pub fn knots(&self) -> &[usize] {
        &self.knots
    }

    pub fn cut_points(&self) -> &[DVec3] {
        &self.cut_points
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn ring_segment_count(&self) -> usize {
        self.ring_segment_count
    }

    pub fn is_seg_locked(&self) -> bool {
        self.seg_locked
    }

    pub fn is_ring_locked(&self) -> bool {
        self.ring_locked
    }

    pub fn backbone(&self) -> &[BackboneSegment] {
        &self.backbone
    }

    pub fn series_state(&self) -> SeriesState {
        self.state
    }

    pub fn contains(&self, id: CutId) -> bool {
        self.cuts.contains(&id)
    }

    pub fn position(&self, id: CutId) -> Option<usize> {
        self.cuts.iter().position(|c| *c == id)
    }

    /// Marks the loop counts as confirmed.
    pub fn confirm(&mut self) {
        if matches!(self.state, SeriesState::Empty | SeriesState::Building) && !self.is_empty() {
            self.state = SeriesState::Stable;
        }
    }

    /// No cuts and no existing loops.
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty() && self.existing_head.is_none() && self.existing_tail.is_none()
    }

    /// Number of anchors, i.e. cuts plus existing loops.
    pub fn anchor_count(&self) -> usize {
        self.cuts.len()
            + self.existing_head.is_some() as usize
            + self.existing_tail.is_some() as usize
    }

    /// Number of gaps between consecutive anchors.
    pub fn gap_count(&self) -> usize {
        self.anchor_count().saturating_sub(1)
    }

    /// All anchors in path order.
    pub fn anchors<'a>(&'a self, arena: &'a CutArena) -> Result<Vec<&'a dyn LoopLike>> {
        let mut out: Vec<&dyn LoopLike> = Vec::with_capacity(self.anchor_count());
        if let Some(head) = &self.existing_head {
            out.push(head);
        }
        for id in &self.cuts {
            out.push(arena.get(*id)?);
        }
        if let Some(tail) = &self.existing_tail {
            out.push(tail);
        }
        Ok(out)
    }

    /// Average distance between consecutive anchor origins.
    pub fn segment_width(&self, arena: &CutArena) -> Result<Option<f64>> {
        let anchors = self.anchors(arena)?;
        if anchors.len() < 2 {
            return Ok(None);
        }
        let total: f64 = anchors
            .windows(2)
            .map(|w| w[0].plane_origin().distance(w[1].plane_origin()))
            .sum();
        Ok(Some(total / (anchors.len() - 1) as f64))
    }

    /// Average arc length of the backbone polylines.
    pub fn average_backbone_length(&self) -> Option<f64> {
        if self.backbone.is_empty() {
            return None;
        }
        let total: f64 = self.backbone.iter().map(|b| path_length(b, false)).sum();
        Some(total / self.backbone.len() as f64)
    }

    fn neighbor_behind(&self, arena: &CutArena, index: usize) -> Result<Option<Neighbor<'_>>> {
        Ok(if index > 0 {
            Some(Neighbor::Cut(arena.shared(self.cuts[index - 1])?))
        } else {
            self.existing_head.as_ref().map(Neighbor::Existing)
        })
    }

    fn neighbor_ahead(&self, arena: &CutArena, index: usize) -> Result<Option<Neighbor<'_>>> {
        Ok(if index + 1 < self.cuts.len() {
            Some(Neighbor::Cut(arena.shared(self.cuts[index + 1])?))
        } else {
            self.existing_tail.as_ref().map(Neighbor::Existing)
        })
    }

    /**
     * Aligns the cut at `index` to its neighbours. Missing neighbours are
     * skipped, so `Between` on the first cut aligns it to the one ahead.
     */
    pub fn align_cut(
        &self,
        arena: &mut CutArena,
        index: usize,
        mode: AlignMode,
        search: &AlignSearch,
    ) -> Result<Option<Alignment>> {
        let id = *self.cuts.get(index).ok_or(Error::IndexOutOfRange(index))?;
        let behind = self.neighbor_behind(arena, index)?;
        let ahead = self.neighbor_ahead(arena, index)?;
        let cut = arena.get_mut(id)?;
        let result = match (mode, behind, ahead) {
            (AlignMode::Direction, Some(n), _) | (AlignMode::Direction, None, Some(n)) => {
                cut.align_to(n.as_loop(), false, search)
            }
            (AlignMode::Between, Some(b), Some(a)) => {
                let first = cut.align_to(b.as_loop(), true, search);
                let second = cut.align_to(a.as_loop(), true, search);
                match (first, second) {
                    (Some(first), Some(second)) => {
                        let n = cut.ring_segments() as f64;
                        let mut delta = second.shift - first.shift;
                        delta -= n * (delta / n).round();
                        let shift = first.shift + 0.5 * delta;
                        cut.simplify(cut.ring_segments(), shift, 0);
                        Some(Alignment {
                            shift: cut.shift(),
                            ..second
                        })
                    }
                    (first, second) => second.or(first),
                }
            }
            (AlignMode::Between | AlignMode::Behind, Some(b), _) => {
                cut.align_to(b.as_loop(), true, search)
            }
            (AlignMode::Between | AlignMode::Ahead, None, Some(a))
            | (AlignMode::Ahead, Some(_), Some(a)) => cut.align_to(a.as_loop(), true, search),
            _ => None,
        };
        Ok(result)
    }

    /// Aligns every cut to the one behind it, front to back.
    pub fn align_all(&mut self, arena: &mut CutArena, search: &AlignSearch) -> Result<()> {
        for i in 0..self.cuts.len() {
            if i > 0 || self.existing_head.is_some() {
                self.align_cut(arena, i, AlignMode::Behind, search)?;
            }
        }
        self.align_tail(arena)
    }

    /// Reorders the existing tail loop to match the last cut.
    fn align_tail(&mut self, arena: &CutArena) -> Result<()> {
        if let (Some(tail), Some(last)) = (self.existing_tail.as_mut(), self.cuts.last()) {
            tail.align_to(arena.get(*last)?);
        }
        Ok(())
    }

    /**
     * Backbone polyline from anchor `a` to anchor `b`. Crawls the surface
     * along the plane that contains the chord between the loops and the
     * surface normal at the start, until the plane of `b` is reached. Falls
     * back to a straight bridge when the crawl fails.
     */
    fn bridge<S: Surface + ?Sized>(
        surface: &S,
        a: &dyn LoopLike,
        b: &dyn LoopLike,
        max_steps: usize,
    ) -> BackboneSegment {
        let pick = |l: &dyn LoopLike| {
            let pts = l.simplified();
            match (l.is_cyclic(), pts.is_empty()) {
                (_, true) => l.plane_origin(),
                (true, false) => pts[0],
                (false, false) => pts[pts.len() / 2],
            }
        };
        let start = pick(a);
        let end = pick(b);
        let fallback = |surface: &S| -> BackboneSegment {
            let end = surface.closest_point(end).map_or(end, |h| h.point);
            Rc::from([start, end])
        };
        let Some(hit) = surface.closest_point(start) else {
            return fallback(surface);
        };
        let cut_normal = hit.normal.cross(end - start);
        if cut_normal.length_squared() < 1e-24 {
            return fallback(surface);
        }
        let stop = Plane::new(b.plane_origin(), b.plane_normal());
        match surface.crawl(hit.face, hit.point, cut_normal, &stop, max_steps) {
            Ok(path) if path.len() > 1 => path.into(),
            Ok(_) => fallback(surface),
            Err(e) => {
                log::warn!("Backbone falls back to a straight bridge: {}", e);
                fallback(surface)
            }
        }
    }

    /// Recomputes every backbone polyline.
    pub fn backbone_from_cuts<S: Surface + ?Sized>(
        &mut self,
        arena: &CutArena,
        surface: &S,
        max_steps: usize,
    ) -> Result<()> {
        let anchors = self.anchors(arena)?;
        let backbone = anchors
            .windows(2)
            .map(|w| Self::bridge(surface, w[0], w[1], max_steps))
            .collect();
        self.backbone = backbone;
        Ok(())
    }

    /// Bridge for gap `gap`, between anchors `gap` and `gap + 1`.
    fn bridge_gap<S: Surface + ?Sized>(
        &self,
        arena: &CutArena,
        surface: &S,
        gap: usize,
        max_steps: usize,
    ) -> Result<BackboneSegment> {
        let anchors = self.anchors(arena)?;
        match (anchors.get(gap), anchors.get(gap + 1)) {
            (Some(a), Some(b)) => Ok(Self::bridge(surface, *a, *b, max_steps)),
            _ => Err(Error::IndexOutOfRange(gap)),
        }
    }

    /// Recomputes the backbone polylines on either side of anchor `anchor`.
    pub fn update_backbone_at<S: Surface + ?Sized>(
        &mut self,
        arena: &CutArena,
        surface: &S,
        anchor: usize,
        max_steps: usize,
    ) -> Result<()> {
        if self.backbone.len() != self.gap_count() {
            return self.backbone_from_cuts(arena, surface, max_steps);
        }
        if anchor > 0 {
            self.backbone[anchor - 1] = self.bridge_gap(arena, surface, anchor - 1, max_steps)?;
        }
        if anchor < self.backbone.len() {
            self.backbone[anchor] = self.bridge_gap(arena, surface, anchor, max_steps)?;
        }
        Ok(())
    }

    /// Re-cuts cut `index` with a new plane normal. If the new plane misses
    /// the surface the cut keeps its previous plane.
    pub(crate) fn recut_with_normal<S: Surface + ?Sized>(
        &self,
        arena: &mut CutArena,
        surface: &S,
        index: usize,
        normal: DVec3,
    ) -> Result<()> {
        let id = *self.cuts.get(index).ok_or(Error::IndexOutOfRange(index))?;
        let cut = arena.get_mut(id)?;
        let placement = cut.placement();
        if let Err(e) = cut.move_plane(surface, placement.plane_point, normal) {
            log::warn!("Keeping the previous plane of cut {}: {}", index, e);
            cut.restore(surface, &placement)?;
        }
        Ok(())
    }

    pub(crate) fn mark_destroyed_if_empty(&mut self) {
        if self.is_empty() {
            self.state = SeriesState::Destroyed;
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use glam::{DVec2, DVec3, dvec2, dvec3};

    use super::{AlignMode, CutSeries};
    use crate::{
        align::LoopLike,
        arena::CutArena,
        config::Settings,
        macros::assert_f64_eq,
        polyline::discrete_curl,
        trisurface::TriSurface,
        view::{OrthoView, View},
    };

    pub(crate) const PIXELS: f64 = 100.0;

    /// Stroke straight across the view, sampled `n` times between the given
    /// world space x coordinates.
    pub(crate) fn straight_stroke(n: usize, from: f64, to: f64, y: f64) -> Vec<DVec2> {
        (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                dvec2(from + (to - from) * t, y) * PIXELS
            })
            .collect()
    }

    pub(crate) fn flat_settings() -> Settings {
        Settings::default()
            .with_segments(4)
            .with_ring_segments(8)
            .with_cull_factor(3)
    }

    pub(crate) fn plane_series(arena: &mut CutArena) -> (TriSurface, CutSeries) {
        let surf = TriSurface::grid_plane(2.0, 8).expect("Cannot create grid");
        let view = OrthoView::top(PIXELS);
        let settings = flat_settings();
        let mut series = CutSeries::from_stroke(
            &surf,
            &view,
            &straight_stroke(10, -0.8, 0.8, 0.1),
            &settings,
        )
        .expect("Cannot ingest stroke");
        series
            .cuts_on_path(arena, &surf, view.view_direction(), &settings)
            .expect("Cannot make cuts");
        (surf, series)
    }

    pub(crate) fn tube_series(arena: &mut CutArena, from: f64, to: f64) -> (TriSurface, CutSeries) {
        let surf = TriSurface::open_cylinder(1.0, 6.0, 24, 12).expect("Cannot create cylinder");
        let view = OrthoView::top(PIXELS);
        let settings = flat_settings();
        let mut series = CutSeries::from_stroke(
            &surf,
            &view,
            &straight_stroke(12, from, to, 0.13),
            &settings,
        )
        .expect("Cannot ingest stroke");
        series
            .cuts_on_path(arena, &surf, view.view_direction(), &settings)
            .expect("Cannot make cuts");
        (surf, series)
    }

    #[test]
    fn t_backbone_gaps() {
        let mut arena = CutArena::default();
        let (_, series) = plane_series(&mut arena);
        assert_eq!(series.cuts().len(), 4);
        assert_eq!(series.backbone().len(), 3);
        assert_eq!(series.gap_count(), 3);
        let anchors = series.anchors(&arena).expect("Cannot list anchors");
        for (segment, pair) in series.backbone().iter().zip(anchors.windows(2)) {
            let end = segment[segment.len() - 1];
            assert_f64_eq!(
                (end - pair[1].plane_origin()).dot(pair[1].plane_normal()),
                0.0,
                1e-9
            );
        }
    }

    #[test]
    fn t_tube_cuts_share_winding() {
        let mut arena = CutArena::default();
        let (_, series) = tube_series(&mut arena, -1.9, 1.9);
        assert_eq!(series.cuts().len(), 4);
        let curls: Vec<f64> = series
            .cuts()
            .iter()
            .map(|id| {
                let cut = arena.get(*id).expect("Cannot access cut");
                assert!(cut.is_cyclic());
                assert_eq!(cut.simplified().len(), 8);
                discrete_curl(cut.simplified(), DVec3::X).expect("Cannot compute curl")
            })
            .collect();
        assert!(curls.iter().all(|c| c * curls[0] > 0.0));
    }

    #[test]
    fn t_align_between() {
        let mut arena = CutArena::default();
        let (_, series) = tube_series(&mut arena, -1.9, 1.9);
        let settings = flat_settings();
        let id = series.cuts()[1];
        arena.get_mut(id).expect("Cannot access cut").shift_by(0.5);
        let alignment = series
            .align_cut(&mut arena, 1, AlignMode::Between, &settings.align)
            .expect("Cannot align")
            .expect("Loops must be aligned");
        assert!(alignment.cost < 0.05);
        let cut = arena.get(id).expect("Cannot access cut");
        let prev = arena.get(series.cuts()[0]).expect("Cannot access cut");
        assert!(cut.simplified()[0].distance(prev.simplified()[0]) < 1.5);
        assert!(
            (cut.simplified()[0] - prev.simplified()[0])
                .normalize()
                .dot(dvec3(1.0, 0.0, 0.0))
                > 0.95
        );
    }

    #[test]
    fn t_segment_width() {
        let mut arena = CutArena::default();
        let (_, series) = plane_series(&mut arena);
        let width = series
            .segment_width(&arena)
            .expect("Cannot measure series")
            .expect("Series has more than one loop");
        assert_f64_eq!(width, 1.6 / 3.0, 1e-6);
        assert!(series.average_backbone_length().is_some());
    }
}
