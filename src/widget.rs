/*!
Interactive transform of a single loop. The widget sits at the screen position
of the loop's origin. Dragging the pointer out of the dead zone in the middle
engages it, and the direction of the pointer picks whether the loop slides
towards a neighbour or rotates. Every pointer move re-cuts the surface and
re-aligns the loop, and cancelling puts the loop back exactly as it was.
*/

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use glam::{DQuat, DVec2, DVec3};

use crate::{
    arena::{CutArena, CutId},
    config::Settings,
    cut::CrossSectionCut,
    error::{Error, Result},
    math::EPS,
    polyline::intersect_plane,
    series::{AlignMode, CutSeries},
    surface::Surface,
    view::View,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetMode {
    /// Slide the loop towards the loop behind or ahead of it.
    EdgeSlide,
    /// Rotate the plane about the view direction.
    RotateView,
    /// Rotate the plane about the axis perpendicular to both the view
    /// direction and the plane normal.
    RotateViewPerpendicular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Idle,
    Engaged(WidgetMode),
    Committed,
    Cancelled,
}

/// A neighbouring loop the widget can slide towards.
#[derive(Debug, Clone, Copy)]
struct Neighbour {
    origin: DVec3,
    normal: DVec3,
    /// Screen vector from the widget center to the neighbour's origin.
    screen: DVec2,
}

#[derive(Debug, Clone)]
pub struct LoopTransformWidget {
    cut: CutId,
    state: WidgetState,
    /// The loop as it was before the widget touched it.
    original: CrossSectionCut,
    center: DVec2,
    /// Screen space angle of the loop normal, less a quarter turn.
    angle: f64,
    /// Screen length of a unit step along the loop normal.
    normal_pixels: f64,
    radius: f64,
    inner: f64,
    /// Started from a hotkey, so there is no dead zone.
    hotkey: bool,
    engage_pointer: DVec2,
    engage_angle: f64,
    behind: Option<Neighbour>,
    ahead: Option<Neighbour>,
}

fn screen_angle(v: DVec2) -> f64 {
    v.y.atan2(v.x)
}

fn wrap_angle(a: f64) -> f64 {
    let a = a.rem_euclid(TAU);
    if a > PI { a - TAU } else { a }
}

/// Mode picked by the angle of the pointer relative to the widget axis.
fn mode_for(relative: f64) -> WidgetMode {
    let a = relative.rem_euclid(TAU);
    if (FRAC_PI_4..3.0 * FRAC_PI_4).contains(&a) || (5.0 * FRAC_PI_4..7.0 * FRAC_PI_4).contains(&a)
    {
        WidgetMode::EdgeSlide
    } else if (3.0 * FRAC_PI_4..5.0 * FRAC_PI_4).contains(&a) {
        WidgetMode::RotateView
    } else {
        WidgetMode::RotateViewPerpendicular
    }
}

impl LoopTransformWidget {
    /// Places an idle widget on the cut. `series` is the series the cut
    /// belongs to, if any.
    pub fn new<V: View + ?Sized>(
        cut: CutId,
        arena: &CutArena,
        series: Option<&CutSeries>,
        view: &V,
        settings: &Settings,
    ) -> Result<Self> {
        let original = arena.get(cut)?.clone();
        let origin = original.origin();
        let center = view.project(origin).ok_or(Error::Miss)?;
        let tip = view
            .project(origin + original.plane_normal())
            .ok_or(Error::Miss)?;
        let (behind, ahead) = match series {
            Some(series) => Self::neighbours(series, arena, cut, center, view)?,
            None => (None, None),
        };
        Ok(LoopTransformWidget {
            cut,
            state: WidgetState::Idle,
            original,
            center,
            angle: screen_angle(tip - center) - FRAC_PI_2,
            normal_pixels: tip.distance(center),
            radius: settings.widget_radius.max(EPS),
            inner: settings.widget_radius_inner,
            hotkey: false,
            engage_pointer: center,
            engage_angle: 0.0,
            behind,
            ahead,
        })
    }

    /// Starts sliding the cut right away, from the given pointer position.
    pub fn grab<V: View + ?Sized>(
        cut: CutId,
        pointer: DVec2,
        arena: &CutArena,
        series: Option<&CutSeries>,
        view: &V,
        settings: &Settings,
    ) -> Result<Self> {
        Self::from_hotkey(cut, pointer, WidgetMode::EdgeSlide, arena, series, view, settings)
    }

    /// Starts rotating the cut about the view direction right away.
    pub fn rotate<V: View + ?Sized>(
        cut: CutId,
        pointer: DVec2,
        arena: &CutArena,
        series: Option<&CutSeries>,
        view: &V,
        settings: &Settings,
    ) -> Result<Self> {
        Self::from_hotkey(cut, pointer, WidgetMode::RotateView, arena, series, view, settings)
    }

    fn from_hotkey<V: View + ?Sized>(
        cut: CutId,
        pointer: DVec2,
        mode: WidgetMode,
        arena: &CutArena,
        series: Option<&CutSeries>,
        view: &V,
        settings: &Settings,
    ) -> Result<Self> {
        let mut widget = Self::new(cut, arena, series, view, settings)?;
        widget.hotkey = true;
        widget.inner = 0.0;
        widget.engage(pointer, mode);
        Ok(widget)
    }

    /// Loops behind and ahead of the cut, skipping any that are off screen.
    fn neighbours<V: View + ?Sized>(
        series: &CutSeries,
        arena: &CutArena,
        cut: CutId,
        center: DVec2,
        view: &V,
    ) -> Result<(Option<Neighbour>, Option<Neighbour>)> {
        let Some(index) = series.position(cut) else {
            return Ok((None, None));
        };
        let anchors = series.anchors(arena)?;
        let p = index + series.existing_head().is_some() as usize;
        let pick = |i: usize| {
            let anchor = anchors.get(i)?;
            let origin = anchor.plane_origin();
            let screen = view.project(origin)? - center;
            (screen.length() > EPS).then_some(Neighbour {
                origin,
                normal: anchor.plane_normal(),
                screen,
            })
        };
        Ok((p.checked_sub(1).and_then(pick), pick(p + 1)))
    }

    pub fn cut(&self) -> CutId {
        self.cut
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }

    pub fn center(&self) -> DVec2 {
        self.center
    }

    /// Outer radius of the widget in pixels, for drawing.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, WidgetState::Idle | WidgetState::Engaged(_))
    }

    fn engage(&mut self, pointer: DVec2, mode: WidgetMode) {
        self.engage_pointer = pointer;
        self.engage_angle = screen_angle(pointer - self.center);
        self.state = WidgetState::Engaged(mode);
        log::debug!("Widget engaged in {:?} mode", mode);
    }

    /// Screen direction of the loop normal.
    fn slide_axis(&self) -> DVec2 {
        let a = self.angle + FRAC_PI_2;
        DVec2::new(a.cos(), a.sin())
    }

    /// Pointer offset that drives a slide. Outside hotkey mode the dead zone
    /// is taken off its length.
    fn slide_offset(&self, pointer: DVec2) -> DVec2 {
        if self.hotkey {
            return pointer - self.engage_pointer;
        }
        let m = pointer - self.center;
        let d = m.length();
        if d > EPS { m * ((d - self.inner) / d) } else { DVec2::ZERO }
    }

    /// Neighbour the pointer drags towards, and the fraction of the way to
    /// it, so the loop follows the pointer on screen.
    fn slide_target(&self, m: DVec2) -> Option<(Neighbour, f64)> {
        [self.ahead, self.behind].into_iter().flatten().find_map(|n| {
            let along = m.dot(n.screen) / n.screen.length_squared();
            (along > 0.0).then_some((n, along.min(1.0)))
        })
    }

    /// Plane the pointer asks for, as `(point, normal)`.
    fn target_plane<V: View + ?Sized>(
        &self,
        mode: WidgetMode,
        pointer: DVec2,
        view: &V,
    ) -> (DVec3, DVec3) {
        let p0 = self.original.plane_point();
        let n0 = self.original.plane_normal();
        match mode {
            WidgetMode::EdgeSlide => {
                let m = self.slide_offset(pointer);
                match self.slide_target(m) {
                    Some((n, s)) => {
                        let offset = (n.origin - self.original.origin()) * s;
                        let normal = if n.normal.dot(n0) < 0.0 { -n.normal } else { n.normal };
                        let turn = DQuat::IDENTITY.slerp(DQuat::from_rotation_arc(n0, normal), s);
                        (p0 + offset, turn * n0)
                    }
                    None if self.normal_pixels > EPS => {
                        // Nothing to slide towards, so follow the normal.
                        let t = m.dot(self.slide_axis()) / self.normal_pixels;
                        (p0 + n0 * t, n0)
                    }
                    None => (p0, n0),
                }
            }
            WidgetMode::RotateView | WidgetMode::RotateViewPerpendicular => {
                let theta = wrap_angle(screen_angle(pointer - self.center) - self.engage_angle);
                let view_dir = view.view_direction();
                let axis = match mode {
                    WidgetMode::RotateView => view_dir,
                    _ => n0.cross(view_dir).try_normalize().unwrap_or(view_dir),
                };
                (p0, DQuat::from_axis_angle(axis.normalize(), theta) * n0)
            }
        }
    }

    /// Where the new plane crosses the backbone, nearest to `candidate`.
    fn on_backbone(series: Option<&CutSeries>, point: DVec3, normal: DVec3) -> Option<DVec3> {
        let plane = crate::math::Plane::new(point, normal);
        series?
            .backbone()
            .iter()
            .filter_map(|segment| intersect_plane(segment, &plane))
            .min_by(|a, b| {
                a.distance_squared(point)
                    .total_cmp(&b.distance_squared(point))
            })
    }

    /**
     * Handles a pointer move. An idle widget engages once the pointer leaves
     * the dead zone. An engaged widget moves the loop, or returns to idle and
     * puts the loop back if the pointer re-enters the dead zone.
     */
    pub fn pointer_move<S: Surface + ?Sized, V: View + ?Sized>(
        &mut self,
        pointer: DVec2,
        arena: &mut CutArena,
        mut series: Option<&mut CutSeries>,
        surface: &S,
        view: &V,
        settings: &Settings,
    ) -> Result<()> {
        let m = pointer - self.center;
        let mode = match self.state {
            WidgetState::Idle => {
                if m.length() <= self.inner {
                    return Ok(());
                }
                let mode = mode_for(screen_angle(m) - self.angle);
                self.engage(pointer, mode);
                mode
            }
            WidgetState::Engaged(_) if !self.hotkey && m.length() <= self.inner => {
                self.revert(arena, series, surface, settings)?;
                self.state = WidgetState::Idle;
                return Ok(());
            }
            WidgetState::Engaged(mode) => mode,
            WidgetState::Committed | WidgetState::Cancelled => return Ok(()),
        };
        let (point, normal) = self.target_plane(mode, pointer, view);
        let point = Self::on_backbone(series.as_deref(), point, normal).unwrap_or(point);
        let cut = arena.get_mut(self.cut)?;
        let before = cut.clone();
        if let Err(e) = cut.move_plane(surface, point, normal) {
            log::warn!("Widget keeps the last plane that cut the surface: {}", e);
            *cut = before;
            return Ok(());
        }
        if let Some(series) = series.as_deref_mut() {
            self.refresh_series(arena, series, surface, settings)?;
        }
        Ok(())
    }

    fn refresh_series<S: Surface + ?Sized>(
        &self,
        arena: &mut CutArena,
        series: &mut CutSeries,
        surface: &S,
        settings: &Settings,
    ) -> Result<()> {
        if let Some(index) = series.position(self.cut) {
            series.align_cut(arena, index, AlignMode::Between, &settings.align)?;
            let anchor = index + series.existing_head().is_some() as usize;
            series.update_backbone_at(arena, surface, anchor, settings.crawl_steps)?;
        }
        Ok(())
    }

    fn revert<S: Surface + ?Sized>(
        &self,
        arena: &mut CutArena,
        series: Option<&mut CutSeries>,
        surface: &S,
        settings: &Settings,
    ) -> Result<()> {
        *arena.get_mut(self.cut)? = self.original.clone();
        if let Some(series) = series {
            if let Some(index) = series.position(self.cut) {
                let anchor = index + series.existing_head().is_some() as usize;
                series.update_backbone_at(arena, surface, anchor, settings.crawl_steps)?;
            }
        }
        Ok(())
    }

    /// Keeps the loop where it is.
    pub fn commit(&mut self) {
        if self.is_active() {
            self.state = WidgetState::Committed;
        }
    }

    /// Puts the loop back exactly as it was before the widget was placed.
    pub fn cancel<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        series: Option<&mut CutSeries>,
        surface: &S,
        settings: &Settings,
    ) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        self.revert(arena, series, surface, settings)?;
        self.state = WidgetState::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use glam::{DVec2, DVec3, dvec2, dvec3};

    use super::{LoopTransformWidget, WidgetMode, WidgetState, mode_for};
    use crate::{
        align::LoopLike,
        arena::CutArena,
        cut::CrossSectionCut,
        macros::assert_f64_eq,
        series::test::{PIXELS, flat_settings, tube_series},
        trisurface::TriSurface,
        view::OrthoView,
    };

    #[test]
    fn t_mode_for() {
        use std::f64::consts::PI;
        assert_eq!(mode_for(0.0), WidgetMode::RotateViewPerpendicular);
        assert_eq!(mode_for(0.5 * PI), WidgetMode::EdgeSlide);
        assert_eq!(mode_for(-0.5 * PI), WidgetMode::EdgeSlide);
        assert_eq!(mode_for(PI), WidgetMode::RotateView);
        assert_eq!(mode_for(1.9 * PI), WidgetMode::RotateViewPerpendicular);
    }

    #[test]
    fn t_pointer_picks_mode() {
        // The loops are cut across the X axis, so their normals point right
        // on screen.
        let cases = [
            (dvec2(30.0, 0.0), WidgetMode::EdgeSlide),
            (dvec2(-30.0, 0.0), WidgetMode::EdgeSlide),
            (dvec2(0.0, 30.0), WidgetMode::RotateView),
            (dvec2(0.0, -30.0), WidgetMode::RotateViewPerpendicular),
        ];
        for (offset, mode) in cases {
            let mut arena = CutArena::default();
            let (surf, mut series) = tube_series(&mut arena, -1.9, 1.9);
            let view = OrthoView::top(PIXELS);
            let settings = flat_settings();
            let id = series.cuts()[1];
            let mut widget = LoopTransformWidget::new(id, &arena, Some(&series), &view, &settings)
                .expect("Cannot place widget");
            let center = widget.center();
            widget
                .pointer_move(
                    center + offset,
                    &mut arena,
                    Some(&mut series),
                    &surf,
                    &view,
                    &settings,
                )
                .expect("Cannot move pointer");
            assert_eq!(widget.state(), WidgetState::Engaged(mode));
        }
    }

    #[test]
    fn t_cancel_edge_slide() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -1.9, 1.9);
        let view = OrthoView::top(PIXELS);
        let settings = flat_settings();
        let id = series.cuts()[1];
        let before = arena.get(id).expect("Cannot access cut").clone();
        let backbone = series.backbone().to_vec();
        let mut widget = LoopTransformWidget::new(id, &arena, Some(&series), &view, &settings)
            .expect("Cannot place widget");
        assert_eq!(widget.state(), WidgetState::Idle);
        let center = widget.center();
        widget
            .pointer_move(
                center + dvec2(30.0, 0.0),
                &mut arena,
                Some(&mut series),
                &surf,
                &view,
                &settings,
            )
            .expect("Cannot move pointer");
        assert_eq!(widget.state(), WidgetState::Engaged(WidgetMode::EdgeSlide));
        // Outside the dead zone the loop follows the pointer on screen.
        widget
            .pointer_move(
                center + dvec2(40.0, 0.0),
                &mut arena,
                Some(&mut series),
                &surf,
                &view,
                &settings,
            )
            .expect("Cannot move pointer");
        let moved = arena.get(id).expect("Cannot access cut");
        let travel = (40.0 - settings.widget_radius_inner) / PIXELS;
        assert_f64_eq!(moved.origin().x, before.origin().x + travel, 1e-6);
        // Dragging past the neighbour stops on it.
        widget
            .pointer_move(
                center + dvec2(900.0, 0.0),
                &mut arena,
                Some(&mut series),
                &surf,
                &view,
                &settings,
            )
            .expect("Cannot move pointer");
        let moved = arena.get(id).expect("Cannot access cut");
        let ahead = arena.get(series.cuts()[2]).expect("Cannot access cut");
        assert_f64_eq!(moved.origin().x, ahead.origin().x, 1e-6);
        widget
            .cancel(&mut arena, Some(&mut series), &surf, &settings)
            .expect("Cannot cancel");
        assert_eq!(widget.state(), WidgetState::Cancelled);
        let after = arena.get(id).expect("Cannot access cut");
        assert_eq!(after.plane_point(), before.plane_point());
        assert_eq!(after.plane_normal(), before.plane_normal());
        assert_eq!(after.shift(), before.shift());
        assert_eq!(after.frame(), before.frame());
        assert_eq!(after, &before);
        assert_eq!(series.backbone().len(), backbone.len());
        for (a, b) in series.backbone().iter().zip(&backbone) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn t_dead_zone_reverts() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -1.9, 1.9);
        let view = OrthoView::top(PIXELS);
        let settings = flat_settings();
        let id = series.cuts()[2];
        let before = arena.get(id).expect("Cannot access cut").clone();
        let mut widget = LoopTransformWidget::new(id, &arena, Some(&series), &view, &settings)
            .expect("Cannot place widget");
        let center = widget.center();
        for offset in [dvec2(-5.0, 0.0), dvec2(-30.0, 0.0), dvec2(-4.0, 0.0)] {
            widget
                .pointer_move(
                    center + offset,
                    &mut arena,
                    Some(&mut series),
                    &surf,
                    &view,
                    &settings,
                )
                .expect("Cannot move pointer");
        }
        assert_eq!(widget.state(), WidgetState::Idle);
        assert_eq!(arena.get(id).expect("Cannot access cut"), &before);
    }

    #[test]
    fn t_rotate_view() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -1.9, 1.9);
        let view = OrthoView::top(PIXELS);
        let settings = flat_settings();
        let id = series.cuts()[1];
        let mut widget = LoopTransformWidget::new(id, &arena, Some(&series), &view, &settings)
            .expect("Cannot place widget");
        let center = widget.center();
        for offset in [dvec2(0.0, 30.0), dvec2(-8.0, 30.0)] {
            widget
                .pointer_move(
                    center + offset,
                    &mut arena,
                    Some(&mut series),
                    &surf,
                    &view,
                    &settings,
                )
                .expect("Cannot move pointer");
        }
        assert_eq!(widget.state(), WidgetState::Engaged(WidgetMode::RotateView));
        let cut = arena.get(id).expect("Cannot access cut");
        // Rotating about the view direction keeps the normal horizontal.
        assert!(cut.plane_normal().z.abs() < 1e-9);
        assert!(cut.plane_normal().y.abs() > 0.1);
        assert!(cut.is_cyclic());
        widget.commit();
        assert_eq!(widget.state(), WidgetState::Committed);
        widget.commit();
        assert_eq!(widget.state(), WidgetState::Committed);
    }

    #[test]
    fn t_grab_without_neighbours() {
        let surf = TriSurface::open_cylinder(1.0, 6.0, 24, 12).expect("Cannot create cylinder");
        let view = OrthoView::top(PIXELS);
        let settings = flat_settings();
        let mut arena = CutArena::default();
        let id = arena.insert(
            CrossSectionCut::on_surface(&surf, dvec3(0.1, 0.0, 1.0), DVec3::X, 8)
                .expect("Cannot cut tube"),
        );
        let start = DVec2::new(10.0, 0.0);
        let mut widget = LoopTransformWidget::grab(id, start, &arena, None, &view, &settings)
            .expect("Cannot grab cut");
        assert_eq!(widget.state(), WidgetState::Engaged(WidgetMode::EdgeSlide));
        // With nothing to slide towards the loop follows its normal, which
        // points right on screen. Moving up does nothing.
        widget
            .pointer_move(start + dvec2(0.0, 40.0), &mut arena, None, &surf, &view, &settings)
            .expect("Cannot move pointer");
        let cut = arena.get(id).expect("Cannot access cut");
        assert_f64_eq!(cut.plane_point().x, 0.1, 1e-9);
        widget
            .pointer_move(start + dvec2(125.0, 0.0), &mut arena, None, &surf, &view, &settings)
            .expect("Cannot move pointer");
        let cut = arena.get(id).expect("Cannot access cut");
        assert_f64_eq!(cut.plane_point().x, 1.35, 1e-9);
        assert_eq!(cut.plane_normal(), DVec3::X);
        assert!(cut.plane_origin().x > 1.0);
    }
}
