/*!
A contour editing session. The session owns every series and cut, turns
gestures and commands into series operations, and keeps the undo history.

Snapshots share unchanged cuts and series with the live state. Both are
reference counted and copied on the first write, so taking a snapshot costs
a few reference count bumps and undoing an edit only brings back what the
edit touched.
*/

use std::rc::Rc;

use glam::{DVec2, DVec3};
use slotmap::SlotMap;

use crate::{
    anchor::ExistingLoopAnchor,
    arena::{CutArena, CutId, SeriesId},
    config::Settings,
    cut::CrossSectionCut,
    emit::{BridgeMesh, MeshBuilder, WeldMap},
    error::{Error, Result},
    history::{Action, History},
    series::{CutSeries, SeriesEnd, SeriesState, attach_point},
    surface::Surface,
    view::View,
    widget::LoopTransformWidget,
};

/// Screen drags shorter than this are ignored.
const MIN_DRAG: f64 = 5.0;
/// Screen drags shorter than this are too short to orient a cut.
const MIN_CUT_LENGTH: f64 = 20.0;

/// Selection granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Commands act on whole series.
    #[default]
    Guide,
    /// Commands act on single loops.
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub series: Option<SeriesId>,
    pub cut: Option<CutId>,
}

/// Discrete commands from the host's input layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Moves the selected lone loop into a series that accepts it.
    Insert,
    /// Cancels the active widget, or clears the selection.
    Cancel,
    /// Confirms the loop counts of the selected series.
    Confirm,
    /// Deletes the selected loop in loop mode, the selected series otherwise.
    Delete,
    SegmentsUp,
    SegmentsDown,
    RingSegmentsUp,
    RingSegmentsDown,
    /// Nudges the phase of the selected loop in loop mode, of every loop of
    /// the selected series otherwise.
    Shift(f64),
    Align,
    Smooth,
}

#[derive(Debug, Clone)]
struct Snapshot {
    arena: CutArena,
    series: SlotMap<SeriesId, Rc<CutSeries>>,
    selection: Selection,
}

fn series_entry(
    map: &mut SlotMap<SeriesId, Rc<CutSeries>>,
    id: SeriesId,
) -> Result<&mut CutSeries> {
    map.get_mut(id)
        .map(Rc::make_mut)
        .ok_or(Error::InvalidSeries(id))
}

fn is_live(series: &CutSeries) -> bool {
    !matches!(
        series.series_state(),
        SeriesState::MergedAway | SeriesState::Destroyed
    )
}

pub struct ContourSession<S: Surface> {
    surface: S,
    settings: Settings,
    arena: CutArena,
    series: SlotMap<SeriesId, Rc<CutSeries>>,
    selection: Selection,
    mode: Mode,
    history: History<Snapshot>,
    widget: Option<LoopTransformWidget>,
    /// State before the active widget was placed.
    widget_snapshot: Option<Snapshot>,
}

impl<S: Surface> ContourSession<S> {
    pub fn new(surface: S, settings: Settings) -> Self {
        ContourSession {
            surface,
            history: History::new(settings.undo_depth),
            settings,
            arena: CutArena::default(),
            series: SlotMap::with_key(),
            selection: Selection::default(),
            mode: Mode::default(),
            widget: None,
            widget_snapshot: None,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn arena(&self) -> &CutArena {
        &self.arena
    }

    pub fn cut(&self, id: CutId) -> Result<&CrossSectionCut> {
        self.arena.get(id)
    }

    pub fn series(&self, id: SeriesId) -> Result<&CutSeries> {
        self.series
            .get(id)
            .map(|s| s.as_ref())
            .ok_or(Error::InvalidSeries(id))
    }

    pub fn series_ids(&self) -> impl Iterator<Item = SeriesId> + '_ {
        self.series.keys()
    }

    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    /// The series a cut belongs to.
    pub fn series_of(&self, cut: CutId) -> Option<SeriesId> {
        self.series
            .iter()
            .find(|(_, s)| s.contains(cut))
            .map(|(id, _)| id)
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn select_series(&mut self, id: SeriesId) -> Result<()> {
        self.series(id)?;
        self.selection = Selection {
            series: Some(id),
            cut: None,
        };
        Ok(())
    }

    pub fn select_cut(&mut self, id: CutId) -> Result<()> {
        self.arena.get(id)?;
        self.selection = Selection {
            series: self.series_of(id),
            cut: Some(id),
        };
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn undo_len(&self) -> usize {
        self.history.len()
    }

    pub fn widget(&self) -> Option<&LoopTransformWidget> {
        self.widget.as_ref()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            arena: self.arena.clone(),
            series: self.series.clone(),
            selection: self.selection,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.arena = snapshot.arena;
        self.series = snapshot.series;
        self.selection = snapshot.selection;
    }

    /// Runs `f` as one undo step. Nothing is recorded, and the state is rolled
    /// back, if `f` fails.
    fn record<T>(&mut self, action: Action, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.snapshot();
        match f(self) {
            Ok(value) => {
                self.history.push(action, snapshot);
                Ok(value)
            }
            Err(e) => {
                self.restore(snapshot);
                Err(e)
            }
        }
    }

    /// Restores the state before the last recorded action, and returns that
    /// action. Does nothing if there is nothing to undo.
    pub fn undo(&mut self) -> Option<Action> {
        let (action, snapshot) = self.history.pop()?;
        self.widget = None;
        self.widget_snapshot = None;
        self.restore(snapshot);
        log::debug!("Undid {:?}, {} steps left", action, self.history.len());
        Some(action)
    }

    fn selected_series(&self) -> Result<SeriesId> {
        self.selection.series.ok_or(Error::NothingSelected)
    }

    fn selected_cut(&self) -> Result<CutId> {
        self.selection.cut.ok_or(Error::NothingSelected)
    }

    /// Series end whose loop is within snapping distance of `pt`.
    fn snap_target<V: View + ?Sized>(
        &self,
        view: &V,
        pt: DVec3,
    ) -> Result<Option<(SeriesId, SeriesEnd)>> {
        let screen = view.project(pt);
        for (id, series) in &self.series {
            if !is_live(series) {
                continue;
            }
            let width = series.segment_width(&self.arena)?;
            for end in [SeriesEnd::Tail, SeriesEnd::Head] {
                let Some(anchor) = series.end_anchor(&self.arena, end)? else {
                    continue;
                };
                let near = attach_point(anchor, pt);
                let in_world = width.is_some_and(|w| near.distance(pt) <= w);
                let in_screen = match (screen, view.project(near)) {
                    (Some(a), Some(b)) => a.distance(b) <= self.settings.extend_radius,
                    _ => false,
                };
                if in_world || in_screen {
                    return Ok(Some((id, end)));
                }
            }
        }
        Ok(None)
    }

    /**
     * Turns a stroke into loops. A stroke that starts or ends on the end loop
     * of an existing series extends that series. Otherwise it makes a new
     * series.
     *
     * Returns the series the loops were added to. A rejected stroke leaves the
     * session untouched.
     */
    pub fn stroke<V: View + ?Sized>(&mut self, view: &V, stroke: &[DVec2]) -> Result<SeriesId> {
        let mut new = CutSeries::from_stroke(&self.surface, view, stroke, &self.settings)?;
        let ends = [new.path_raw().first(), new.path_raw().last()];
        let mut target = None;
        for pt in ends.into_iter().flatten() {
            target = self.snap_target(view, *pt)?;
            if target.is_some() {
                break;
            }
        }
        let view_dir = view.view_direction();
        match target {
            Some((id, end)) => self.record(Action::Merge, |session| {
                let other = series_entry(&mut session.series, id)?;
                let added = new.snap_merge(
                    other,
                    end,
                    &mut session.arena,
                    &session.surface,
                    view_dir,
                    &session.settings,
                )?;
                log::info!("Stroke extended series {:?} by {} loops", id, added);
                session.selection = Selection {
                    series: Some(id),
                    cut: None,
                };
                Ok(id)
            }),
            None => self.record(Action::Stroke, |session| {
                new.cuts_on_path(&mut session.arena, &session.surface, view_dir, &session.settings)?;
                let count = new.cuts().len();
                let id = session.series.insert(Rc::new(new));
                log::info!("New series {:?} with {} loops", id, count);
                session.selection = Selection {
                    series: Some(id),
                    cut: None,
                };
                Ok(id)
            }),
        }
    }

    /**
     * Places a single loop from a screen drag. The cut plane contains the
     * drag and the view direction, and passes through the surface under the
     * middle of the drag. The loop goes into the first series that accepts it,
     * or into a new series of its own.
     *
     * Drags too short to be deliberate are ignored.
     */
    pub fn place_cut<V: View + ?Sized>(
        &mut self,
        view: &V,
        a: DVec2,
        b: DVec2,
    ) -> Result<Option<CutId>> {
        let length = a.distance(b);
        if length < MIN_DRAG {
            return Ok(None);
        }
        if length < MIN_CUT_LENGTH {
            return Err(Error::CutTooShort(length));
        }
        let (origin, dir) = view.ray((a + b) * 0.5);
        let hit = self.surface.raycast(origin, dir).ok_or(Error::Miss)?;
        let line = view.unproject(b, hit.point) - view.unproject(a, hit.point);
        let normal = line
            .cross(view.view_direction())
            .try_normalize()
            .ok_or(Error::CutTooShort(length))?;
        let mut cut = CrossSectionCut::new(hit.point, normal);
        cut.cut(&self.surface, hit.point, normal, hit.face)?;
        cut.simplify(self.settings.ring_segments, 0.0, 0);
        self.record(Action::PlaceCut, |session| {
            let id = session.arena.insert(cut);
            let series = match session.insert_into_any(id, None)? {
                Some(sid) => sid,
                None => {
                    let mut lone = CutSeries::new(session.settings.ring_segments);
                    lone.insert(&mut session.arena, &session.surface, id, &session.settings)?;
                    let sid = session.series.insert(Rc::new(lone));
                    log::info!("New series {:?} from a single loop", sid);
                    sid
                }
            };
            session.selection = Selection {
                series: Some(series),
                cut: Some(id),
            };
            Ok(Some(id))
        })
    }

    /// Inserts the cut into the first live series, other than `skip`, that
    /// accepts it.
    fn insert_into_any(&mut self, id: CutId, skip: Option<SeriesId>) -> Result<Option<SeriesId>> {
        let candidates: Vec<SeriesId> = self
            .series
            .iter()
            .filter(|(sid, s)| Some(*sid) != skip && is_live(s) && !s.is_empty())
            .map(|(sid, _)| sid)
            .collect();
        for sid in candidates {
            let series = series_entry(&mut self.series, sid)?;
            if series
                .insert(&mut self.arena, &self.surface, id, &self.settings)?
                .is_some()
            {
                return Ok(Some(sid));
            }
        }
        Ok(None)
    }

    /// Starts a series on a boundary loop of the destination mesh.
    pub fn add_existing_loop(
        &mut self,
        points: Vec<DVec3>,
        ids: Vec<u32>,
        cyclic: bool,
    ) -> Result<SeriesId> {
        let anchor = ExistingLoopAnchor::new(points, ids, cyclic)?;
        self.record(Action::AddExisting, |session| {
            let id = session
                .series
                .insert(Rc::new(CutSeries::from_existing(anchor)));
            session.selection = Selection {
                series: Some(id),
                cut: None,
            };
            Ok(id)
        })
    }

    /// Runs a command. Returns whether anything changed.
    pub fn execute<V: View + ?Sized>(&mut self, command: Command, view: &V) -> Result<bool> {
        let view_dir = view.view_direction();
        match command {
            Command::Insert => self.insert_selected(),
            Command::Cancel => {
                if self.widget.as_ref().is_some_and(|w| w.is_active()) {
                    self.widget_cancel()?;
                } else {
                    self.selection = Selection::default();
                }
                Ok(true)
            }
            Command::Confirm => self.record(Action::Confirm, |session| {
                let id = session.selected_series()?;
                series_entry(&mut session.series, id)?.confirm();
                Ok(true)
            }),
            Command::Delete => self.delete_selected(),
            Command::SegmentsUp | Command::SegmentsDown => {
                self.record(Action::PathSegments, |session| {
                    let id = session.selected_series()?;
                    let series = series_entry(&mut session.series, id)?;
                    let count = match command {
                        Command::SegmentsUp => series.segment_count() + 1,
                        _ => series.segment_count().saturating_sub(1),
                    };
                    series.change_segments(
                        &mut session.arena,
                        &session.surface,
                        view_dir,
                        count,
                        &session.settings,
                    )?;
                    session.selection.cut = None;
                    Ok(true)
                })
            }
            Command::RingSegmentsUp | Command::RingSegmentsDown => {
                self.record(Action::RingSegments, |session| {
                    let id = session.selected_series()?;
                    let series = series_entry(&mut session.series, id)?;
                    let count = match command {
                        Command::RingSegmentsUp => series.ring_segment_count() + 1,
                        _ => series.ring_segment_count().saturating_sub(1),
                    };
                    series.change_ring_segments(
                        &mut session.arena,
                        &session.surface,
                        count,
                        &session.settings,
                    )?;
                    Ok(true)
                })
            }
            Command::Shift(delta) => match self.mode {
                Mode::Loop => self.record(Action::LoopShift, |session| {
                    let id = session.selected_cut()?;
                    session.arena.get_mut(id)?.shift_by(delta);
                    Ok(true)
                }),
                Mode::Guide => self.record(Action::PathShift, |session| {
                    let id = session.selected_series()?;
                    let series = session.series.get(id).ok_or(Error::InvalidSeries(id))?;
                    series.shift_all(&mut session.arena, delta)?;
                    Ok(true)
                }),
            },
            Command::Align => self.record(Action::Align, |session| {
                let id = session.selected_series()?;
                let series = series_entry(&mut session.series, id)?;
                series.align_all(&mut session.arena, &session.settings.align)?;
                Ok(true)
            }),
            Command::Smooth => self.record(Action::Smooth, |session| {
                let id = session.selected_series()?;
                let series = series_entry(&mut session.series, id)?;
                let iterations = session.settings.smooth_factor;
                series.smooth_normals_com(
                    &mut session.arena,
                    &session.surface,
                    iterations,
                    &session.settings,
                )?;
                Ok(true)
            }),
        }
    }

    /// Moves the selected loop out of its own single loop series into
    /// another series.
    fn insert_selected(&mut self) -> Result<bool> {
        let cut = self.selected_cut()?;
        let from = self.series_of(cut).ok_or(Error::InvalidCut(cut))?;
        let lone = self.series(from)?;
        if lone.cuts().len() != 1 || lone.anchor_count() != 1 {
            log::info!("Only a loop on its own can be inserted into another series");
            return Ok(false);
        }
        self.record(Action::Insert, |session| {
            let Some(into) = session.insert_into_any(cut, Some(from))? else {
                log::info!("No series accepts the loop");
                return Ok(false);
            };
            session.series.remove(from);
            session.selection = Selection {
                series: Some(into),
                cut: Some(cut),
            };
            Ok(true)
        })
    }

    fn delete_selected(&mut self) -> Result<bool> {
        match (self.mode, self.selection.cut) {
            (Mode::Loop, Some(cut)) => self.record(Action::Delete, |session| {
                let id = session.series_of(cut).ok_or(Error::InvalidCut(cut))?;
                let series = series_entry(&mut session.series, id)?;
                series.remove(&mut session.arena, &session.surface, cut, &session.settings)?;
                let destroyed = series.series_state() == SeriesState::Destroyed;
                if destroyed {
                    session.series.remove(id);
                }
                session.selection = Selection {
                    series: (!destroyed).then_some(id),
                    cut: None,
                };
                Ok(true)
            }),
            _ => self.record(Action::Delete, |session| {
                let id = session.selected_series()?;
                let series = session.series.remove(id).ok_or(Error::InvalidSeries(id))?;
                for cut in series.cuts() {
                    session.arena.remove(*cut)?;
                }
                session.selection = Selection::default();
                Ok(true)
            }),
        }
    }

    /// Emits one mesh for every series with at least two loops. Vertices
    /// shared between series are emitted once.
    pub fn emit(&self, weld: &WeldMap) -> Result<BridgeMesh> {
        let mut builder = MeshBuilder::new(weld);
        for series in self.series.values() {
            if is_live(series) && series.anchor_count() > 1 {
                series.emit_into(&self.arena, &mut builder)?;
            }
        }
        Ok(builder.finish())
    }

    /// Replaces the widget. A widget that is still active keeps its loop
    /// where it is, as its own undo step.
    fn begin_widget(&mut self, widget: LoopTransformWidget) {
        if self.widget.is_some() {
            self.widget_commit();
        }
        self.widget_snapshot = Some(self.snapshot());
        self.widget = Some(widget);
    }

    /// Places the transform widget on a loop.
    pub fn widget_place<V: View + ?Sized>(&mut self, view: &V, cut: CutId) -> Result<()> {
        let series = self.series_of(cut).map(|id| self.series[id].as_ref());
        let widget = LoopTransformWidget::new(cut, &self.arena, series, view, &self.settings)?;
        self.begin_widget(widget);
        Ok(())
    }

    /// Starts sliding a loop from the pointer position.
    pub fn widget_grab<V: View + ?Sized>(
        &mut self,
        view: &V,
        cut: CutId,
        pointer: DVec2,
    ) -> Result<()> {
        let series = self.series_of(cut).map(|id| self.series[id].as_ref());
        let widget =
            LoopTransformWidget::grab(cut, pointer, &self.arena, series, view, &self.settings)?;
        self.begin_widget(widget);
        Ok(())
    }

    /// Starts rotating a loop about the view direction.
    pub fn widget_rotate<V: View + ?Sized>(
        &mut self,
        view: &V,
        cut: CutId,
        pointer: DVec2,
    ) -> Result<()> {
        let series = self.series_of(cut).map(|id| self.series[id].as_ref());
        let widget =
            LoopTransformWidget::rotate(cut, pointer, &self.arena, series, view, &self.settings)?;
        self.begin_widget(widget);
        Ok(())
    }

    pub fn widget_move<V: View + ?Sized>(&mut self, view: &V, pointer: DVec2) -> Result<()> {
        let Some(widget) = self.widget.as_mut() else {
            return Ok(());
        };
        let series = self
            .series
            .iter()
            .find(|(_, s)| s.contains(widget.cut()))
            .map(|(id, _)| id);
        let series = match series {
            Some(id) => Some(series_entry(&mut self.series, id)?),
            None => None,
        };
        widget.pointer_move(
            pointer,
            &mut self.arena,
            series,
            &self.surface,
            view,
            &self.settings,
        )
    }

    /// Keeps the transformed loop, as one undo step.
    pub fn widget_commit(&mut self) {
        if let Some(mut widget) = self.widget.take() {
            widget.commit();
        }
        if let Some(snapshot) = self.widget_snapshot.take() {
            self.history.push(Action::Transform, snapshot);
        }
    }

    pub fn widget_cancel(&mut self) -> Result<()> {
        self.widget_snapshot = None;
        let Some(mut widget) = self.widget.take() else {
            return Ok(());
        };
        let series = self.series_of(widget.cut());
        let series = match series {
            Some(id) => Some(series_entry(&mut self.series, id)?),
            None => None,
        };
        widget.cancel(&mut self.arena, series, &self.surface, &self.settings)
    }
}
