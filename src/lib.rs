/*!
Contour based retopology. Strokes drawn over a triangulated surface become
ordered series of cross-section loops, and consecutive loops are bridged into
a clean strip of quads.

# Overview

+ A [`CrossSectionCut`] is the loop made by cutting the surface with a plane.
  It keeps the full resolution intersection, and a simplified loop with a
  fixed number of vertices evenly spaced along it. The phase of the
  simplified loop can be shifted continuously.

+ A [`CutSeries`] is an ordered sequence of cuts along a path. Its ends can be
  boundary loops of an existing mesh ([`ExistingLoopAnchor`]). Consecutive
  loops are aligned so that bridging vertex `i` to vertex `i` of the next loop
  does not twist, and are connected by backbone polylines crawled over the
  surface.

+ A [`ContourSession`] owns all series and cuts, turns strokes, placed cuts
  and [`Command`]s into series operations, and keeps an undo history.

+ The [`LoopTransformWidget`] slides and rotates a single loop interactively.

+ The surface and the camera are provided by the host through the
  [`Surface`] and [`View`] traits. [`TriSurface`] and [`OrthoView`] are
  simple implementations of both.

+ [`ContourSession::emit`] produces a [`BridgeMesh`] of quads, with vertices
  welded to the destination mesh through a [`WeldMap`].
*/

mod align;
mod anchor;
mod arena;
mod config;
mod cut;
mod element;
mod emit;
mod error;
mod history;
mod macros;
mod math;
mod obj;
mod polyline;
mod primitive;
mod series;
mod session;
mod surface;
mod trisurface;
mod view;
mod widget;

pub use align::{Alignment, LoopLike};
pub use anchor::ExistingLoopAnchor;
pub use arena::{CutArena, CutId, SeriesId};
pub use config::{AlignSearch, Settings};
pub use cut::{CrossSectionCut, CutPlacement};
pub use element::{FH, Handle};
pub use emit::{BridgeMesh, WeldKey, WeldMap};
pub use error::{Error, Result};
pub use history::Action;
pub use math::{Frame, Plane};
pub use series::{
    AlignMode, BackboneSegment, CutSeries, InsertPath, Insertion, SeriesEnd, SeriesState,
};
pub use session::{Command, ContourSession, Mode, Selection};
pub use surface::{Section, Surface, SurfaceHit};
pub use trisurface::TriSurface;
pub use view::{OrthoView, View};
pub use widget::{LoopTransformWidget, WidgetMode, WidgetState};
