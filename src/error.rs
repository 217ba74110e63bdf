use thiserror::Error;

use crate::{
    arena::{CutId, SeriesId},
    element::FH,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Surface.
    #[error("the cut plane does not intersect the surface")]
    EmptyIntersection,
    #[error("the ray does not hit the surface")]
    Miss,
    #[error("crawl from face {0} did not reach the stop plane")]
    CrawlFailed(FH),
    #[error("the surface has no faces")]
    EmptySurface,
    // Input.
    #[error("stroke rejected: {0}")]
    DegenerateStroke(&'static str),
    #[error("cut line of {0:.1} pixels is too short")]
    CutTooShort(f64),
    #[error("at least 3 segments are required, got {0}")]
    TooFewSegments(usize),
    // Series and session.
    #[error("loops with {0} and {1} vertices cannot be bridged")]
    MismatchedResolution(usize, usize),
    #[error("cut {0:?} does not exist")]
    InvalidCut(CutId),
    #[error("series {0:?} does not exist")]
    InvalidSeries(SeriesId),
    #[error("the series is locked by an existing loop")]
    SeriesLocked,
    #[error("nothing is selected")]
    NothingSelected,
    #[error("index {0} is out of range")]
    IndexOutOfRange(usize),
    // Obj.
    #[error("failed to load obj file: {0}")]
    ObjLoadFailed(String),
    #[error("incorrect number of coordinates: {0}")]
    IncorrectNumberOfCoordinates(usize),
    #[error("incorrect number of triangle indices: {0}")]
    IncorrectIndexCount(usize),
    #[error("vertex index {0} is out of bounds")]
    InvalidVertexIndex(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
