/// Bounds and budget of the continuous phase search used when aligning loops.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignSearch {
    pub iterations: usize,
    /// Lower bound of the phase interval, in segments.
    pub lower: f64,
    /// Upper bound of the phase interval, in segments.
    pub upper: f64,
}

impl Default for AlignSearch {
    fn default() -> Self {
        AlignSearch {
            iterations: 20,
            lower: -1.0,
            upper: 1.0,
        }
    }
}

/**
 * Tunables of a contour session.
 *
 * Distances suffixed with `radius` are in screen pixels. Factors are
 * dimensionless.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    /// Vertices per loop.
    pub ring_segments: usize,
    /// Loops generated along a new stroke.
    pub segments: usize,
    /// Keep one in this many stroke samples.
    pub cull_factor: usize,
    /// Relaxation passes applied to a new stroke.
    pub smooth_factor: usize,
    /// Knot tolerance is the stroke bounding box diagonal divided by this.
    pub feature_factor: f64,
    /// Multiplier on the loop size within which a lone loop accepts a
    /// neighbour, and on the spacing within which a series can be extended.
    pub search_factor: f64,
    pub undo_depth: usize,
    pub widget_radius: f64,
    /// Dead zone of the transform widget.
    pub widget_radius_inner: f64,
    /// Screen distance within which a stroke snaps onto an existing loop.
    pub extend_radius: f64,
    /// Step budget of a single backbone crawl.
    pub crawl_steps: usize,
    pub min_stroke_points: usize,
    pub align: AlignSearch,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ring_segments: 10,
            segments: 10,
            cull_factor: 4,
            smooth_factor: 5,
            feature_factor: 4.0,
            search_factor: 5.0,
            undo_depth: 15,
            widget_radius: 25.0,
            widget_radius_inner: 10.0,
            extend_radius: 20.0,
            crawl_steps: 10_000,
            min_stroke_points: 10,
            align: AlignSearch::default(),
        }
    }
}

impl Settings {
    pub fn with_ring_segments(mut self, n: usize) -> Self {
        self.ring_segments = n;
        self
    }

    pub fn with_segments(mut self, n: usize) -> Self {
        self.segments = n;
        self
    }

    pub fn with_cull_factor(mut self, k: usize) -> Self {
        self.cull_factor = k;
        self
    }

    pub fn with_smooth_factor(mut self, k: usize) -> Self {
        self.smooth_factor = k;
        self
    }

    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth;
        self
    }

    pub fn with_align_search(mut self, search: AlignSearch) -> Self {
        self.align = search;
        self
    }
}
