/*!
Quad strips bridging the loops of a series, handed to the host's mesh
stitcher. Vertices at the same rounded position are emitted once, and those
that land on vertices of the destination mesh are welded to them.
*/

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::DVec3;

use crate::{
    arena::CutArena,
    error::{Error, Result},
    series::CutSeries,
};

/// Position rounded to a fixed grid, used to detect coincident vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeldKey([i64; 3]);

impl WeldKey {
    /// Grid cells per unit length.
    pub const RESOLUTION: f64 = 1e3;

    pub fn of(pt: DVec3) -> Self {
        let q = (pt * Self::RESOLUTION).round();
        WeldKey([q.x as i64, q.y as i64, q.z as i64])
    }
}

/// Vertices of the destination mesh that emitted vertices weld to.
#[derive(Debug, Clone, Default)]
pub struct WeldMap {
    ids: HashMap<WeldKey, u32>,
}

impl WeldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every vertex of a mesh, identified by its index.
    pub fn from_vertices(positions: &[DVec3]) -> Self {
        let mut map = Self::new();
        for (i, p) in positions.iter().enumerate() {
            map.insert(*p, i as u32);
        }
        map
    }

    pub fn insert(&mut self, pt: DVec3, id: u32) -> Option<u32> {
        self.ids.insert(WeldKey::of(pt), id)
    }

    pub fn get(&self, pt: DVec3) -> Option<u32> {
        self.ids.get(&WeldKey::of(pt)).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Quad dominant mesh produced from one or more series.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BridgeMesh {
    pub vertices: Vec<DVec3>,
    pub edges: Vec<(u32, u32)>,
    pub faces: Vec<[u32; 4]>,
    /// Emitted vertex index to the id of the destination mesh vertex it is
    /// welded to.
    pub welds: BTreeMap<u32, u32>,
}

impl BridgeMesh {
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Accumulates vertices, edges and faces without duplicates.
pub(crate) struct MeshBuilder<'a> {
    mesh: BridgeMesh,
    weld: &'a WeldMap,
    keys: HashMap<WeldKey, u32>,
    edges: HashSet<(u32, u32)>,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(weld: &'a WeldMap) -> Self {
        MeshBuilder {
            mesh: BridgeMesh::default(),
            weld,
            keys: HashMap::new(),
            edges: HashSet::new(),
        }
    }

    /// Index of the vertex at `pt`. `existing` is the id of the destination
    /// mesh vertex the point is known to come from.
    pub fn add_vertex(&mut self, pt: DVec3, existing: Option<u32>) -> u32 {
        let key = WeldKey::of(pt);
        let index = match self.keys.get(&key) {
            Some(&index) => index,
            None => {
                let index = self.mesh.vertices.len() as u32;
                self.mesh.vertices.push(pt);
                self.keys.insert(key, index);
                index
            }
        };
        if let Some(id) = existing.or_else(|| self.weld.get(pt)) {
            self.mesh.welds.entry(index).or_insert(id);
        }
        index
    }

    pub fn add_edge(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }
        if self.edges.insert((a.min(b), a.max(b))) {
            self.mesh.edges.push((a, b));
        }
    }

    /// Skips quads that collapsed because some of their vertices coincide.
    pub fn add_face(&mut self, face: [u32; 4]) {
        let distinct = (0..4).all(|i| ((i + 1)..4).all(|j| face[i] != face[j]));
        if distinct {
            self.mesh.faces.push(face);
        }
    }

    pub fn finish(self) -> BridgeMesh {
        self.mesh
    }
}

impl CutSeries {
    /**
     * Bridges consecutive loops of the series with quads. With `k` loops of
     * `n` vertices, emits `k * n` vertices, the edges along each loop and
     * between consecutive loops, and the quads between consecutive loops,
     * including the wrap around quad for closed loops.
     *
     * Every loop must have the same number of vertices.
     */
    pub fn to_mesh(&self, arena: &CutArena, weld: &WeldMap) -> Result<BridgeMesh> {
        let mut builder = MeshBuilder::new(weld);
        self.emit_into(arena, &mut builder)?;
        Ok(builder.finish())
    }

    pub(crate) fn emit_into(&self, arena: &CutArena, builder: &mut MeshBuilder) -> Result<()> {
        let anchors = self.anchors(arena)?;
        let Some(first) = anchors.first() else {
            return Ok(());
        };
        let n = first.simplified().len();
        if let Some(bad) = anchors.iter().find(|a| a.simplified().len() != n) {
            return Err(Error::MismatchedResolution(n, bad.simplified().len()));
        }
        let cyclic = anchors.iter().all(|a| a.is_cyclic());
        let last = anchors.len() - 1;
        let rows: Vec<Vec<u32>> = anchors
            .iter()
            .enumerate()
            .map(|(j, anchor)| {
                let existing = match (j, self.existing_head(), self.existing_tail()) {
                    (0, Some(head), _) => Some(head.vertex_ids()),
                    (j, _, Some(tail)) if j == last => Some(tail.vertex_ids()),
                    _ => None,
                };
                anchor
                    .simplified()
                    .iter()
                    .enumerate()
                    .map(|(i, p)| builder.add_vertex(*p, existing.map(|ids| ids[i])))
                    .collect()
            })
            .collect();
        let wrap = if cyclic { n } else { n.saturating_sub(1) };
        for row in &rows {
            for i in 0..wrap {
                builder.add_edge(row[i], row[(i + 1) % n]);
            }
        }
        for pair in rows.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            for i in 0..n {
                builder.add_edge(a[i], b[i]);
            }
            for i in 0..wrap {
                let k = (i + 1) % n;
                builder.add_face([a[i], a[k], b[k], b[i]]);
            }
        }
        log::debug!(
            "Emitted {} loops of {} vertices, {} welds so far",
            rows.len(),
            n,
            builder.mesh.welds.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashSet, f64::consts::PI};

    use glam::{DVec3, dvec3};

    use super::{BridgeMesh, WeldKey, WeldMap};
    use crate::{
        anchor::ExistingLoopAnchor,
        arena::CutArena,
        error::Error,
        series::{
            SeriesEnd,
            test::{flat_settings, plane_series, tube_series},
        },
    };

    fn unique_keys(mesh: &BridgeMesh) -> bool {
        let keys: HashSet<WeldKey> = mesh.vertices.iter().map(|p| WeldKey::of(*p)).collect();
        keys.len() == mesh.num_vertices()
    }

    #[test]
    fn t_weld_key() {
        assert_eq!(
            WeldKey::of(dvec3(1.0, 2.0, 3.0)),
            WeldKey::of(dvec3(1.0002, 1.9999, 3.0004))
        );
        assert_ne!(
            WeldKey::of(dvec3(1.0, 2.0, 3.0)),
            WeldKey::of(dvec3(1.002, 2.0, 3.0))
        );
        let map = WeldMap::from_vertices(&[DVec3::ZERO, DVec3::X]);
        assert_eq!(map.get(dvec3(1.0, 0.0, 1e-5)), Some(1));
        assert_eq!(map.get(DVec3::Y), None);
    }

    #[test]
    fn t_open_strip() {
        let mut arena = CutArena::default();
        let (_, series) = plane_series(&mut arena);
        let mesh = series
            .to_mesh(&arena, &WeldMap::new())
            .expect("Cannot emit mesh");
        assert_eq!(mesh.num_vertices(), 32);
        assert_eq!(mesh.num_faces(), 21);
        assert_eq!(mesh.num_edges(), 4 * 7 + 3 * 8);
        assert!(mesh.welds.is_empty());
        assert!(unique_keys(&mesh));
    }

    #[test]
    fn t_closed_strip() {
        let mut arena = CutArena::default();
        let (_, series) = tube_series(&mut arena, -1.9, 1.9);
        let first = arena
            .get(series.cuts()[0])
            .expect("Cannot access cut")
            .simplified()
            .to_vec();
        let mut weld = WeldMap::new();
        for (i, p) in first.iter().enumerate() {
            weld.insert(*p, 500 + i as u32);
        }
        let mesh = series.to_mesh(&arena, &weld).expect("Cannot emit mesh");
        assert_eq!(mesh.num_vertices(), 32);
        assert_eq!(mesh.num_faces(), 24);
        assert_eq!(mesh.num_edges(), 4 * 8 + 3 * 8);
        assert_eq!(mesh.welds.len(), 8);
        assert_eq!(mesh.welds.get(&0), Some(&500));
        assert!(unique_keys(&mesh));
        // Quads wind consistently, so every interior edge is shared by two
        // faces running in opposite directions.
        let mut directed = HashSet::new();
        for f in &mesh.faces {
            for i in 0..4 {
                assert!(directed.insert((f[i], f[(i + 1) % 4])));
            }
        }
    }

    #[test]
    fn t_existing_head_welds() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -2.3, 1.3);
        let ring: Vec<DVec3> = (0..8)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / 8.0;
                dvec3(-2.5, t.cos(), t.sin())
            })
            .collect();
        let anchor =
            ExistingLoopAnchor::new(ring, (100..108).collect(), true).expect("Cannot build anchor");
        series
            .snap_end_to_existing(
                anchor,
                SeriesEnd::Head,
                &mut arena,
                &surf,
                -DVec3::Z,
                &flat_settings(),
            )
            .expect("Cannot snap to existing loop");
        let mesh = series
            .to_mesh(&arena, &WeldMap::new())
            .expect("Cannot emit mesh");
        assert_eq!(mesh.num_vertices(), 5 * 8);
        assert_eq!(mesh.welds.len(), 8);
        let head = series.existing_head().expect("Series must have a head");
        for (i, id) in head.vertex_ids().iter().enumerate() {
            assert_eq!(mesh.welds.get(&(i as u32)), Some(id));
        }
    }

    #[test]
    fn t_existing_tail_welds() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -1.3, 2.3);
        let ring: Vec<DVec3> = (0..8)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / 8.0;
                dvec3(2.5, t.cos(), t.sin())
            })
            .collect();
        let anchor =
            ExistingLoopAnchor::new(ring, (200..208).collect(), true).expect("Cannot build anchor");
        series
            .snap_end_to_existing(
                anchor,
                SeriesEnd::Tail,
                &mut arena,
                &surf,
                -DVec3::Z,
                &flat_settings(),
            )
            .expect("Cannot snap to existing loop");
        let mesh = series
            .to_mesh(&arena, &WeldMap::new())
            .expect("Cannot emit mesh");
        assert_eq!(mesh.num_vertices(), 5 * 8);
        assert_eq!(mesh.welds.len(), 8);
        let tail = series.existing_tail().expect("Series must have a tail");
        for (i, id) in tail.vertex_ids().iter().enumerate() {
            assert_eq!(mesh.welds.get(&(32 + i as u32)), Some(id));
        }
    }

    #[test]
    fn t_mismatched_resolution() {
        let mut arena = CutArena::default();
        let (_, series) = tube_series(&mut arena, -1.9, 1.9);
        arena
            .get_mut(series.cuts()[2])
            .expect("Cannot access cut")
            .set_ring_segments(10);
        assert_eq!(
            series.to_mesh(&arena, &WeldMap::new()),
            Err(Error::MismatchedResolution(8, 10))
        );
    }
}
