use glam::DVec3;

use crate::{
    align::{Alignment, LoopLike, connectivity_cost, needs_reverse, rough_rotation},
    error::{Error, Result},
    math::{EPS, Frame},
    polyline::{centroid, newell_normal},
};

/**
 * A boundary loop of the destination mesh that a series starts or ends on.
 *
 * Its vertices already exist, so aligning it can only reorder them, never move
 * them.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingLoopAnchor {
    vertex_loop: Vec<DVec3>,
    vertex_ids: Vec<u32>,
    cyclic: bool,
    frame: Frame,
}

impl ExistingLoopAnchor {
    /**
     * `vertex_ids` are the indices of the vertices in the destination mesh, in
     * the same order as `vertex_loop`.
     */
    pub fn new(vertex_loop: Vec<DVec3>, vertex_ids: Vec<u32>, cyclic: bool) -> Result<Self> {
        if vertex_loop.len() < 2 {
            return Err(Error::TooFewSegments(vertex_loop.len()));
        }
        if vertex_ids.len() != vertex_loop.len() {
            return Err(Error::MismatchedResolution(
                vertex_loop.len(),
                vertex_ids.len(),
            ));
        }
        let mut anchor = ExistingLoopAnchor {
            vertex_loop,
            vertex_ids,
            cyclic,
            frame: Frame::default(),
        };
        anchor.update_frame();
        Ok(anchor)
    }

    /// Orders the vertices of the given edges into a loop. The edges must form
    /// a single chain, which is closed if it returns to its first vertex.
    pub fn from_edges(positions: &[DVec3], edges: &[(u32, u32)]) -> Result<Self> {
        let Some(&(first, second)) = edges.first() else {
            return Err(Error::TooFewSegments(0));
        };
        let mut ids = vec![first, second];
        let mut used = vec![false; edges.len()];
        used[0] = true;
        loop {
            let tail = ids[ids.len() - 1];
            let next = edges.iter().enumerate().find_map(|(i, &(a, b))| {
                if used[i] {
                    None
                } else if a == tail {
                    Some((i, b))
                } else if b == tail {
                    Some((i, a))
                } else {
                    None
                }
            });
            let Some((i, v)) = next else {
                break;
            };
            used[i] = true;
            ids.push(v);
        }
        // Grow backwards from the first vertex for open chains that did not
        // start at an end.
        loop {
            let head = ids[0];
            let prev = edges.iter().enumerate().find_map(|(i, &(a, b))| {
                if used[i] {
                    None
                } else if a == head {
                    Some((i, b))
                } else if b == head {
                    Some((i, a))
                } else {
                    None
                }
            });
            let Some((i, v)) = prev else {
                break;
            };
            used[i] = true;
            ids.insert(0, v);
        }
        let cyclic = ids.len() > 2 && ids[0] == ids[ids.len() - 1];
        if cyclic {
            ids.pop();
        }
        if let Some(&bad) = ids.iter().find(|&&v| v as usize >= positions.len()) {
            return Err(Error::InvalidVertexIndex(bad));
        }
        let points = ids.iter().map(|&v| positions[v as usize]).collect();
        Self::new(points, ids, cyclic)
    }

    /// Normal of the best fit plane, pointing so that the loop winds counter
    /// clockwise about it.
    fn update_frame(&mut self) {
        let origin = centroid(&self.vertex_loop);
        let mut normal = newell_normal(&self.vertex_loop);
        if normal.length() < EPS {
            let chord = self.vertex_loop[self.vertex_loop.len() - 1] - self.vertex_loop[0];
            normal = chord.any_orthonormal_vector();
        }
        self.frame = Frame::new(origin, normal);
    }

    pub fn vertex_loop(&self) -> &[DVec3] {
        &self.vertex_loop
    }

    pub fn vertex_ids(&self) -> &[u32] {
        &self.vertex_ids
    }

    pub fn len(&self) -> usize {
        self.vertex_loop.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_loop.is_empty()
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    fn reverse(&mut self) {
        if self.cyclic {
            self.vertex_loop[1..].reverse();
            self.vertex_ids[1..].reverse();
        } else {
            self.vertex_loop.reverse();
            self.vertex_ids.reverse();
        }
        self.update_frame();
    }

    /**
     * Reorders the vertices to run in the same direction as `other`, and for
     * closed loops to start at the vertex closest to `other`'s first vertex.
     */
    pub fn align_to(&mut self, other: &dyn LoopLike) -> Option<Alignment> {
        let n = self.vertex_loop.len();
        if n != other.simplified().len() {
            log::warn!(
                "Cannot align an existing loop of {} vertices to one of {} vertices",
                n,
                other.simplified().len()
            );
            return None;
        }
        let cyclic = self.cyclic && other.is_cyclic();
        let reversed = needs_reverse(&self.vertex_loop, other.simplified(), cyclic);
        if reversed {
            self.reverse();
        }
        let rotation = if cyclic {
            rough_rotation(&self.vertex_loop, other.simplified())
        } else {
            0
        };
        self.vertex_loop.rotate_left(rotation);
        self.vertex_ids.rotate_left(rotation);
        Some(Alignment {
            reversed,
            rotation,
            shift: 0.0,
            cost: connectivity_cost(&self.vertex_loop, other.simplified()),
            trace: Vec::new(),
        })
    }
}

impl LoopLike for ExistingLoopAnchor {
    fn simplified(&self) -> &[DVec3] {
        &self.vertex_loop
    }

    fn plane_normal(&self) -> DVec3 {
        self.frame.normal
    }

    fn plane_origin(&self) -> DVec3 {
        self.frame.origin
    }

    fn is_cyclic(&self) -> bool {
        self.cyclic
    }
}
