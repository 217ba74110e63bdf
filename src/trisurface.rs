use std::collections::HashMap;

use glam::DVec3;

use crate::{
    element::{FH, Handle},
    error::{Error, Result},
    math::{EPS, Plane},
    polyline::path_length,
    surface::{Section, Surface, SurfaceHit},
};

/**
 * Triangulated surface answering every query by visiting all of its
 * triangles. Good enough for modest meshes and for testing; hosts with large
 * meshes are expected to implement [`Surface`] over their own spatial index.
 */
#[derive(Debug, Clone, Default)]
pub struct TriSurface {
    positions: Vec<DVec3>,
    triangles: Vec<[u32; 3]>,
    normals: Vec<DVec3>,
}

/// Mesh edge crossed by a cutting plane, as a sorted pair of vertex indices.
type EdgeKey = (u32, u32);

struct Crossing {
    face: FH,
    ends: [EdgeKey; 2],
}

impl TriSurface {
    pub fn new(positions: Vec<DVec3>, triangles: Vec<[u32; 3]>) -> Result<Self> {
        let nverts = positions.len() as u32;
        if let Some(&bad) = triangles.iter().flatten().find(|&&v| v >= nverts) {
            return Err(Error::InvalidVertexIndex(bad));
        }
        let normals = triangles
            .iter()
            .map(|&[a, b, c]| {
                let (a, b, c) = (
                    positions[a as usize],
                    positions[b as usize],
                    positions[c as usize],
                );
                (b - a).cross(c - a).normalize_or_zero()
            })
            .collect();
        Ok(TriSurface {
            positions,
            triangles,
            normals,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_faces(&self) -> usize {
        self.triangles.len()
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Unit normal of the face, or `None` if there is no such face.
    pub fn face_normal(&self, f: FH) -> Option<DVec3> {
        self.normals.get(f.index() as usize).copied()
    }

    fn corners(&self, fi: usize) -> [DVec3; 3] {
        self.triangles[fi].map(|v| self.positions[v as usize])
    }

    /// Point where the plane crosses the mesh edge. Always computed from the
    /// lower vertex index so both adjacent triangles agree bit for bit.
    fn edge_point(&self, plane: &Plane, (a, b): EdgeKey) -> DVec3 {
        let (pa, pb) = (self.positions[a as usize], self.positions[b as usize]);
        let (da, db) = (plane.signed_distance(pa), plane.signed_distance(pb));
        let denom = da - db;
        if denom.abs() < EPS {
            pa
        } else {
            pa.lerp(pb, da / denom)
        }
    }

    fn crossings(&self, plane: &Plane) -> Vec<Crossing> {
        // Vertices on the plane count as being above it. This keeps the number
        // of crossed edges per triangle at either zero or two.
        let above: Vec<bool> = self
            .positions
            .iter()
            .map(|p| plane.signed_distance(*p) >= 0.0)
            .collect();
        self.triangles
            .iter()
            .enumerate()
            .filter_map(|(fi, tri)| {
                let mut ends = [(0u32, 0u32); 2];
                let mut count = 0usize;
                for k in 0..3 {
                    let (a, b) = (tri[k], tri[(k + 1) % 3]);
                    if above[a as usize] != above[b as usize] {
                        if count < 2 {
                            ends[count] = (a.min(b), a.max(b));
                        }
                        count += 1;
                    }
                }
                (count == 2).then_some(Crossing {
                    face: fi.into(),
                    ends,
                })
            })
            .collect()
    }

    /// Chains crossings into connected polylines, returning the edge keys of
    /// each chain, whether it is cyclic, and the faces it passes through.
    fn chains(crossings: &[Crossing]) -> Vec<(Vec<EdgeKey>, bool, Vec<FH>)> {
        let mut adjacency: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
        for (i, c) in crossings.iter().enumerate() {
            for key in c.ends {
                adjacency.entry(key).or_default().push(i);
            }
        }
        let mut visited = vec![false; crossings.len()];
        let walk = |from: EdgeKey,
                        front: EdgeKey,
                        visited: &mut Vec<bool>,
                        faces: &mut Vec<FH>|
         -> (Vec<EdgeKey>, bool) {
            let mut keys = Vec::new();
            let mut cur = from;
            loop {
                let next = adjacency
                    .get(&cur)
                    .and_then(|segs| segs.iter().copied().find(|&s| !visited[s]));
                let Some(s) = next else {
                    return (keys, false);
                };
                visited[s] = true;
                faces.push(crossings[s].face);
                let [a, b] = crossings[s].ends;
                let other = if a == cur { b } else { a };
                if other == front {
                    return (keys, true);
                }
                keys.push(other);
                cur = other;
            }
        };
        let mut out = Vec::new();
        for start in 0..crossings.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let [k0, k1] = crossings[start].ends;
            let mut faces = vec![crossings[start].face];
            let (forward, cyclic) = walk(k1, k0, &mut visited, &mut faces);
            let mut keys = Vec::with_capacity(forward.len() + 2);
            if !cyclic {
                let (mut backward, _) = walk(k0, k1, &mut visited, &mut faces);
                backward.reverse();
                keys.extend(backward);
            }
            keys.push(k0);
            keys.push(k1);
            keys.extend(forward);
            out.push((keys, cyclic, faces));
        }
        out
    }

    fn sections(&self, plane: &Plane) -> Vec<(Section, Vec<FH>)> {
        Self::chains(&self.crossings(plane))
            .into_iter()
            .map(|(keys, cyclic, faces)| {
                let mut points: Vec<DVec3> = Vec::with_capacity(keys.len());
                for key in keys {
                    let pt = self.edge_point(plane, key);
                    if points.last().is_none_or(|last| last.distance(pt) > EPS) {
                        points.push(pt);
                    }
                }
                if cyclic && points.len() > 1 && points[0].distance(points[points.len() - 1]) <= EPS
                {
                    points.pop();
                }
                (Section::from_chain(points, cyclic), faces)
            })
            .collect()
    }

    fn closest_on_triangle(p: DVec3, [a, b, c]: [DVec3; 3]) -> DVec3 {
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }
        let bp = p - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }
        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            return a + ab * (d1 / (d1 - d3));
        }
        let cp = p - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }
        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            return a + ac * (d2 / (d2 - d6));
        }
        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
        }
        let denom = 1.0 / (va + vb + vc);
        a + ab * (vb * denom) + ac * (vc * denom)
    }

    fn ray_triangle(origin: DVec3, dir: DVec3, [a, b, c]: [DVec3; 3]) -> Option<f64> {
        let e1 = b - a;
        let e2 = c - a;
        let h = dir.cross(e2);
        let det = e1.dot(h);
        if det.abs() < EPS {
            return None;
        }
        let inv = 1.0 / det;
        let s = origin - a;
        let u = inv * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = inv * dir.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = inv * e2.dot(q);
        (t > EPS).then_some(t)
    }

    /// Walks the chain from `start` over the given vertex indices until the
    /// stop plane is crossed.
    fn walk_to_plane(
        points: &[DVec3],
        start: DVec3,
        order: impl Iterator<Item = usize>,
        stop: &Plane,
        max_steps: usize,
    ) -> Option<Vec<DVec3>> {
        let mut out = vec![start];
        let mut prev = start;
        for i in order.take(max_steps) {
            let next = points[i];
            if let Some(hit) = stop.intersect_segment(prev, next) {
                out.push(hit);
                return Some(out);
            }
            out.push(next);
            prev = next;
        }
        None
    }
}

impl Surface for TriSurface {
    fn cross_section(&self, plane: &Plane, seed: FH) -> Result<Section> {
        let sections = self.sections(plane);
        if let Some(found) = sections
            .iter()
            .position(|(_, faces)| faces.contains(&seed))
        {
            return Ok(sections.into_iter().nth(found).map(|s| s.0).unwrap_or_default());
        }
        // The seed face is not crossed by the plane. Fall back to the component
        // nearest to the plane origin.
        sections
            .into_iter()
            .map(|(section, _)| {
                let dist = section
                    .points
                    .iter()
                    .map(|p| p.distance_squared(plane.origin))
                    .fold(f64::INFINITY, f64::min);
                (section, dist)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(section, _)| section)
            .filter(|s| !s.is_empty())
            .ok_or(Error::EmptyIntersection)
    }

    fn raycast(&self, origin: DVec3, direction: DVec3) -> Option<SurfaceHit> {
        (0..self.triangles.len())
            .filter_map(|fi| {
                Self::ray_triangle(origin, direction, self.corners(fi)).map(|t| (fi, t))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(fi, t)| SurfaceHit {
                point: origin + direction * t,
                normal: self.normals[fi],
                face: fi.into(),
            })
    }

    fn closest_point(&self, point: DVec3) -> Option<SurfaceHit> {
        (0..self.triangles.len())
            .map(|fi| {
                let pt = Self::closest_on_triangle(point, self.corners(fi));
                (fi, pt, pt.distance_squared(point))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(fi, pt, _)| SurfaceHit {
                point: pt,
                normal: self.normals[fi],
                face: fi.into(),
            })
    }

    fn crawl(
        &self,
        seed: FH,
        point: DVec3,
        cut_normal: DVec3,
        stop: &Plane,
        max_steps: usize,
    ) -> Result<Vec<DVec3>> {
        let section = self
            .cross_section(&Plane::new(point, cut_normal), seed)
            .map_err(|_| Error::CrawlFailed(seed))?;
        let points = &section.points;
        let n = points.len();
        if n < 2 {
            return Err(Error::CrawlFailed(seed));
        }
        let nsegs = if section.cyclic { n } else { n - 1 };
        // Project the start onto the nearest segment of the chain.
        let (k, start) = (0..nsegs)
            .map(|k| {
                let (a, b) = (points[k], points[(k + 1) % n]);
                let ab = b - a;
                let t = if ab.length_squared() < EPS {
                    0.0
                } else {
                    ((point - a).dot(ab) / ab.length_squared()).clamp(0.0, 1.0)
                };
                (k, a + ab * t)
            })
            .min_by(|x, y| {
                x.1.distance_squared(point)
                    .total_cmp(&y.1.distance_squared(point))
            })
            .ok_or(Error::CrawlFailed(seed))?;
        if stop.signed_distance(start).abs() < EPS {
            return Ok(vec![start]);
        }
        let forward: Vec<usize> = if section.cyclic {
            (1..=n).map(|i| (k + i) % n).collect()
        } else {
            ((k + 1)..n).collect()
        };
        let backward: Vec<usize> = if section.cyclic {
            (0..n).map(|i| (k + n - i) % n).collect()
        } else {
            (0..=k).rev().collect()
        };
        let ahead = Self::walk_to_plane(points, start, forward.into_iter(), stop, max_steps);
        let behind = Self::walk_to_plane(points, start, backward.into_iter(), stop, max_steps);
        match (ahead, behind) {
            (Some(a), Some(b)) => {
                if path_length(&a, false) <= path_length(&b, false) {
                    Ok(a)
                } else {
                    Ok(b)
                }
            }
            (Some(a), None) => Ok(a),
            (None, Some(b)) => Ok(b),
            (None, None) => Err(Error::CrawlFailed(seed)),
        }
    }
}
