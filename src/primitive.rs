use std::f64::consts::PI;

use glam::DVec3;

use crate::{
    error::{Error, Result},
    trisurface::TriSurface,
};

impl TriSurface {
    /// Makes a square grid in the XY plane, centered at the origin, with
    /// `divisions` cells along each side. Every cell is split into two
    /// triangles facing +Z.
    ///
    ///  ```text
    ///    3-----2
    ///    |   / |
    ///    | /   |
    ///    0-----1
    ///  ```
    pub fn grid_plane(size: f64, divisions: usize) -> Result<Self> {
        if divisions == 0 {
            return Err(Error::TooFewSegments(divisions));
        }
        let row = divisions + 1;
        let step = size / divisions as f64;
        let half = 0.5 * size;
        let positions: Vec<DVec3> = (0..row)
            .flat_map(|j| {
                (0..row).map(move |i| DVec3::new(i as f64 * step - half, j as f64 * step - half, 0.0))
            })
            .collect();
        let index = |i: usize, j: usize| (j * row + i) as u32;
        let triangles = (0..divisions)
            .flat_map(|j| {
                (0..divisions).flat_map(move |i| {
                    let (a, b, c, d) = (
                        index(i, j),
                        index(i + 1, j),
                        index(i + 1, j + 1),
                        index(i, j + 1),
                    );
                    [[a, b, c], [a, c, d]]
                })
            })
            .collect();
        TriSurface::new(positions, triangles)
    }

    /// Makes an open cylindrical tube along the X axis, centered at the
    /// origin, with `around` vertices per ring and `along` cells between the
    /// two end rings. Faces point away from the axis.
    pub fn open_cylinder(radius: f64, length: f64, around: usize, along: usize) -> Result<Self> {
        if around < 3 {
            return Err(Error::TooFewSegments(around));
        }
        if along == 0 {
            return Err(Error::TooFewSegments(along));
        }
        let step = length / along as f64;
        let positions: Vec<DVec3> = (0..=along)
            .flat_map(|j| {
                let x = j as f64 * step - 0.5 * length;
                (0..around).map(move |i| {
                    let theta = 2.0 * PI * i as f64 / around as f64;
                    DVec3::new(x, radius * theta.cos(), radius * theta.sin())
                })
            })
            .collect();
        let index = |j: usize, i: usize| (j * around + (i % around)) as u32;
        let triangles = (0..along)
            .flat_map(|j| {
                (0..around).flat_map(move |i| {
                    let (a, b, c, d) = (
                        index(j, i),
                        index(j + 1, i),
                        index(j + 1, i + 1),
                        index(j, i + 1),
                    );
                    [[a, d, c], [a, c, b]]
                })
            })
            .collect();
        TriSurface::new(positions, triangles)
    }
}

#[cfg(test)]
mod test {
    use glam::{DVec3, dvec3};

    use crate::{element::FH, macros::assert_f64_eq, trisurface::TriSurface};

    #[test]
    fn t_grid_plane() {
        let grid = TriSurface::grid_plane(2.0, 4).expect("Cannot create grid");
        assert_eq!(grid.num_vertices(), 25);
        assert_eq!(grid.num_faces(), 32);
        for f in 0..grid.num_faces() {
            assert_eq!(grid.face_normal(FH::from(f)), Some(DVec3::Z));
        }
        assert_eq!(grid.positions()[0], dvec3(-1.0, -1.0, 0.0));
        assert_eq!(grid.positions()[24], dvec3(1.0, 1.0, 0.0));
        assert_eq!(grid.face_normal(FH::from(32u32)), None);
        assert!(TriSurface::grid_plane(2.0, 0).is_err());
    }

    #[test]
    fn t_open_cylinder_normals_face_out() {
        let tube = TriSurface::open_cylinder(1.5, 3.0, 10, 3).expect("Cannot create cylinder");
        assert_eq!(tube.num_vertices(), 40);
        assert_eq!(tube.num_faces(), 60);
        for (f, tri) in tube.triangles().iter().enumerate() {
            let center = tri
                .iter()
                .map(|v| tube.positions()[*v as usize])
                .sum::<DVec3>()
                / 3.0;
            let radial = dvec3(0.0, center.y, center.z);
            let normal = tube.face_normal(FH::from(f)).expect("Cannot read face normal");
            assert!(normal.dot(radial) > 0.0);
        }
        for p in tube.positions() {
            assert_f64_eq!(dvec3(0.0, p.y, p.z).length(), 1.5, 1e-12);
        }
    }
}
