use std::path::Path;

use glam::DVec3;

use crate::{
    error::{Error, Result},
    trisurface::TriSurface,
};

impl TriSurface {
    /// Loads every model in the obj file into one surface. Polygons are
    /// triangulated on load.
    pub fn load_obj(path: &Path) -> Result<Self> {
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, _) =
            tobj::load_obj(path, &options).map_err(|e| Error::ObjLoadFailed(format!("{}", e)))?;
        let mut positions = Vec::new();
        let mut triangles = Vec::new();
        for model in models {
            let mesh = model.mesh;
            if mesh.positions.len() % 3 != 0 {
                return Err(Error::IncorrectNumberOfCoordinates(mesh.positions.len()));
            }
            if mesh.indices.len() % 3 != 0 {
                return Err(Error::IncorrectIndexCount(mesh.indices.len()));
            }
            let offset = positions.len() as u32;
            positions.extend(
                mesh.positions
                    .chunks(3)
                    .map(|c| DVec3::new(c[0], c[1], c[2])),
            );
            triangles.extend(
                mesh.indices
                    .chunks(3)
                    .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
            );
        }
        log::debug!(
            "Loaded {} vertices and {} triangles from {}",
            positions.len(),
            triangles.len(),
            path.display()
        );
        TriSurface::new(positions, triangles)
    }
}
