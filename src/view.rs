use glam::{DVec2, DVec3};

use crate::math::{EPS, Plane};

/**
 * Mapping between screen space (pixels) and world space, owned by the host
 * application.
 */
pub trait View {
    /// Direction the viewer looks in, in world space.
    fn view_direction(&self) -> DVec3;

    /// World space ray through the screen position, as `(origin, direction)`.
    fn ray(&self, screen: DVec2) -> (DVec3, DVec3);

    /// Screen position of the world point, if it is in front of the viewer.
    fn project(&self, world: DVec3) -> Option<DVec2>;

    /// World point under the screen position, at the depth of `depth`.
    fn unproject(&self, screen: DVec2, depth: DVec3) -> DVec3 {
        let (origin, dir) = self.ray(screen);
        Plane::new(depth, self.view_direction())
            .intersect_line(origin, origin + dir)
            .unwrap_or(depth)
    }
}

/**
 * Orthographic camera. Screen pixel `(0, 0)` maps to `center`, and screen
 * axes follow `right` and `up`.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthoView {
    center: DVec3,
    right: DVec3,
    up: DVec3,
    forward: DVec3,
    pixels_per_unit: f64,
}

impl OrthoView {
    pub fn new(center: DVec3, right: DVec3, up: DVec3, pixels_per_unit: f64) -> Self {
        let right = right.normalize();
        let up = up.normalize();
        OrthoView {
            center,
            right,
            up,
            forward: up.cross(right).normalize(),
            pixels_per_unit: pixels_per_unit.max(EPS),
        }
    }

    /// Looking down the -Z axis at the XY plane from above.
    pub fn top(pixels_per_unit: f64) -> Self {
        Self::new(DVec3::ZERO, DVec3::X, DVec3::Y, pixels_per_unit)
    }

    /// Looking along +Y, with X to the right and Z up.
    pub fn front(pixels_per_unit: f64) -> Self {
        Self::new(DVec3::ZERO, DVec3::X, DVec3::Z, pixels_per_unit)
    }

    pub fn pixels_per_unit(&self) -> f64 {
        self.pixels_per_unit
    }

    /// Distance behind the center plane that rays start from.
    const DEPTH: f64 = 1e3;
}

impl View for OrthoView {
    fn view_direction(&self) -> DVec3 {
        self.forward
    }

    fn ray(&self, screen: DVec2) -> (DVec3, DVec3) {
        let on_plane = self.center
            + (self.right * screen.x + self.up * screen.y) / self.pixels_per_unit;
        (on_plane - self.forward * Self::DEPTH, self.forward)
    }

    fn project(&self, world: DVec3) -> Option<DVec2> {
        let v = world - self.center;
        Some(DVec2::new(v.dot(self.right), v.dot(self.up)) * self.pixels_per_unit)
    }
}

#[cfg(test)]
mod test {
    use glam::{DVec2, DVec3, dvec2, dvec3};

    use super::{OrthoView, View};
    use crate::macros::assert_point_eq;

    #[test]
    fn t_top_view() {
        let view = OrthoView::top(100.0);
        assert_point_eq!(view.view_direction(), -DVec3::Z);
        let (origin, dir) = view.ray(dvec2(50.0, -20.0));
        assert_point_eq!(dir, -DVec3::Z);
        assert_point_eq!(dvec3(origin.x, origin.y, 0.0), dvec3(0.5, -0.2, 0.0));
        assert!(origin.z > 0.0);
        let screen = view
            .project(dvec3(0.5, -0.2, 3.0))
            .expect("Cannot project point");
        assert!((screen - DVec2::new(50.0, -20.0)).length() < 1e-9);
        assert_point_eq!(
            view.unproject(dvec2(100.0, 100.0), dvec3(0.0, 0.0, 2.0)),
            dvec3(1.0, 1.0, 2.0)
        );
    }

    #[test]
    fn t_front_view() {
        let view = OrthoView::front(10.0);
        assert_point_eq!(view.view_direction(), DVec3::Y);
    }
}
