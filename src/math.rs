use glam::{DVec2, DVec3};

/// Tolerance used for degenerate lengths and parallel tests.
pub const EPS: f64 = 1e-12;

/**
 * An oriented plane. The normal is expected to be of unit length.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub origin: DVec3,
    pub normal: DVec3,
}

impl Plane {
    pub fn new(origin: DVec3, normal: DVec3) -> Self {
        Plane {
            origin,
            normal: normal.normalize_or_zero(),
        }
    }

    /// Signed distance of `pt` from the plane, positive on the side the normal
    /// points to.
    pub fn signed_distance(&self, pt: DVec3) -> f64 {
        (pt - self.origin).dot(self.normal)
    }

    pub fn project(&self, pt: DVec3) -> DVec3 {
        pt - self.normal * self.signed_distance(pt)
    }

    /// Intersection of the segment `a -> b` with the plane, if the endpoints
    /// lie on different sides.
    pub fn intersect_segment(&self, a: DVec3, b: DVec3) -> Option<DVec3> {
        let da = self.signed_distance(a);
        let db = self.signed_distance(b);
        if (da > 0.0 && db > 0.0) || (da < 0.0 && db < 0.0) {
            return None;
        }
        let denom = da - db;
        if denom.abs() < EPS {
            return Some(a);
        }
        Some(a.lerp(b, da / denom))
    }

    /// Intersection of the infinite line through `a` and `b` with the plane.
    pub fn intersect_line(&self, a: DVec3, b: DVec3) -> Option<DVec3> {
        let dir = b - a;
        let denom = dir.dot(self.normal);
        if denom.abs() < EPS {
            return None;
        }
        Some(a + dir * ((self.origin - a).dot(self.normal) / denom))
    }
}

/**
 * Orthonormal frame of a planar loop. The axes are a deterministic function of
 * the normal, so two loops with the same normal project identically.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub origin: DVec3,
    pub normal: DVec3,
    pub x: DVec3,
    pub y: DVec3,
}

impl Frame {
    pub fn new(origin: DVec3, normal: DVec3) -> Self {
        let normal = normal.normalize_or_zero();
        let x = normal.any_orthonormal_vector();
        let y = normal.cross(x);
        Frame {
            origin,
            normal,
            x,
            y,
        }
    }

    pub fn to_local(&self, pt: DVec3) -> DVec2 {
        let v = pt - self.origin;
        DVec2::new(v.dot(self.x), v.dot(self.y))
    }

    pub fn plane(&self) -> Plane {
        Plane {
            origin: self.origin,
            normal: self.normal,
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame::new(DVec3::ZERO, DVec3::Z)
    }
}

/// Unsigned angle between two vectors in radians.
pub fn angle_between(a: DVec3, b: DVec3) -> f64 {
    let denom = a.length() * b.length();
    if denom < EPS {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}

/// Signed angle from `a` to `b` about `axis`.
pub fn signed_angle(a: DVec3, b: DVec3, axis: DVec3) -> f64 {
    let angle = angle_between(a, b);
    if a.cross(b).dot(axis) < 0.0 {
        -angle
    } else {
        angle
    }
}

#[cfg(test)]
mod test {
    use glam::{DVec3, dvec3};

    use super::{Frame, Plane, signed_angle};
    use crate::macros::{assert_f64_eq, assert_point_eq};

    #[test]
    fn t_plane_segment_intersection() {
        let plane = Plane::new(DVec3::ZERO, DVec3::X);
        let hit = plane
            .intersect_segment(dvec3(-1.0, 2.0, 0.0), dvec3(3.0, 2.0, 4.0))
            .expect("Cannot intersect segment");
        assert_point_eq!(hit, dvec3(0.0, 2.0, 1.0));
        assert!(
            plane
                .intersect_segment(dvec3(1.0, 0.0, 0.0), dvec3(2.0, 0.0, 0.0))
                .is_none()
        );
    }

    #[test]
    fn t_plane_line_intersection() {
        let plane = Plane::new(dvec3(0.0, 0.0, 2.0), DVec3::Z * 3.0);
        let hit = plane
            .intersect_line(DVec3::ZERO, dvec3(1.0, 1.0, 1.0))
            .expect("Cannot intersect line");
        assert_point_eq!(hit, dvec3(2.0, 2.0, 2.0));
        assert!(plane.intersect_line(DVec3::ZERO, DVec3::X).is_none());
        assert_f64_eq!(plane.signed_distance(dvec3(5.0, 5.0, -1.0)), -3.0);
    }

    #[test]
    fn t_frame_axes() {
        let frame = Frame::new(dvec3(1.0, 2.0, 3.0), dvec3(0.0, 2.0, 0.0));
        assert_f64_eq!(frame.x.dot(frame.normal), 0.0);
        assert_f64_eq!(frame.y.dot(frame.normal), 0.0);
        assert_f64_eq!(frame.x.cross(frame.y).dot(frame.normal), 1.0);
        let local = frame.to_local(frame.origin + frame.x * 2.0 - frame.y);
        assert_f64_eq!(local.x, 2.0);
        assert_f64_eq!(local.y, -1.0);
    }

    #[test]
    fn t_signed_angle() {
        assert_f64_eq!(
            signed_angle(DVec3::X, DVec3::Y, DVec3::Z),
            std::f64::consts::FRAC_PI_2
        );
        assert_f64_eq!(
            signed_angle(DVec3::X, DVec3::Y, -DVec3::Z),
            -std::f64::consts::FRAC_PI_2
        );
    }
}
