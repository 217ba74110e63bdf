use glam::DVec3;

use super::CutSeries;
use crate::{
    arena::CutArena,
    config::Settings,
    error::{Error, Result},
    surface::Surface,
};

impl CutSeries {
    /// Plane normals of the cuts, in order.
    pub fn normals(&self, arena: &CutArena) -> Result<Vec<DVec3>> {
        self.cuts
            .iter()
            .map(|id| arena.get(*id).map(|c| c.plane_normal()))
            .collect()
    }

    /// Re-cuts every cut with the given normals, then re-aligns the series
    /// front to back and rebuilds the backbone.
    fn apply_normals<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        normals: &[DVec3],
        settings: &Settings,
    ) -> Result<()> {
        let current = self.normals(arena)?;
        for (i, (old, new)) in current.iter().zip(normals).enumerate() {
            if old != new {
                self.recut_with_normal(arena, surface, i, *new)?;
            }
        }
        self.align_all(arena, &settings.align)?;
        self.backbone_from_cuts(arena, surface, settings.crawl_steps)
    }

    /**
     * Changes the number of vertices of every loop. Each cut keeps its phase
     * at the same place along its loop.
     */
    pub fn change_ring_segments<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        n: usize,
        settings: &Settings,
    ) -> Result<()> {
        if self.ring_locked {
            return Err(Error::SeriesLocked);
        }
        if n < 3 {
            return Err(Error::TooFewSegments(n));
        }
        for id in &self.cuts {
            arena.get_mut(*id)?.set_ring_segments(n);
        }
        self.ring_segment_count = n;
        self.backbone_from_cuts(arena, surface, settings.crawl_steps)
    }

    /// Nudges the phase of every loop by `delta` segments.
    pub fn shift_all(&self, arena: &mut CutArena, delta: f64) -> Result<()> {
        for id in &self.cuts {
            arena.get_mut(*id)?.shift_by(delta);
        }
        Ok(())
    }

    /// Gives every cut the normalized average of all the normals.
    pub fn average_normals<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        settings: &Settings,
    ) -> Result<()> {
        let normals = self.normals(arena)?;
        let avg = normals.iter().copied().sum::<DVec3>().normalize_or_zero();
        if avg == DVec3::ZERO {
            return Ok(());
        }
        let target = vec![avg; normals.len()];
        self.apply_normals(arena, surface, &target, settings)
    }

    /**
     * Repeatedly replaces the normal of every interior cut with the average
     * of its own and its two neighbours' normals. The end cuts are fixed.
     */
    pub fn smooth_normals_com<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        iterations: usize,
        settings: &Settings,
    ) -> Result<()> {
        let mut normals = self.normals(arena)?;
        if normals.len() < 3 {
            return Ok(());
        }
        for _ in 0..iterations {
            let prev = normals.clone();
            for (i, w) in prev.windows(3).enumerate() {
                let avg = (w[0] + w[1] + w[2]) / 3.0;
                if let Some(n) = avg.try_normalize() {
                    normals[i + 1] = n;
                }
            }
        }
        self.apply_normals(arena, surface, &normals, settings)
    }

    /// Blends the normals of the cuts strictly between `a` and `b` linearly
    /// from the normal of `a` to that of `b`.
    pub fn interpolate_endpoints<S: Surface + ?Sized>(
        &mut self,
        arena: &mut CutArena,
        surface: &S,
        a: usize,
        b: usize,
        settings: &Settings,
    ) -> Result<()> {
        let (a, b) = (a.min(b), a.max(b));
        let mut normals = self.normals(arena)?;
        if b >= normals.len() {
            return Err(Error::IndexOutOfRange(b));
        }
        let (na, nb) = (normals[a], normals[b]);
        for (i, n) in normals.iter_mut().enumerate().take(b).skip(a + 1) {
            let t = (i - a) as f64 / (b - a) as f64;
            if let Some(blend) = na.lerp(nb, t).try_normalize() {
                *n = blend;
            }
        }
        self.apply_normals(arena, surface, &normals, settings)
    }
}

#[cfg(test)]
mod test {
    use glam::{DVec3, dvec3};

    use crate::{
        arena::CutArena,
        error::Error,
        macros::{assert_f64_eq, assert_point_eq},
        series::test::{flat_settings, tube_series},
    };

    fn tilted() -> DVec3 {
        dvec3(1.0, 0.4, 0.0).normalize()
    }

    #[test]
    fn t_change_ring_segments() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -1.9, 1.9);
        let settings = flat_settings();
        let starts: Vec<DVec3> = series
            .cuts()
            .iter()
            .map(|id| arena.get(*id).expect("Cannot access cut").simplified()[0])
            .collect();
        series
            .change_ring_segments(&mut arena, &surf, 12, &settings)
            .expect("Cannot change ring segments");
        assert_eq!(series.ring_segment_count(), 12);
        for (id, start) in series.cuts().iter().zip(starts) {
            let cut = arena.get(*id).expect("Cannot access cut");
            assert_eq!(cut.simplified().len(), 12);
            assert_point_eq!(cut.simplified()[0], start, 1e-9);
        }
        assert_eq!(
            series.change_ring_segments(&mut arena, &surf, 2, &settings),
            Err(Error::TooFewSegments(2))
        );
        series.set_ring_locked(true);
        assert_eq!(
            series.change_ring_segments(&mut arena, &surf, 16, &settings),
            Err(Error::SeriesLocked)
        );
    }

    #[test]
    fn t_shift_all() {
        let mut arena = CutArena::default();
        let (_, series) = tube_series(&mut arena, -1.9, 1.9);
        let before: Vec<f64> = series
            .cuts()
            .iter()
            .map(|id| arena.get(*id).expect("Cannot access cut").shift())
            .collect();
        series.shift_all(&mut arena, 0.25).expect("Cannot shift");
        for (id, shift) in series.cuts().iter().zip(before) {
            assert_f64_eq!(
                arena.get(*id).expect("Cannot access cut").shift(),
                shift + 0.25
            );
        }
    }

    #[test]
    fn t_smooth_normals() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -1.9, 1.9);
        let settings = flat_settings();
        series
            .recut_with_normal(&mut arena, &surf, 1, tilted())
            .expect("Cannot recut");
        let before = series.normals(&arena).expect("Cannot read normals")[1];
        series
            .smooth_normals_com(&mut arena, &surf, 3, &settings)
            .expect("Cannot smooth normals");
        let normals = series.normals(&arena).expect("Cannot read normals");
        assert!(normals[1].dot(DVec3::X) > before.dot(DVec3::X));
        assert_point_eq!(normals[0], DVec3::X, 1e-9);
        assert_point_eq!(normals[3], DVec3::X, 1e-9);
        series
            .average_normals(&mut arena, &surf, &settings)
            .expect("Cannot average normals");
        let normals = series.normals(&arena).expect("Cannot read normals");
        for n in &normals {
            assert_point_eq!(*n, normals[0], 1e-12);
        }
        assert_eq!(series.backbone().len(), 3);
    }

    #[test]
    fn t_interpolate_endpoints() {
        let mut arena = CutArena::default();
        let (surf, mut series) = tube_series(&mut arena, -1.9, 1.9);
        let settings = flat_settings();
        series
            .recut_with_normal(&mut arena, &surf, 3, tilted())
            .expect("Cannot recut");
        series
            .interpolate_endpoints(&mut arena, &surf, 0, 3, &settings)
            .expect("Cannot interpolate normals");
        let normals = series.normals(&arena).expect("Cannot read normals");
        let angle = |n: DVec3| n.angle_between(DVec3::X);
        assert!(angle(normals[1]) > 0.0);
        assert!(angle(normals[1]) < angle(normals[2]));
        assert!(angle(normals[2]) < angle(normals[3]));
        assert_eq!(
            series.interpolate_endpoints(&mut arena, &surf, 0, 9, &settings),
            Err(Error::IndexOutOfRange(9))
        );
    }
}
