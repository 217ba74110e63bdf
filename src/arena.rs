use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

use crate::{
    cut::CrossSectionCut,
    error::{Error, Result},
};

new_key_type! {
    /// Handle of a [`CrossSectionCut`] stored in a [`CutArena`].
    pub struct CutId;
    /// Handle of a [`CutSeries`](crate::CutSeries) in a
    /// [`ContourSession`](crate::ContourSession).
    pub struct SeriesId;
}

/**
 * Owns every cut of a session. Cuts are shared with undo snapshots and copied
 * on the first write after a snapshot is taken, so a snapshot only duplicates
 * the cuts that are edited afterwards.
 */
#[derive(Debug, Clone, Default)]
pub struct CutArena {
    cuts: SlotMap<CutId, Rc<CrossSectionCut>>,
}

impl CutArena {
    pub fn insert(&mut self, cut: CrossSectionCut) -> CutId {
        self.cuts.insert(Rc::new(cut))
    }

    pub fn remove(&mut self, id: CutId) -> Result<CrossSectionCut> {
        self.cuts
            .remove(id)
            .map(Rc::unwrap_or_clone)
            .ok_or(Error::InvalidCut(id))
    }

    pub fn get(&self, id: CutId) -> Result<&CrossSectionCut> {
        self.cuts
            .get(id)
            .map(|c| c.as_ref())
            .ok_or(Error::InvalidCut(id))
    }

    pub fn get_mut(&mut self, id: CutId) -> Result<&mut CrossSectionCut> {
        self.cuts
            .get_mut(id)
            .map(Rc::make_mut)
            .ok_or(Error::InvalidCut(id))
    }

    /// Shared reference to the cut that stays valid while other cuts are
    /// mutated.
    pub fn shared(&self, id: CutId) -> Result<Rc<CrossSectionCut>> {
        self.cuts.get(id).cloned().ok_or(Error::InvalidCut(id))
    }

    pub fn contains(&self, id: CutId) -> bool {
        self.cuts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = CutId> + '_ {
        self.cuts.keys()
    }

    /// Whether the cut is stored in the same allocation in both arenas.
    pub fn shares(&self, other: &CutArena, id: CutId) -> bool {
        match (self.cuts.get(id), other.cuts.get(id)) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use glam::DVec3;

    use super::CutArena;
    use crate::{cut::CrossSectionCut, error::Error};

    #[test]
    fn t_copy_on_write() {
        let mut arena = CutArena::default();
        let a = arena.insert(CrossSectionCut::new(DVec3::ZERO, DVec3::X));
        let b = arena.insert(CrossSectionCut::new(DVec3::Y, DVec3::X));
        let snapshot = arena.clone();
        assert!(arena.shares(&snapshot, a));
        arena
            .get_mut(a)
            .expect("Cannot access cut")
            .shift_by(0.5);
        assert!(!arena.shares(&snapshot, a));
        assert!(arena.shares(&snapshot, b));
        assert_eq!(snapshot.get(a).expect("Cannot access cut").shift(), 0.0);
    }

    #[test]
    fn t_remove() {
        let mut arena = CutArena::default();
        let a = arena.insert(CrossSectionCut::new(DVec3::ZERO, DVec3::X));
        assert_eq!(arena.len(), 1);
        let cut = arena.remove(a).expect("Cannot remove cut");
        assert_eq!(cut.plane_normal(), DVec3::X);
        assert!(arena.is_empty());
        assert_eq!(arena.get(a).err(), Some(Error::InvalidCut(a)));
        assert!(arena.remove(a).is_err());
    }
}
