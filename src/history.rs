use std::collections::VecDeque;

/// What an undo step undoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stroke,
    Merge,
    PlaceCut,
    Insert,
    Delete,
    AddExisting,
    Confirm,
    LoopShift,
    PathShift,
    PathSegments,
    RingSegments,
    Align,
    Smooth,
    Transform,
}

impl Action {
    /// Actions that are repeated in quick succession and share one undo step.
    pub fn coalesces(self) -> bool {
        matches!(
            self,
            Action::LoopShift | Action::PathShift | Action::PathSegments | Action::RingSegments
        )
    }
}

/**
 * Bounded stack of snapshots, each taken before the action it is tagged with.
 * The oldest snapshot is dropped once the stack is full. Repeating a
 * coalescing action keeps only the snapshot taken before the first
 * repetition.
 */
#[derive(Debug, Clone)]
pub(crate) struct History<T> {
    entries: VecDeque<(Action, T)>,
    depth: usize,
}

impl<T> History<T> {
    pub fn new(depth: usize) -> Self {
        History {
            entries: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Records the state before `action`. Returns `false` if nothing was
    /// recorded.
    pub fn push(&mut self, action: Action, snapshot: T) -> bool {
        if self.depth == 0 {
            return false;
        }
        if action.coalesces() && self.last_action() == Some(action) {
            return false;
        }
        while self.entries.len() >= self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back((action, snapshot));
        true
    }

    pub fn pop(&mut self) -> Option<(Action, T)> {
        self.entries.pop_back()
    }

    pub fn last_action(&self) -> Option<Action> {
        self.entries.back().map(|(a, _)| *a)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use super::{Action, History};

    #[test]
    fn t_bounded() {
        let mut history = History::new(3);
        for i in 0..5 {
            assert!(history.push(Action::Stroke, i));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.pop(), Some((Action::Stroke, 4)));
        assert_eq!(history.pop(), Some((Action::Stroke, 3)));
        assert_eq!(history.pop(), Some((Action::Stroke, 2)));
        assert_eq!(history.pop(), None);
        assert!(history.is_empty());
    }

    #[test]
    fn t_coalesce() {
        let mut history = History::new(10);
        assert!(history.push(Action::PathSegments, 0));
        assert!(!history.push(Action::PathSegments, 1));
        assert!(!history.push(Action::PathSegments, 2));
        assert!(history.push(Action::LoopShift, 3));
        assert!(history.push(Action::PathSegments, 4));
        // Non coalescing actions are always recorded.
        assert!(history.push(Action::Delete, 5));
        assert!(history.push(Action::Delete, 6));
        assert_eq!(history.len(), 5);
        assert_eq!(history.last_action(), Some(Action::Delete));
        history.clear();
        assert_eq!(history.pop(), None);
    }

    #[test]
    fn t_zero_depth() {
        let mut history = History::new(0);
        assert!(!history.push(Action::Stroke, ()));
        assert!(history.is_empty());
    }
}
