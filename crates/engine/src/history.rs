use serde::Serialize;

/// Which version the viewer is displaying. `Latest` follows new versions as
/// they are appended; `Pinned` stays put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewPointer {
    #[default]
    Latest,
    Pinned(u64),
}

impl ViewPointer {
    fn at(number: u64, current: u64) -> Self {
        if number >= current {
            Self::Latest
        } else {
            Self::Pinned(number)
        }
    }

    pub fn viewed(&self, current: u64) -> u64 {
        match self {
            Self::Latest => current,
            Self::Pinned(n) => (*n).min(current),
        }
    }

    /// One step back, never below version 1.
    pub fn undo(self, current: u64) -> Self {
        let viewed = self.viewed(current);
        Self::at(viewed.saturating_sub(1).max(1), current)
    }

    /// One step forward, never past `current`.
    pub fn redo(self, current: u64) -> Self {
        let viewed = self.viewed(current);
        Self::at(viewed.saturating_add(1).min(current), current)
    }

    /// `None` when `number` is outside `[1, current]`.
    pub fn jump(number: u64, current: u64) -> Option<Self> {
        (1..=current)
            .contains(&number)
            .then(|| Self::at(number, current))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub viewed_version: u64,
    pub current_version: u64,
    pub can_undo: bool,
    pub can_redo: bool,
    pub is_viewing_old_version: bool,
}

impl HistoryView {
    pub fn new(pointer: ViewPointer, current: u64) -> Self {
        let viewed = pointer.viewed(current);
        Self {
            viewed_version: viewed,
            current_version: current,
            can_undo: viewed > 1,
            can_redo: viewed < current,
            is_viewing_old_version: viewed != current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_floors_at_one() {
        let mut pointer = ViewPointer::Latest;
        for _ in 0..10 {
            pointer = pointer.undo(5);
        }
        assert_eq!(pointer, ViewPointer::Pinned(1));
        assert_eq!(pointer.viewed(5), 1);
    }

    #[test]
    fn redo_caps_at_current_and_unpins() {
        let mut pointer = ViewPointer::Pinned(3);
        pointer = pointer.redo(5);
        assert_eq!(pointer, ViewPointer::Pinned(4));
        pointer = pointer.redo(5);
        assert_eq!(pointer, ViewPointer::Latest);
        pointer = pointer.redo(5);
        assert_eq!(pointer, ViewPointer::Latest);
    }

    #[test]
    fn single_version_cannot_move() {
        let pointer = ViewPointer::Latest;
        assert_eq!(pointer.undo(1), ViewPointer::Latest);
        assert_eq!(pointer.redo(1), ViewPointer::Latest);
        let view = HistoryView::new(pointer, 1);
        assert!(!view.can_undo);
        assert!(!view.can_redo);
        assert!(!view.is_viewing_old_version);
    }

    #[test]
    fn jump_is_bounds_checked() {
        assert_eq!(ViewPointer::jump(0, 4), None);
        assert_eq!(ViewPointer::jump(5, 4), None);
        assert_eq!(ViewPointer::jump(2, 4), Some(ViewPointer::Pinned(2)));
        assert_eq!(ViewPointer::jump(4, 4), Some(ViewPointer::Latest));
    }

    #[test]
    fn latest_follows_new_versions_pinned_does_not() {
        assert_eq!(ViewPointer::Latest.viewed(7), 7);
        let pinned = ViewPointer::Pinned(3);
        assert_eq!(pinned.viewed(7), 3);
        let view = HistoryView::new(pinned, 7);
        assert!(view.is_viewing_old_version);
        assert!(view.can_undo);
        assert!(view.can_redo);
    }
}
