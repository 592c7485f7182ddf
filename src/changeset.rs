/// Changeset - Change Notifications for Buffers
///
/// Buffers never hand out shared mutable rows. Every positional or content
/// change is recorded as a `BufferChange` so the rendering layer can drain
/// the changeset and diff its own state by row id.
///
/// # Usage Pattern
///
/// 1. Reconciliation and fetch merges mutate the buffer
/// 2. Each mutation pushes one or more `BufferChange` events
/// 3. Subscribers call `drain_changes()` after each action
/// 4. Subscribers adjust remembered indices with `IndexAdjuster`

use crate::row::RowId;

/// A single change to a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferChange {
    /// The buffer was discarded and rebuilt with `count` unfetched slots
    Reset { count: usize },

    /// `len` slots starting at `offset` were filled from a fetch
    SlotsFilled { offset: usize, len: usize },

    /// A slot was inserted; `populated` is false for an unfetched placeholder
    SlotInserted { index: usize, populated: bool },

    /// A slot was removed
    SlotRemoved { index: usize },

    /// A slot moved, with the semantics of remove(from) then insert(to)
    SlotMoved { from: usize, to: usize },

    /// The row in a slot was replaced by a newer version of itself
    RowReplaced { index: usize, id: RowId },
}

impl BufferChange {
    /// Returns true if this change shifts the index of later slots
    pub fn shifts_indices(&self) -> bool {
        matches!(
            self,
            BufferChange::Reset { .. }
                | BufferChange::SlotInserted { .. }
                | BufferChange::SlotRemoved { .. }
                | BufferChange::SlotMoved { .. }
        )
    }
}

/// Changes kept before an undrained log collapses into a single `Reset`.
pub const MAX_PENDING_CHANGES: usize = 4096;

/// Accumulated changes since the last drain.
///
/// Subscribers are expected to drain regularly. A log that is never drained
/// stays bounded: past `MAX_PENDING_CHANGES` entries it is replaced by one
/// `Reset`, telling the subscriber to re-read everything.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    changes: Vec<BufferChange>,
}

impl Changeset {
    pub fn new() -> Self {
        Changeset {
            changes: Vec::new(),
        }
    }

    /// Record a change. `count` is the number of slots after it.
    pub fn push(&mut self, change: BufferChange, count: usize) {
        // A reset makes everything before it irrelevant
        if matches!(change, BufferChange::Reset { .. }) {
            self.changes.clear();
        }
        self.changes.push(change);
        if self.changes.len() > MAX_PENDING_CHANGES {
            log::debug!("{} undrained changes, collapsing into a reset", self.changes.len());
            self.changes.clear();
            self.changes.push(BufferChange::Reset { count });
        }
    }

    pub fn changes(&self) -> &[BufferChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Take every pending change.
    pub fn drain(&mut self) -> Vec<BufferChange> {
        std::mem::take(&mut self.changes)
    }
}

/// Helper to keep a remembered slot index valid across buffer changes.
///
/// When a slot is inserted at I, every index >= I is incremented.
/// When a slot is removed at I, every index > I is decremented and an index
/// equal to I is gone.
pub struct IndexAdjuster;

impl IndexAdjuster {
    pub fn adjust_for_insert(index: usize, insert_index: usize) -> usize {
        if index >= insert_index {
            index + 1
        } else {
            index
        }
    }

    /// Returns None if the index was the removed slot
    pub fn adjust_for_delete(index: usize, delete_index: usize) -> Option<usize> {
        if index == delete_index {
            None
        } else if index > delete_index {
            Some(index - 1)
        } else {
            Some(index)
        }
    }

    /// Follow a remembered index through a whole list of changes. Returns
    /// None once its slot is removed or the buffer is reset.
    pub fn follow(index: usize, changes: &[BufferChange]) -> Option<usize> {
        let mut current = index;
        for change in changes {
            current = match change {
                BufferChange::Reset { .. } => return None,
                BufferChange::SlotInserted { index, .. } => Self::adjust_for_insert(current, *index),
                BufferChange::SlotRemoved { index } => Self::adjust_for_delete(current, *index)?,
                BufferChange::SlotMoved { from, to } => {
                    if current == *from {
                        *to
                    } else {
                        let removed = Self::adjust_for_delete(current, *from)?;
                        Self::adjust_for_insert(removed, *to)
                    }
                }
                BufferChange::SlotsFilled { .. } | BufferChange::RowReplaced { .. } => current,
            };
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_drain_empties() {
        let mut cs = Changeset::new();
        assert!(cs.is_empty());

        cs.push(BufferChange::SlotInserted { index: 0, populated: true }, 1);
        assert_eq!(cs.len(), 1);

        let drained = cs.drain();
        assert_eq!(drained.len(), 1);
        assert!(cs.is_empty());
    }

    #[test]
    fn test_undrained_log_collapses_into_reset() {
        let mut cs = Changeset::new();
        for index in 0..MAX_PENDING_CHANGES {
            cs.push(BufferChange::SlotInserted { index, populated: false }, index + 1);
        }
        assert_eq!(cs.len(), MAX_PENDING_CHANGES);

        cs.push(BufferChange::SlotRemoved { index: 0 }, MAX_PENDING_CHANGES - 1);
        assert_eq!(cs.changes(), &[BufferChange::Reset { count: MAX_PENDING_CHANGES - 1 }]);
        assert_eq!(IndexAdjuster::follow(3, cs.changes()), None);
    }

    #[test]
    fn test_reset_discards_earlier_changes() {
        let mut cs = Changeset::new();
        cs.push(BufferChange::SlotRemoved { index: 3 }, 11);
        cs.push(BufferChange::Reset { count: 10 }, 10);
        assert_eq!(cs.changes(), &[BufferChange::Reset { count: 10 }]);
    }

    #[test]
    fn test_index_adjuster_insert_and_delete() {
        assert_eq!(IndexAdjuster::adjust_for_insert(1, 2), 1);
        assert_eq!(IndexAdjuster::adjust_for_insert(2, 2), 3);
        assert_eq!(IndexAdjuster::adjust_for_delete(2, 2), None);
        assert_eq!(IndexAdjuster::adjust_for_delete(4, 2), Some(3));
    }

    #[test]
    fn test_follow_through_move() {
        let changes = vec![
            BufferChange::SlotMoved { from: 5, to: 1 },
            BufferChange::SlotsFilled { offset: 0, len: 3 },
        ];
        // The moved slot lands at its target
        assert_eq!(IndexAdjuster::follow(5, &changes), Some(1));
        // A slot between target and source shifts down by one
        assert_eq!(IndexAdjuster::follow(3, &changes), Some(4));
        // A slot after the source is unaffected
        assert_eq!(IndexAdjuster::follow(7, &changes), Some(7));
    }

    #[test]
    fn test_follow_lost_on_removal_or_reset() {
        assert_eq!(
            IndexAdjuster::follow(2, &[BufferChange::SlotRemoved { index: 2 }]),
            None
        );
        assert_eq!(
            IndexAdjuster::follow(2, &[BufferChange::Reset { count: 4 }]),
            None
        );
    }
}
