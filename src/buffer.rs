/// LiveBuffer Sparse Row Buffer
///
/// A Buffer is an ordered sequence whose length is the known total count of
/// the collection. Each slot is either a populated `Row` or `Slot::Unfetched`,
/// a placeholder for a row that is counted but not loaded. Populated slots
/// are always in view sort order.
///
/// The buffer only provides positional primitives. Deciding *where* a row
/// goes is the job of `RowIndexResolver` and `MutationReconciler`.
///
/// # Examples
///
/// ```
/// use livebuffer::{Buffer, Row, StorageHint};
///
/// let mut buffer = Buffer::with_count(5, StorageHint::FastUpdates);
/// buffer.fill(1, vec![Row::new(2, 2.0), Row::new(3, 3.0)]);
///
/// assert_eq!(buffer.len(), 5);
/// assert!(buffer.is_unfetched(0));
/// assert_eq!(buffer.row(2).map(|r| r.id), Some(3));
/// ```

use crate::changeset::{BufferChange, Changeset};
use crate::config::StorageHint;
use crate::row::{Row, RowId};
use crate::sequence::{new_sequence, Sequence};

/// One position in a buffer
#[derive(Debug, Clone)]
pub enum Slot {
    Unfetched,
    Row(Row),
}

impl Slot {
    pub fn row(&self) -> Option<&Row> {
        match self {
            Slot::Row(row) => Some(row),
            Slot::Unfetched => None,
        }
    }

    pub fn is_unfetched(&self) -> bool {
        matches!(self, Slot::Unfetched)
    }

    pub fn id(&self) -> Option<RowId> {
        self.row().map(|r| r.id)
    }
}

#[derive(Debug)]
pub struct Buffer {
    slots: Box<dyn Sequence<Slot>>,
    storage: StorageHint,
    changes: Changeset,
}

impl Buffer {
    pub fn new(storage: StorageHint) -> Self {
        Self::with_count(0, storage)
    }

    /// A buffer of `count` unfetched slots.
    pub fn with_count(count: usize, storage: StorageHint) -> Self {
        Buffer {
            slots: new_sequence(storage, Slot::Unfetched, count),
            storage,
            changes: Changeset::new(),
        }
    }

    /// Discard every slot and start over with `count` unfetched ones.
    pub fn reset(&mut self, count: usize) {
        self.slots = new_sequence(self.storage, Slot::Unfetched, count);
        self.record(BufferChange::Reset { count });
    }

    /// The known total count of the collection.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.slots.get(index).and_then(Slot::row)
    }

    /// False for populated slots and for indices outside the buffer.
    pub fn is_unfetched(&self, index: usize) -> bool {
        self.slots.get(index).map(Slot::is_unfetched).unwrap_or(false)
    }

    pub fn is_populated(&self, index: usize) -> bool {
        self.row(index).is_some()
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &Slot> + '_> {
        self.slots.iter()
    }

    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id() == Some(id))
    }

    pub fn find_row(&self, id: RowId) -> Option<(usize, &Row)> {
        self.slots
            .iter()
            .enumerate()
            .find_map(|(index, slot)| slot.row().filter(|r| r.id == id).map(|r| (index, r)))
    }

    pub fn populated_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_unfetched()).count()
    }

    /// Place fetched rows at `offset..offset + rows.len()`. Rows falling past
    /// the end of the buffer are dropped. Returns how many slots were filled.
    pub fn fill(&mut self, offset: usize, rows: Vec<Row>) -> usize {
        let mut filled = 0;
        for (i, row) in rows.into_iter().enumerate() {
            let index = offset + i;
            if self.slots.set(index, Slot::Row(row)).is_err() {
                break;
            }
            filled += 1;
        }
        if filled > 0 {
            self.record(BufferChange::SlotsFilled { offset, len: filled });
        }
        filled
    }

    /// Insert a populated row; indices past the end append.
    pub fn insert_row(&mut self, index: usize, row: Row) -> usize {
        self.insert_slot(index, Slot::Row(row))
    }

    /// Insert an unfetched placeholder; indices past the end append.
    pub fn insert_unfetched(&mut self, index: usize) -> usize {
        self.insert_slot(index, Slot::Unfetched)
    }

    fn insert_slot(&mut self, index: usize, slot: Slot) -> usize {
        let index = index.min(self.len());
        let populated = !slot.is_unfetched();
        if self.slots.insert(index, slot).is_ok() {
            self.record(BufferChange::SlotInserted { index, populated });
        }
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<Slot> {
        let slot = self.slots.delete(index).ok()?;
        self.record(BufferChange::SlotRemoved { index });
        Some(slot)
    }

    /// Replace the row in a populated slot with a newer version of itself.
    pub fn replace_row(&mut self, index: usize, row: Row) -> Option<Row> {
        if !self.is_populated(index) {
            return None;
        }
        let id = row.id;
        let previous = self.slots.set(index, Slot::Row(row)).ok()?;
        self.record(BufferChange::RowReplaced { index, id });
        previous.row().cloned()
    }

    /// Apply `f` to the row in a populated slot and record the replacement.
    pub fn update_row<F>(&mut self, index: usize, f: F) -> bool
    where
        F: FnOnce(&mut Row),
    {
        let id = match self.slots.get_mut(index) {
            Some(Slot::Row(row)) => {
                f(row);
                row.id
            }
            _ => return false,
        };
        self.record(BufferChange::RowReplaced { index, id });
        true
    }

    /// Move a slot with remove-then-insert semantics. `to` is clamped.
    pub fn move_slot(&mut self, from: usize, to: usize) -> bool {
        if from >= self.len() {
            return false;
        }
        let to = to.min(self.len() - 1);
        if from == to {
            return true;
        }
        let Ok(slot) = self.slots.delete(from) else {
            return false;
        };
        if self.slots.insert(to, slot).is_err() {
            return false;
        }
        self.record(BufferChange::SlotMoved { from, to });
        true
    }

    /// Apply `f` to every populated row, recording each as replaced. Used by
    /// bulk search re-evaluation.
    pub fn for_each_row_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Row),
    {
        for index in 0..self.slots.len() {
            let id = match self.slots.get_mut(index) {
                Some(Slot::Row(row)) => {
                    f(row);
                    row.id
                }
                _ => continue,
            };
            self.record(BufferChange::RowReplaced { index, id });
        }
    }

    fn record(&mut self, change: BufferChange) {
        let count = self.slots.len();
        self.changes.push(change, count);
    }

    pub fn changes(&self) -> &[BufferChange] {
        self.changes.changes()
    }

    /// Take the pending changes. An undrained log is capped at
    /// `MAX_PENDING_CHANGES` and then collapses into a `Reset`.
    pub fn drain_changes(&mut self) -> Vec<BufferChange> {
        self.changes.drain()
    }

    /// Slot ids in order, `None` for unfetched. Handy for assertions.
    pub fn ids(&self) -> Vec<Option<RowId>> {
        self.slots.iter().map(Slot::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(ids: std::ops::RangeInclusive<u64>) -> Vec<Row> {
        ids.map(|id| Row::new(id, id as f64)).collect()
    }

    #[test]
    fn test_with_count_is_all_unfetched() {
        let buffer = Buffer::with_count(14, StorageHint::FastReads);
        assert_eq!(buffer.len(), 14);
        assert_eq!(buffer.populated_count(), 0);
        assert!((0..14).all(|i| buffer.is_unfetched(i)));
        assert!(!buffer.is_unfetched(14));
    }

    #[test]
    fn test_fill_drops_rows_past_end() {
        let mut buffer = Buffer::with_count(3, StorageHint::FastUpdates);
        let filled = buffer.fill(1, rows(1..=4));
        assert_eq!(filled, 2);
        assert_eq!(buffer.ids(), vec![None, Some(1), Some(2)]);
        assert_eq!(
            buffer.drain_changes(),
            vec![BufferChange::SlotsFilled { offset: 1, len: 2 }]
        );
    }

    #[test]
    fn test_insert_and_remove_change_count() {
        let mut buffer = Buffer::with_count(2, StorageHint::FastUpdates);
        buffer.insert_row(1, Row::new(9, 1.0));
        buffer.insert_unfetched(10);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.ids(), vec![None, Some(9), None, None]);

        let removed = buffer.remove(1).unwrap();
        assert_eq!(removed.id(), Some(9));
        assert_eq!(buffer.len(), 3);
        assert!(buffer.remove(3).is_none());
    }

    #[test]
    fn test_move_slot() {
        let mut buffer = Buffer::with_count(4, StorageHint::FastReads);
        buffer.fill(0, rows(1..=4));
        assert!(buffer.move_slot(0, 2));
        assert_eq!(buffer.ids(), vec![Some(2), Some(3), Some(1), Some(4)]);
        assert!(buffer.move_slot(3, 0));
        assert_eq!(buffer.ids(), vec![Some(4), Some(2), Some(3), Some(1)]);
        assert!(!buffer.move_slot(4, 0));
    }

    #[test]
    fn test_replace_row_requires_populated_slot() {
        let mut buffer = Buffer::with_count(2, StorageHint::FastReads);
        buffer.fill(0, rows(1..=1));
        assert!(buffer.replace_row(1, Row::new(5, 5.0)).is_none());
        let previous = buffer.replace_row(0, Row::new(1, 10.0)).unwrap();
        assert_eq!(previous.order, 1.0);
        assert_eq!(buffer.row(0).map(|r| r.order), Some(10.0));
    }

    #[test]
    fn test_reset_clears_rows() {
        let mut buffer = Buffer::with_count(3, StorageHint::FastUpdates);
        buffer.fill(0, rows(1..=3));
        buffer.reset(5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.populated_count(), 0);
        assert_eq!(buffer.drain_changes(), vec![BufferChange::Reset { count: 5 }]);
    }

    #[test]
    fn test_undrained_changes_stay_bounded() {
        use crate::changeset::MAX_PENDING_CHANGES;

        let mut buffer = Buffer::with_count(4, StorageHint::FastReads);
        buffer.drain_changes();
        for _ in 0..MAX_PENDING_CHANGES {
            buffer.fill(0, rows(1..=4));
            buffer.move_slot(0, 3);
        }
        assert!(buffer.changes().len() <= MAX_PENDING_CHANGES);
        assert_eq!(buffer.changes()[0], BufferChange::Reset { count: 4 });
        assert_eq!(buffer.populated_count(), 4);
    }
}
