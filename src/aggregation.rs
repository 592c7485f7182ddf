/// LiveBuffer Aggregation Tracker
///
/// Keeps group-by counts in step with the reconciler. For group-by fields
/// `[f1, f2, ...]` there is one level per prefix (`[f1]`, `[f1, f2]`, ...),
/// matching nested group headers; each level maps a tuple of group values
/// to the number of member rows carrying it.
///
/// Group equality comes from `FieldType::group_key`, so single selects
/// compare option ids and dates compare days.
///
/// Counts may reach zero and stay, so an emptied group keeps its header.

use crate::mutation::RowMutation;
use crate::reconciler::{MembershipChange, Reconciliation};
use crate::row::{Field, FieldId, FieldType, GroupValue, Row};
use std::collections::BTreeMap;

pub type GroupKey = Vec<GroupValue>;

#[derive(Debug, Clone, Default)]
pub struct AggregationTracker {
    group_by: Vec<(FieldId, FieldType)>,
    levels: Vec<BTreeMap<GroupKey, usize>>,
}

impl AggregationTracker {
    /// Track the given group-by fields. Unknown fields are skipped.
    pub fn new(group_by: &[FieldId], fields: &[Field]) -> Self {
        let group_by: Vec<(FieldId, FieldType)> = group_by
            .iter()
            .filter_map(|id| {
                fields
                    .iter()
                    .find(|f| f.id == *id)
                    .map(|f| (f.id, f.field_type.clone()))
            })
            .collect();
        let levels = vec![BTreeMap::new(); group_by.len()];
        AggregationTracker { group_by, levels }
    }

    /// Number of levels, one per group-by field.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn group_by(&self) -> Vec<FieldId> {
        self.group_by.iter().map(|(id, _)| *id).collect()
    }

    /// The key of `row` at `level` (0-based): its group values for the
    /// first `level + 1` fields.
    pub fn group_key(&self, row: &Row, level: usize) -> GroupKey {
        self.group_by
            .iter()
            .take(level + 1)
            .map(|(field, field_type)| field_type.group_key(row.value(*field)))
            .collect()
    }

    pub fn count(&self, level: usize, key: &[GroupValue]) -> Option<usize> {
        self.levels.get(level).and_then(|counts| counts.get(key).copied())
    }

    pub fn counts(&self, level: usize) -> Option<&BTreeMap<GroupKey, usize>> {
        self.levels.get(level)
    }

    /// Replace one level with counts reported by the server.
    pub fn set_counts<I>(&mut self, level: usize, counts: I)
    where
        I: IntoIterator<Item = (GroupKey, usize)>,
    {
        if let Some(map) = self.levels.get_mut(level) {
            *map = counts.into_iter().collect();
        }
    }

    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.clear();
        }
    }

    pub fn on_created(&mut self, row: &Row) {
        for level in 0..self.depth() {
            let key = self.group_key(row, level);
            *self.levels[level].entry(key).or_insert(0) += 1;
        }
    }

    pub fn on_deleted(&mut self, row: &Row) {
        for level in 0..self.depth() {
            let key = self.group_key(row, level);
            let count = self.levels[level].entry(key).or_insert(0);
            *count = count.saturating_sub(1);
        }
    }

    /// Move the row between groups at every level where its key changed.
    pub fn on_updated(&mut self, old: &Row, new: &Row) {
        for level in 0..self.depth() {
            let old_key = self.group_key(old, level);
            let new_key = self.group_key(new, level);
            if old_key == new_key {
                continue;
            }
            let count = self.levels[level].entry(old_key).or_insert(0);
            *count = count.saturating_sub(1);
            *self.levels[level].entry(new_key).or_insert(0) += 1;
        }
    }

    /// Follow a reconciled mutation.
    pub fn apply(&mut self, mutation: &RowMutation, outcome: &Reconciliation) {
        self.apply_membership(mutation, outcome.membership);
    }

    pub fn apply_membership(&mut self, mutation: &RowMutation, membership: MembershipChange) {
        match (membership, mutation.before(), mutation.after()) {
            (MembershipChange::Entered, _, Some(row)) => self.on_created(row),
            (MembershipChange::Left, Some(row), _) => self.on_deleted(row),
            (MembershipChange::Stayed, Some(old), Some(new)) => self.on_updated(old, new),
            _ => {}
        }
    }
}
