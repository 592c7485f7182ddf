/// LiveBuffer Partitioner
///
/// Calendar and board views split their rows into buckets keyed by a field
/// value: a calendar day or a single select option. Each bucket holds the
/// bucket's total `count` and a fetched prefix of its rows in view order,
/// loaded page by page.
///
/// Events are reconciled per bucket with the same rules as a flat buffer:
/// an insertion point inside the fetched prefix (or at its end, once the
/// prefix covers the whole bucket) is certain and the row is materialised;
/// past the end of an incomplete prefix it is not, but the count still moves.
///
/// Buckets are created lazily and are never removed implicitly, even at a
/// count of zero: the day or option they stand for still exists.
///
/// # Examples
///
/// ```
/// use livebuffer::{BucketKey, FieldValue, PartitionBy, Partitioner, Row, ViewContext, ViewDefinition};
///
/// let view = ViewContext::new(Vec::new(), ViewDefinition::default());
/// let mut board = Partitioner::new(PartitionBy::SingleSelect { field: 1 });
///
/// board.row_created(&view, Row::new(1, 1.0).with_value(1, FieldValue::SelectOption(7)));
/// assert_eq!(board.bucket(&BucketKey::Option(7)).map(|b| b.count), Some(1));
/// ```

use crate::changeset::{BufferChange, Changeset};
use crate::membership::ViewContext;
use crate::mutation::RowMutation;
use crate::reconciler::MembershipChange;
use crate::resolver::RowLocation;
use crate::row::{FieldId, OptionId, Row, RowId};
use crate::sort::RowComparator;
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Discrete value owning a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BucketKey {
    /// Rows with an empty partition field.
    Null,
    Day(NaiveDate),
    Option(OptionId),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Null => write!(f, "null"),
            BucketKey::Day(day) => write!(f, "{}", day),
            BucketKey::Option(id) => write!(f, "option:{}", id),
        }
    }
}

/// How rows map to bucket keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionBy {
    /// One bucket per calendar day. Date-times are shifted into `offset`
    /// before taking the day.
    Date { field: FieldId, offset: FixedOffset },
    /// One bucket per option id. Unknown ids get their own bucket.
    SingleSelect { field: FieldId },
}

impl PartitionBy {
    pub fn field(&self) -> FieldId {
        match self {
            PartitionBy::Date { field, .. } | PartitionBy::SingleSelect { field } => *field,
        }
    }

    pub fn key_for(&self, row: &Row) -> BucketKey {
        let value = row.value(self.field());
        let key = match self {
            PartitionBy::Date { offset, .. } => value.as_day(*offset).map(BucketKey::Day),
            PartitionBy::SingleSelect { .. } => value.as_option_id().map(BucketKey::Option),
        };
        key.unwrap_or(BucketKey::Null)
    }
}

/// The rows of one bucket: a total count and a fetched prefix.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub count: usize,
    pub results: Vec<Row>,
    /// A fetch-more request is in flight.
    pub loading: bool,
    changes: Changeset,
}

impl Bucket {
    pub fn new(count: usize, results: Vec<Row>) -> Self {
        let len = results.len();
        let mut bucket = Bucket {
            count,
            results,
            loading: false,
            changes: Changeset::new(),
        };
        bucket.record(BufferChange::Reset { count });
        if len > 0 {
            bucket.record(BufferChange::SlotsFilled { offset: 0, len });
        }
        bucket
    }

    /// True when every row of the bucket has been fetched.
    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.count
    }

    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.results.iter().position(|r| r.id == id)
    }

    /// Index in `results` before which `row` belongs. The row's own entry is
    /// skipped.
    pub fn insertion_point(&self, comparator: &RowComparator, row: &Row) -> RowLocation {
        for (index, other) in self.results.iter().enumerate() {
            if other.id == row.id {
                continue;
            }
            if comparator.compare(row, other) == Ordering::Less {
                return RowLocation::certain(index);
            }
        }
        RowLocation {
            index: self.results.len(),
            is_certain: self.is_complete(),
        }
    }

    pub fn changes(&self) -> &[BufferChange] {
        self.changes.changes()
    }

    pub fn drain_changes(&mut self) -> Vec<BufferChange> {
        self.changes.drain()
    }

    /// Append a fetched page, skipping rows already present. Returns how
    /// many rows were added.
    fn append_page(&mut self, rows: Vec<Row>) -> usize {
        let offset = self.results.len();
        for row in rows {
            if self.position_of(row.id).is_none() {
                self.results.push(row);
            }
        }
        let added = self.results.len() - offset;
        if added > 0 {
            self.record(BufferChange::SlotsFilled { offset, len: added });
        }
        added
    }

    /// Insert a member row. The count grows whether or not the row lands in
    /// the fetched prefix.
    fn insert(&mut self, comparator: &RowComparator, row: Row) -> RowLocation {
        let location = self.insertion_point(comparator, &row);
        if location.is_certain {
            self.results.insert(location.index, row);
        }
        self.count += 1;
        self.record(BufferChange::SlotInserted {
            index: location.index,
            populated: location.is_certain,
        });
        location
    }

    fn record(&mut self, change: BufferChange) {
        let count = self.count;
        self.changes.push(change, count);
    }

    fn remove(&mut self, id: RowId) -> Option<Row> {
        let index = self.position_of(id)?;
        self.record(BufferChange::SlotRemoved { index });
        Some(self.results.remove(index))
    }
}

/// Result of reconciling one event against the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketReconciliation {
    pub membership: MembershipChange,
    /// Bucket the row was counted in before the event.
    pub source: Option<BucketKey>,
    /// Bucket the row is counted in after the event.
    pub target: Option<BucketKey>,
    /// Whether the row is materialised in the target bucket's results.
    pub materialized: bool,
}

impl BucketReconciliation {
    fn outside() -> Self {
        BucketReconciliation {
            membership: MembershipChange::Outside,
            source: None,
            target: None,
            materialized: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Partitioner {
    by: PartitionBy,
    buckets: BTreeMap<BucketKey, Bucket>,
}

impl Partitioner {
    pub fn new(by: PartitionBy) -> Self {
        Partitioner {
            by,
            buckets: BTreeMap::new(),
        }
    }

    pub fn partition_by(&self) -> PartitionBy {
        self.by
    }

    pub fn key_for(&self, row: &Row) -> BucketKey {
        self.by.key_for(row)
    }

    pub fn bucket(&self, key: &BucketKey) -> Option<&Bucket> {
        self.buckets.get(key)
    }

    pub fn bucket_mut(&mut self, key: &BucketKey) -> Option<&mut Bucket> {
        self.buckets.get_mut(key)
    }

    pub fn keys(&self) -> Vec<BucketKey> {
        self.buckets.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// A materialised row and the bucket holding it.
    pub fn find_row(&self, id: RowId) -> Option<(BucketKey, &Row)> {
        self.buckets.iter().find_map(|(key, bucket)| {
            bucket
                .position_of(id)
                .map(|index| (*key, &bucket.results[index]))
        })
    }

    /// Total count over every bucket.
    pub fn total_count(&self) -> usize {
        self.buckets.values().map(|b| b.count).sum()
    }

    fn bucket_or_create(&mut self, key: BucketKey) -> &mut Bucket {
        self.buckets.entry(key).or_insert_with(|| {
            log::debug!("creating bucket {}", key);
            Bucket::new(0, Vec::new())
        })
    }

    /// Install a freshly fetched first page for `key`.
    pub fn set_bucket(&mut self, key: BucketKey, count: usize, rows: Vec<Row>) {
        self.buckets.insert(key, Bucket::new(count, rows));
    }

    /// Merge a fetch-more page into `key`, creating the bucket if a response
    /// introduces it. The server's count replaces the local one.
    pub fn merge_page(&mut self, key: BucketKey, count: usize, rows: Vec<Row>) -> usize {
        let bucket = self.bucket_or_create(key);
        bucket.count = count;
        bucket.loading = false;
        bucket.append_page(rows)
    }

    /// Apply `f` to a materialised row in place, without touching its
    /// position or bucket. Returns false when the row is not loaded.
    pub fn update_row<F>(&mut self, id: RowId, f: F) -> bool
    where
        F: FnOnce(&mut Row),
    {
        for bucket in self.buckets.values_mut() {
            if let Some(index) = bucket.position_of(id) {
                f(&mut bucket.results[index]);
                bucket.record(BufferChange::RowReplaced { index, id });
                return true;
            }
        }
        false
    }

    /// Explicitly drop a bucket, e.g. when its select option was deleted.
    pub fn remove_bucket(&mut self, key: &BucketKey) -> Option<Bucket> {
        self.buckets.remove(key)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn row_created(&mut self, view: &ViewContext, row: Row) -> BucketReconciliation {
        let mut row = row;
        view.annotate(&mut row);
        if !view.is_visible(&row, None) {
            return BucketReconciliation::outside();
        }

        let key = self.key_for(&row);
        let existing = self
            .buckets
            .get(&key)
            .and_then(|b| b.position_of(row.id).map(|i| b.results[i].clone()));
        if let Some(existing) = existing {
            return self.row_updated(view, &existing, row);
        }

        let location = self.insert_into(view, key, row);
        BucketReconciliation {
            membership: MembershipChange::Entered,
            source: None,
            target: Some(key),
            materialized: location.is_certain,
        }
    }

    pub fn row_updated(&mut self, view: &ViewContext, old: &Row, new: Row) -> BucketReconciliation {
        let was_member = view.is_visible(old, None);
        let is_member = view.is_visible(&new, None);

        match (was_member, is_member) {
            (true, true) => {
                let source = self.key_for(old);
                let target = self.key_for(&new);
                let materialized = if source == target {
                    self.reposition(view, source, old, new)
                } else {
                    let mut new = new;
                    if let Some(previous) = self.remove_from(source, old.id) {
                        new.meta = previous.meta;
                    }
                    view.annotate(&mut new);
                    self.insert_into(view, target, new).is_certain
                };
                BucketReconciliation {
                    membership: MembershipChange::Stayed,
                    source: Some(source),
                    target: Some(target),
                    materialized,
                }
            }
            (true, false) => {
                let source = self.key_for(old);
                self.remove_from(source, old.id);
                BucketReconciliation {
                    membership: MembershipChange::Left,
                    source: Some(source),
                    target: None,
                    materialized: false,
                }
            }
            (false, true) => {
                let mut reconciled = self.row_created(view, new);
                reconciled.membership = MembershipChange::Entered;
                reconciled
            }
            (false, false) => BucketReconciliation::outside(),
        }
    }

    pub fn row_deleted(&mut self, view: &ViewContext, row: &Row) -> BucketReconciliation {
        if !view.is_visible(row, None) {
            return BucketReconciliation::outside();
        }
        let source = self.key_for(row);
        self.remove_from(source, row.id);
        BucketReconciliation {
            membership: MembershipChange::Left,
            source: Some(source),
            target: None,
            materialized: false,
        }
    }

    pub fn apply(&mut self, view: &ViewContext, mutation: &RowMutation) -> BucketReconciliation {
        match mutation {
            RowMutation::Created(row) => self.row_created(view, row.clone()),
            RowMutation::Updated { old, new } | RowMutation::Moved { old, new } => {
                self.row_updated(view, old, new.clone())
            }
            RowMutation::Deleted(row) => self.row_deleted(view, row),
        }
    }

    fn insert_into(&mut self, view: &ViewContext, key: BucketKey, row: Row) -> RowLocation {
        let bucket = self.bucket_or_create(key);
        bucket.insert(view.comparator(), row)
    }

    /// Remove a member row from its bucket, decrementing the count whether
    /// or not the row was materialised.
    fn remove_from(&mut self, key: BucketKey, id: RowId) -> Option<Row> {
        let Some(bucket) = self.buckets.get_mut(&key) else {
            log::warn!("row {} removed from unknown bucket {}", id, key);
            return None;
        };
        bucket.count = bucket.count.saturating_sub(1);
        let removed = bucket.remove(id);
        if removed.is_none() {
            let index = bucket.results.len();
            bucket.record(BufferChange::SlotRemoved { index });
        }
        removed
    }

    /// Update within one bucket. Returns whether the row ends up
    /// materialised.
    fn reposition(&mut self, view: &ViewContext, key: BucketKey, old: &Row, new: Row) -> bool {
        let bucket = self.bucket_or_create(key);
        let mut new = new;
        let from = bucket.position_of(old.id);
        if let Some(from) = from {
            new.meta = bucket.results[from].meta.clone();
        }
        view.annotate(&mut new);
        let location = bucket.insertion_point(view.comparator(), &new);

        match from {
            Some(from) if location.is_certain => {
                let to = if location.index > from {
                    location.index - 1
                } else {
                    location.index
                };
                let id = new.id;
                bucket.results[from] = new;
                bucket.record(BufferChange::RowReplaced { index: from, id });
                if to != from {
                    let row = bucket.results.remove(from);
                    bucket.results.insert(to, row);
                    bucket.record(BufferChange::SlotMoved { from, to });
                }
                true
            }
            Some(from) => {
                // Moved past the fetched prefix
                bucket.results.remove(from);
                bucket.record(BufferChange::SlotRemoved { index: from });
                false
            }
            None if location.is_certain && location.index < bucket.results.len() => {
                // Moved into the fetched prefix
                bucket.results.insert(location.index, new);
                bucket.record(BufferChange::SlotInserted {
                    index: location.index,
                    populated: true,
                });
                true
            }
            None => false,
        }
    }
}
