/// LiveBuffer Row Mutations
///
/// A `RowMutation` is a command object describing one change to a row. It
/// can be applied to a buffer through the reconciler, and it knows its own
/// exact inverse, so rolling back an optimistic change is just applying
/// `mutation.inverse()`.
///
/// # Examples
///
/// ```
/// use livebuffer::{Buffer, Row, RowMutation, StorageHint, ViewContext, ViewDefinition};
///
/// let view = ViewContext::new(Vec::new(), ViewDefinition::default());
/// let mut buffer = Buffer::with_count(0, StorageHint::FastReads);
///
/// let create = RowMutation::Created(Row::new(1, 1.0));
/// create.apply(&mut buffer, &view);
/// assert_eq!(buffer.len(), 1);
///
/// create.inverse().apply(&mut buffer, &view);
/// assert_eq!(buffer.len(), 0);
/// ```

use crate::buffer::Buffer;
use crate::membership::ViewContext;
use crate::reconciler::{MutationReconciler, Reconciliation};
use crate::row::{Row, RowId};

#[derive(Debug, Clone)]
pub enum RowMutation {
    Created(Row),
    Updated { old: Row, new: Row },
    Deleted(Row),
    /// The row's `order` changed.
    Moved { old: Row, new: Row },
}

impl RowMutation {
    pub fn row_id(&self) -> RowId {
        match self {
            RowMutation::Created(row) | RowMutation::Deleted(row) => row.id,
            RowMutation::Updated { new, .. } | RowMutation::Moved { new, .. } => new.id,
        }
    }

    /// The row as it was before the change, None for a creation.
    pub fn before(&self) -> Option<&Row> {
        match self {
            RowMutation::Created(_) => None,
            RowMutation::Deleted(row) => Some(row),
            RowMutation::Updated { old, .. } | RowMutation::Moved { old, .. } => Some(old),
        }
    }

    /// The row as it is after the change, None for a deletion.
    pub fn after(&self) -> Option<&Row> {
        match self {
            RowMutation::Created(row) => Some(row),
            RowMutation::Deleted(_) => None,
            RowMutation::Updated { new, .. } | RowMutation::Moved { new, .. } => Some(new),
        }
    }

    /// The mutation that undoes this one.
    pub fn inverse(&self) -> RowMutation {
        match self {
            RowMutation::Created(row) => RowMutation::Deleted(row.clone()),
            RowMutation::Deleted(row) => RowMutation::Created(row.clone()),
            RowMutation::Updated { old, new } => RowMutation::Updated {
                old: new.clone(),
                new: old.clone(),
            },
            RowMutation::Moved { old, new } => RowMutation::Moved {
                old: new.clone(),
                new: old.clone(),
            },
        }
    }

    pub fn apply(&self, buffer: &mut Buffer, view: &ViewContext) -> Reconciliation {
        match self {
            RowMutation::Created(row) => MutationReconciler::row_created(buffer, view, row.clone()),
            RowMutation::Updated { old, new } => {
                MutationReconciler::row_updated(buffer, view, old, new.clone())
            }
            RowMutation::Deleted(row) => MutationReconciler::row_deleted(buffer, view, row),
            RowMutation::Moved { old, new } => {
                MutationReconciler::row_moved(buffer, view, old, new.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageHint;
    use crate::membership::ViewDefinition;
    use crate::reconciler::MembershipChange;
    use crate::row::{Field, FieldType, FieldValue};

    fn view() -> ViewContext {
        ViewContext::new(vec![Field::new(1, "name", FieldType::Text)], ViewDefinition::default())
    }

    fn populated(ids: &[u64]) -> Buffer {
        let mut buffer = Buffer::with_count(ids.len(), StorageHint::FastReads);
        buffer.fill(0, ids.iter().map(|&id| Row::new(id, id as f64)).collect());
        buffer
    }

    #[test]
    fn test_inverse_pairs() {
        let old = Row::new(1, 1.0);
        let new = Row::new(1, 2.0);
        let update = RowMutation::Updated {
            old: old.clone(),
            new: new.clone(),
        };
        match update.inverse() {
            RowMutation::Updated { old: o, new: n } => {
                assert_eq!(o.order, 2.0);
                assert_eq!(n.order, 1.0);
            }
            other => panic!("unexpected inverse {:?}", other),
        }
        assert!(matches!(RowMutation::Created(old.clone()).inverse(), RowMutation::Deleted(_)));
        assert!(matches!(RowMutation::Deleted(old).inverse(), RowMutation::Created(_)));
    }

    #[test]
    fn test_update_then_inverse_restores_buffer() {
        let view = view();
        let mut buffer = populated(&[1, 2, 3]);
        let old = buffer.row(0).cloned().unwrap();
        let new = old.with_changes(&[(1, FieldValue::Text("x".to_string()))].into_iter().collect());
        let mut new = new;
        new.order = 2.5;

        let update = RowMutation::Updated { old, new };
        update.apply(&mut buffer, &view);
        assert_eq!(buffer.ids(), vec![Some(2), Some(1), Some(3)]);

        update.inverse().apply(&mut buffer, &view);
        assert_eq!(buffer.ids(), vec![Some(1), Some(2), Some(3)]);
        assert!(buffer.row(0).unwrap().value(1).is_null());
    }

    #[test]
    fn test_delete_then_inverse_restores_row() {
        let view = view();
        let mut buffer = populated(&[1, 2, 3]);
        let deleted = RowMutation::Deleted(Row::new(2, 2.0));
        let outcome = deleted.apply(&mut buffer, &view);
        assert_eq!(outcome.membership, MembershipChange::Left);
        assert_eq!(buffer.len(), 2);

        deleted.inverse().apply(&mut buffer, &view);
        assert_eq!(buffer.ids(), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_before_and_after() {
        let row = Row::new(4, 1.0);
        let created = RowMutation::Created(row.clone());
        assert!(created.before().is_none());
        assert_eq!(created.after().map(|r| r.id), Some(4));
        assert_eq!(RowMutation::Deleted(row).row_id(), 4);
    }
}
