/// LiveBuffer - Sparse Windowed Row Buffer
///
/// Client-side synchronization core for large, server-backed, live tables.
/// A view holds a buffer as long as the table's total count where only the
/// rows near the visible window are populated, and keeps it consistent with
/// local edits, remote events, and drag reordering without refetching.

pub mod sequence;
pub mod changeset;
pub mod error;
pub mod config;
pub mod row;
pub mod buffer;
pub mod sort;
pub mod filter;
pub mod search;
pub mod membership;
pub mod range;
pub mod resolver;
pub mod reconciler;
pub mod mutation;
pub mod partition;
pub mod drag;
pub mod aggregation;
pub mod transport;
pub mod task_queue;
pub mod memory_transport;
pub mod controller;

pub use sequence::{ArraySequence, Sequence, TieredVectorSequence};
pub use changeset::{BufferChange, Changeset, IndexAdjuster, MAX_PENDING_CHANGES};
pub use error::{Error, Result};
pub use config::{BufferConfig, StorageHint};
pub use row::{Field, FieldId, FieldType, FieldValue, GroupValue, OptionId, Row, RowId, RowMeta, SelectOption};
pub use buffer::{Buffer, Slot};
pub use sort::{RowComparator, SortKey, SortOrder};
pub use filter::{Filter, FilterConjunction, FilterGroup, FilterTreeEvaluator, FilterType, StandardFilters};
pub use search::{ContainsSearch, SearchMatch, SearchMatcher};
pub use membership::{MembershipEvaluator, ViewContext, ViewDefinition};
pub use range::{FetchRange, RangeCalculator, VisibleRange};
pub use resolver::{RowIndexResolver, RowLocation};
pub use reconciler::{MembershipChange, MutationReconciler, Reconciliation};
pub use mutation::RowMutation;
pub use partition::{Bucket, BucketKey, BucketReconciliation, PartitionBy, Partitioner};
pub use drag::{DragDecision, DragReorderController, DragState, Successor};
pub use aggregation::{AggregationTracker, GroupKey};
pub use transport::{
    AbortHandle, AbortSignal, FetchBucketRequest, FetchRowsRequest, GroupCounts, Page, RowQuery, RowTransport,
    RowValues,
};
pub use task_queue::RowTaskQueue;
pub use memory_transport::{MemoryTransport, TransportCall};
pub use controller::{BucketedViewController, GridViewController};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    const NAME: FieldId = 1;
    const STATUS: FieldId = 2;

    fn fields() -> Vec<Field> {
        vec![
            Field::new(NAME, "name", FieldType::Text),
            Field::new(
                STATUS,
                "status",
                FieldType::SingleSelect {
                    options: vec![SelectOption::new(1, "Open"), SelectOption::new(2, "Closed")],
                },
            ),
        ]
    }

    fn seeded(count: u64) -> Arc<MemoryTransport> {
        let rows = (1..=count)
            .map(|i| {
                Row::new(i, i as f64)
                    .with_value(NAME, FieldValue::Text(format!("Ticket {}", i)))
                    .with_value(STATUS, FieldValue::SelectOption(1 + i % 2))
            })
            .collect();
        Arc::new(MemoryTransport::with_rows(fields(), rows))
    }

    #[tokio::test]
    async fn test_uncertain_insert_becomes_certain_after_fetch() {
        let transport = seeded(14);
        let config = BufferConfig::default()
            .with_request_size(4)
            .with_initial_window(VisibleRange::new(0, 1));
        let grid = GridViewController::new(transport.clone(), config, fields(), ViewDefinition::default());
        grid.refresh().await.unwrap();

        // Another client appends a row while most of the buffer is unfetched
        let remote = transport.insert_row(RowValues::new());
        let outcome = grid.apply_remote(RowMutation::Created(remote.clone()));
        assert_eq!(outcome.membership, MembershipChange::Entered);
        assert!(!outcome.location.unwrap().is_certain);
        assert_eq!(grid.get_count(), 15);
        assert!(grid.find_row(remote.id).is_none());

        grid.on_visible_range_changed(2, 14).await.unwrap();
        assert_eq!(grid.find_row(remote.id).map(|(i, _)| i), Some(14));

        let second = transport.insert_row(RowValues::new());
        let outcome = grid.apply_remote(RowMutation::Created(second.clone()));
        assert_eq!(outcome.location, Some(RowLocation::certain(15)));
        assert_eq!(grid.find_row(second.id).map(|(i, _)| i), Some(15));
        assert_eq!(grid.get_count(), 16);
    }

    #[tokio::test]
    async fn test_sorted_view_workflow() {
        let transport = seeded(8);
        let view = ViewDefinition {
            filters: FilterGroup::and(vec![Filter::new(STATUS, FilterType::SingleSelectEqual(2))]),
            sorts: vec![SortKey::descending(NAME)],
            group_by: vec![STATUS],
            ..ViewDefinition::default()
        };
        let grid = GridViewController::new(transport.clone(), BufferConfig::default(), fields(), view);
        grid.refresh().await.unwrap();

        // Odd tickets are closed, sorted by name descending
        let ids: Vec<_> = grid.ids().into_iter().flatten().collect();
        assert_eq!(ids, vec![7, 5, 3, 1]);
        assert_eq!(grid.aggregates().count(0, &[GroupValue::Option(2)]), Some(4));
        grid.drain_changes();

        let (_, row) = grid.find_row(3).unwrap();
        grid.update_row_value(&row, NAME, FieldValue::Text("Ticket 9".to_string()))
            .await
            .unwrap();
        let ids: Vec<_> = grid.ids().into_iter().flatten().collect();
        assert_eq!(ids, vec![3, 7, 5, 1]);

        grid.update_row_value(&row, STATUS, FieldValue::SelectOption(1))
            .await
            .unwrap();
        assert_eq!(grid.get_count(), 3);
        assert_eq!(grid.aggregates().count(0, &[GroupValue::Option(2)]), Some(3));

        let mut changes = grid.drain_changes();
        assert!(changes.iter().any(|c| matches!(c, BufferChange::SlotMoved { .. })));
        changes.retain(BufferChange::shifts_indices);
        assert_eq!(IndexAdjuster::follow(3, &changes), Some(2));
    }

    #[tokio::test]
    async fn test_config_from_json_drives_controller() {
        let config = BufferConfig::from_json(
            r#"{"request_size": 3, "storage": "fast_updates", "initial_window": {"start": 0, "end": 0}}"#,
        )
        .unwrap();
        config.validate().unwrap();

        let transport = seeded(10);
        let grid = GridViewController::new(transport.clone(), config, fields(), ViewDefinition::default());
        grid.refresh().await.unwrap();
        assert_eq!(transport.take_calls(), vec![
            TransportCall::FetchCount,
            TransportCall::FetchRows { offset: 0, limit: 1 },
        ]);

        grid.on_visible_range_changed(5, 5).await.unwrap();
        assert_eq!(transport.take_calls(), vec![TransportCall::FetchRows { offset: 4, limit: 3 }]);
    }
}
