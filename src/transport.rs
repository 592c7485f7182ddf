/// LiveBuffer Transport Interface
///
/// The network collaborator. Controllers only ever talk to the backend
/// through `RowTransport`; the wire format is the implementor's business.
///
/// Read requests take an `AbortSignal`. A view aborts the signal of its
/// previous refresh before issuing a new one, and a transport should resolve
/// aborted requests with `Error::Cancelled` as soon as it notices.

use crate::aggregation::GroupKey;
use crate::error::{Error, Result};
use crate::filter::FilterGroup;
use crate::partition::{BucketKey, PartitionBy};
use crate::row::{FieldId, FieldValue, Row, RowId};
use crate::sort::SortKey;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::watch;

/// Values sent on create and update, keyed by field.
pub type RowValues = HashMap<FieldId, FieldValue>;

/// The query part shared by every read request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    /// None when filtering is disabled for the view.
    pub filters: Option<FilterGroup>,
    pub sorts: Vec<SortKey>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRowsRequest {
    pub offset: usize,
    pub limit: usize,
    pub query: RowQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchBucketRequest {
    pub partition: PartitionBy,
    pub key: BucketKey,
    pub offset: usize,
    pub limit: usize,
    pub query: RowQuery,
}

/// One page of a paged listing plus the total count of the listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub count: usize,
    pub results: Vec<Row>,
}

/// Group counts for one group-by level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCounts {
    pub fields: Vec<FieldId>,
    pub counts: Vec<(GroupKey, usize)>,
}

#[async_trait]
pub trait RowTransport: Send + Sync {
    async fn fetch_rows(&self, request: FetchRowsRequest, signal: &AbortSignal) -> Result<Page>;

    async fn fetch_count(&self, query: RowQuery, signal: &AbortSignal) -> Result<usize>;

    async fn fetch_row(&self, id: RowId) -> Result<Row>;

    async fn create_row(&self, values: RowValues) -> Result<Row>;

    async fn update_row(&self, id: RowId, values: RowValues) -> Result<Row>;

    async fn delete_row(&self, id: RowId) -> Result<()>;

    /// Move `id` directly before `before`, or to the end when None.
    async fn move_row(&self, id: RowId, before: Option<RowId>) -> Result<Row>;

    async fn fetch_bucket(&self, request: FetchBucketRequest, signal: &AbortSignal) -> Result<Page>;

    /// Counts per group for each prefix of `group_by`. Transports without
    /// aggregation support report nothing.
    async fn fetch_group_counts(
        &self,
        _group_by: Vec<FieldId>,
        _query: RowQuery,
        _signal: &AbortSignal,
    ) -> Result<Vec<GroupCounts>> {
        Ok(Vec::new())
    }
}

/// Owner side of an abort signal.
#[derive(Debug)]
pub struct AbortHandle {
    sender: watch::Sender<bool>,
}

/// Cancellation signal handed to read requests.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        AbortHandle { sender }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    /// A signal that is never aborted.
    pub fn never() -> Self {
        AbortHandle::new().signal()
    }

    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// `Err(Error::Cancelled)` once aborted.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the signal is aborted. Never resolves for a signal
    /// whose handle was dropped without aborting.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        let closed = receiver.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_abort_reaches_every_signal() {
        let handle = AbortHandle::new();
        let first = handle.signal();
        let second = first.clone();
        assert!(!first.is_aborted());
        assert!(first.check().is_ok());

        handle.abort();
        assert!(first.is_aborted());
        assert!(second.is_aborted());
        assert!(matches!(second.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_aborted_resolves_after_abort() {
        let handle = AbortHandle::new();
        let signal = handle.signal();
        let waiter = tokio::spawn(async move { signal.aborted().await });
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("abort was not observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_signal_stays_pending() {
        let signal = AbortSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(result.is_err());
    }
}
