/// In-memory Transport
///
/// A `RowTransport` backed by a plain row list, evaluating filters, search
/// and sorts with the crate's own evaluators. Used by tests, benchmarks and
/// the demo binary.
///
/// Two hooks make failure paths testable:
/// - `fail_next` makes the next call return the given error
/// - `hold` parks every call until `release`; parked reads still honour
///   their abort signal

use crate::aggregation::AggregationTracker;
use crate::error::{Error, Result};
use crate::membership::{ViewContext, ViewDefinition};
use crate::row::{Field, FieldId, Row, RowId};
use crate::transport::{
    AbortSignal, FetchBucketRequest, FetchRowsRequest, GroupCounts, Page, RowQuery, RowTransport, RowValues,
};
use crate::partition::BucketKey;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

/// A call received by the transport, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    FetchRows { offset: usize, limit: usize },
    FetchCount,
    FetchRow(RowId),
    CreateRow,
    UpdateRow(RowId),
    DeleteRow(RowId),
    MoveRow { id: RowId, before: Option<RowId> },
    FetchBucket { key: BucketKey, offset: usize, limit: usize },
    FetchGroupCounts,
}

#[derive(Debug)]
struct ServerRows {
    rows: Vec<Row>,
    next_id: RowId,
    fail_next: Option<Error>,
}

#[derive(Debug)]
pub struct MemoryTransport {
    fields: Vec<Field>,
    server: Mutex<ServerRows>,
    calls: Mutex<Vec<TransportCall>>,
    /// true while calls are held
    gate: watch::Sender<bool>,
}

impl MemoryTransport {
    pub fn new(fields: Vec<Field>) -> Self {
        Self::with_rows(fields, Vec::new())
    }

    pub fn with_rows(fields: Vec<Field>, rows: Vec<Row>) -> Self {
        let next_id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let (gate, _) = watch::channel(false);
        MemoryTransport {
            fields,
            server: Mutex::new(ServerRows {
                rows,
                next_id,
                fail_next: None,
            }),
            calls: Mutex::new(Vec::new()),
            gate,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Server-side rows, in `order`.
    pub fn rows(&self) -> Vec<Row> {
        let mut rows = self.server.lock().rows.clone();
        rows.sort_by(|a, b| a.order.total_cmp(&b.order).then(a.id.cmp(&b.id)));
        rows
    }

    pub fn row(&self, id: RowId) -> Option<Row> {
        self.server.lock().rows.iter().find(|r| r.id == id).cloned()
    }

    /// Add a row on the server side without recording a call, as if another
    /// client had created it.
    pub fn insert_row(&self, values: RowValues) -> Row {
        let mut server = self.server.lock();
        let row = Self::new_row(&mut server, values);
        server.rows.push(row.clone());
        row
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: Error) {
        self.server.lock().fail_next = Some(error);
    }

    /// Park every call until `release`.
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn take_calls(&self) -> Vec<TransportCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn record(&self, call: TransportCall) {
        log::trace!("memory transport: {:?}", call);
        self.calls.lock().push(call);
    }

    /// Wait for the gate, then consume any injected failure.
    async fn pass(&self, signal: &AbortSignal) -> Result<()> {
        let gate = self.gate.subscribe();
        tokio::select! {
            _ = gate_open(gate) => {}
            _ = signal.aborted() => return Err(Error::Cancelled),
        }
        signal.check()?;
        match self.server.lock().fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn query(&self, query: &RowQuery) -> Vec<Row> {
        let view = ViewDefinition {
            filters: query.filters.clone().unwrap_or_default(),
            filters_disabled: query.filters.is_none(),
            sorts: query.sorts.clone(),
            search: query.search.clone(),
            ..ViewDefinition::default()
        };
        let context = ViewContext::new(self.fields.clone(), view);
        let mut rows: Vec<Row> = self
            .server
            .lock()
            .rows
            .iter()
            .filter(|row| context.is_visible(row, None))
            .cloned()
            .collect();
        rows.sort_by(|a, b| context.comparator().compare(a, b));
        rows
    }

    fn page(rows: Vec<Row>, offset: usize, limit: usize) -> Page {
        let count = rows.len();
        let results = rows.into_iter().skip(offset).take(limit).collect();
        Page { count, results }
    }

    fn new_row(server: &mut ServerRows, values: RowValues) -> Row {
        let order = server
            .rows
            .iter()
            .map(|r| r.order)
            .fold(0.0_f64, f64::max)
            + 1.0;
        let mut row = Row::new(server.next_id, order);
        row.values = values;
        server.next_id += 1;
        row
    }

    fn missing(id: RowId) -> Error {
        Error::Domain {
            code: "ERROR_ROW_DOES_NOT_EXIST".to_string(),
            message: format!("The row {} does not exist.", id),
        }
    }
}

async fn gate_open(mut gate: watch::Receiver<bool>) {
    // The sender lives as long as the transport
    gate.wait_for(|held| !*held).await.ok();
}

#[async_trait]
impl RowTransport for MemoryTransport {
    async fn fetch_rows(&self, request: FetchRowsRequest, signal: &AbortSignal) -> Result<Page> {
        self.record(TransportCall::FetchRows {
            offset: request.offset,
            limit: request.limit,
        });
        self.pass(signal).await?;
        let rows = self.query(&request.query);
        Ok(Self::page(rows, request.offset, request.limit))
    }

    async fn fetch_count(&self, query: RowQuery, signal: &AbortSignal) -> Result<usize> {
        self.record(TransportCall::FetchCount);
        self.pass(signal).await?;
        Ok(self.query(&query).len())
    }

    async fn fetch_row(&self, id: RowId) -> Result<Row> {
        self.record(TransportCall::FetchRow(id));
        self.pass(&AbortSignal::never()).await?;
        self.row(id).ok_or_else(|| Self::missing(id))
    }

    async fn create_row(&self, values: RowValues) -> Result<Row> {
        self.record(TransportCall::CreateRow);
        self.pass(&AbortSignal::never()).await?;
        let mut server = self.server.lock();
        let row = Self::new_row(&mut server, values);
        server.rows.push(row.clone());
        Ok(row)
    }

    async fn update_row(&self, id: RowId, values: RowValues) -> Result<Row> {
        self.record(TransportCall::UpdateRow(id));
        self.pass(&AbortSignal::never()).await?;
        let mut server = self.server.lock();
        let row = server
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Self::missing(id))?;
        row.values.extend(values);
        Ok(row.clone())
    }

    async fn delete_row(&self, id: RowId) -> Result<()> {
        self.record(TransportCall::DeleteRow(id));
        self.pass(&AbortSignal::never()).await?;
        let mut server = self.server.lock();
        let index = server
            .rows
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Self::missing(id))?;
        server.rows.remove(index);
        Ok(())
    }

    async fn move_row(&self, id: RowId, before: Option<RowId>) -> Result<Row> {
        self.record(TransportCall::MoveRow { id, before });
        self.pass(&AbortSignal::never()).await?;

        let mut ordered: Vec<(RowId, f64)> = self
            .rows()
            .into_iter()
            .filter(|r| r.id != id)
            .map(|r| (r.id, r.order))
            .collect();
        ordered.sort_by(|a, b| a.1.total_cmp(&b.1));

        let order = match before {
            Some(before) => {
                let index = ordered
                    .iter()
                    .position(|(rid, _)| *rid == before)
                    .ok_or_else(|| Self::missing(before))?;
                let next = ordered[index].1;
                let previous = if index > 0 { ordered[index - 1].1 } else { next - 1.0 };
                (previous + next) / 2.0
            }
            None => ordered.last().map(|(_, order)| order + 1.0).unwrap_or(1.0),
        };

        let mut server = self.server.lock();
        let row = server
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Self::missing(id))?;
        row.order = order;
        Ok(row.clone())
    }

    async fn fetch_bucket(&self, request: FetchBucketRequest, signal: &AbortSignal) -> Result<Page> {
        self.record(TransportCall::FetchBucket {
            key: request.key,
            offset: request.offset,
            limit: request.limit,
        });
        self.pass(signal).await?;
        let rows = self
            .query(&request.query)
            .into_iter()
            .filter(|row| request.partition.key_for(row) == request.key)
            .collect();
        Ok(Self::page(rows, request.offset, request.limit))
    }

    async fn fetch_group_counts(
        &self,
        group_by: Vec<FieldId>,
        query: RowQuery,
        signal: &AbortSignal,
    ) -> Result<Vec<GroupCounts>> {
        self.record(TransportCall::FetchGroupCounts);
        self.pass(signal).await?;

        let mut tracker = AggregationTracker::new(&group_by, &self.fields);
        for row in self.query(&query) {
            tracker.on_created(&row);
        }
        let fields = tracker.group_by();
        Ok((0..tracker.depth())
            .map(|level| GroupCounts {
                fields: fields[..=level].to_vec(),
                counts: tracker
                    .counts(level)
                    .map(|counts| counts.iter().map(|(k, v)| (k.clone(), *v)).collect())
                    .unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterGroup, FilterType};
    use crate::row::{FieldType, FieldValue};
    use crate::sort::SortKey;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn transport() -> MemoryTransport {
        let fields = vec![Field::new(1, "n", FieldType::Number { decimal_places: 0 })];
        let rows = (1..=10)
            .map(|i| Row::new(i, i as f64).with_value(1, FieldValue::Number((i % 3) as f64)))
            .collect();
        MemoryTransport::with_rows(fields, rows)
    }

    #[tokio::test]
    async fn test_fetch_rows_filters_and_sorts() {
        let transport = transport();
        let query = RowQuery {
            filters: Some(FilterGroup::and(vec![Filter::new(1, FilterType::Equal("1".to_string()))])),
            sorts: vec![SortKey::descending(1)],
            search: None,
        };
        let page = transport
            .fetch_rows(
                FetchRowsRequest {
                    offset: 1,
                    limit: 2,
                    query,
                },
                &AbortSignal::never(),
            )
            .await
            .unwrap();
        // Rows 1, 4, 7, 10 have n = 1
        assert_eq!(page.count, 4);
        assert_eq!(page.results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 7]);
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let transport = transport();
        transport.fail_next(Error::Transport("boom".to_string()));
        assert!(transport.delete_row(1).await.is_err());
        assert!(transport.delete_row(1).await.is_ok());
        assert_eq!(transport.rows().len(), 9);
    }

    #[tokio::test]
    async fn test_held_fetch_is_cancelled_by_abort() {
        let transport = Arc::new(transport());
        transport.hold();
        let handle = crate::transport::AbortHandle::new();
        let signal = handle.signal();
        let fetch = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.fetch_count(RowQuery::default(), &signal).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();
        let result = fetch.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_move_row_between_neighbours() {
        let transport = transport();
        let moved = transport.move_row(10, Some(2)).await.unwrap();
        assert_eq!(moved.order, 1.5);
        let moved = transport.move_row(1, None).await.unwrap();
        assert_eq!(moved.order, 10.0);
        let created = transport.create_row(HashMap::new()).await.unwrap();
        assert_eq!(created.id, 11);
    }
}
