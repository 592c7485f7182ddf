/// LiveBuffer View Controllers
///
/// Controllers are the network-issuing side of a view. They own the view's
/// buffer (or buckets), talk to a `RowTransport`, and are the only place
/// where operations can fail: on a failed write they apply the inverse of
/// the optimistic mutation and return the transport's error.
///
/// State sits behind a `parking_lot::Mutex` that is only held while a pure
/// reconciliation runs, never across an `.await`, so two reconciliations
/// never interleave.
///
/// - `GridViewController`: one flat buffer (grid and gallery views)
/// - `BucketedViewController`: buffers per bucket (calendar and board views)
///
/// Ordering rules:
/// - Range fetches are serialized per view. A window reported while a fetch
///   is in flight replaces any earlier pending window and is fetched after.
/// - Writes to the same row are serialized through a `RowTaskQueue`.
/// - A refresh aborts the previous refresh's requests; a superseded request
///   returns `Error::Cancelled` and never touches the buffer.

use crate::aggregation::AggregationTracker;
use crate::buffer::{Buffer, Slot};
use crate::changeset::BufferChange;
use crate::config::BufferConfig;
use crate::drag::{DragDecision, DragReorderController};
use crate::error::{Error, Result};
use crate::membership::{ViewContext, ViewDefinition};
use crate::mutation::RowMutation;
use crate::partition::{Bucket, BucketKey, BucketReconciliation, PartitionBy, Partitioner};
use crate::range::{RangeCalculator, VisibleRange};
use crate::reconciler::Reconciliation;
use crate::row::{Field, FieldId, FieldValue, Row, RowId};
use crate::task_queue::RowTaskQueue;
use crate::transport::{AbortHandle, FetchBucketRequest, FetchRowsRequest, RowQuery, RowTransport, RowValues};
use parking_lot::Mutex;
use std::sync::Arc;

/// Fetches of a window are retried at most this many times when the buffer
/// layout changes while they are in flight.
const MAX_FETCH_ATTEMPTS: usize = 3;

fn query_for(view: &ViewDefinition) -> RowQuery {
    RowQuery {
        filters: (!view.filters_disabled).then(|| view.filters.clone()),
        sorts: view.sorts.clone(),
        search: if view.hide_non_matching {
            view.search_term().map(str::to_string)
        } else {
            None
        },
    }
}

/// Remote events carry the server's view of a row; the local copy is the
/// better "before" state when there is one.
fn with_local_before<F>(mutation: RowMutation, current: F) -> RowMutation
where
    F: Fn(&Row) -> Row,
{
    match mutation {
        RowMutation::Updated { old, new } => RowMutation::Updated {
            old: current(&old),
            new,
        },
        RowMutation::Moved { old, new } => RowMutation::Moved {
            old: current(&old),
            new,
        },
        RowMutation::Deleted(row) => RowMutation::Deleted(current(&row)),
        created => created,
    }
}

fn annotated(view: &ViewContext, rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            view.annotate(&mut row);
            row
        })
        .collect()
}

struct GridState {
    buffer: Buffer,
    view: ViewContext,
    aggregates: AggregationTracker,
    drag: DragReorderController,
    visible: Option<VisibleRange>,
    fetching: bool,
    delayed_request: Option<VisibleRange>,
    /// Bumped by every refresh; responses from older generations are dropped.
    generation: u64,
    /// Bumped whenever slot indices shift.
    layout_epoch: u64,
    abort: AbortHandle,
}

impl GridState {
    fn apply(&mut self, mutation: &RowMutation) -> Reconciliation {
        let before = self.buffer.changes().len();
        let outcome = mutation.apply(&mut self.buffer, &self.view);
        self.aggregates.apply(mutation, &outcome);
        self.note_layout(before);
        outcome
    }

    fn note_layout(&mut self, changes_before: usize) {
        let shifted = self
            .buffer
            .changes()
            .get(changes_before..)
            .map(|changes| changes.iter().any(BufferChange::shifts_indices))
            .unwrap_or(true);
        if shifted {
            self.layout_epoch += 1;
        }
    }

    /// The buffer's copy of `row` if it holds one, otherwise `row` itself.
    fn current_row(&self, row: &Row) -> Row {
        self.buffer
            .find_row(row.id)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| row.clone())
    }

    /// Flag a loaded row while a request for it is in flight.
    fn mark_loading(&mut self, id: RowId, loading: bool) {
        if let Some(index) = self.buffer.position_of(id) {
            self.buffer.update_row(index, |row| row.meta.loading = loading);
        }
    }
}

/// Clears the `fetching` flag if a range-fetch loop is dropped mid-flight.
struct FetchSlot<'a> {
    state: &'a Mutex<GridState>,
    armed: bool,
}

impl Drop for FetchSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            state.fetching = false;
            state.delayed_request = None;
        }
    }
}

/// Controller for a flat, windowed view.
pub struct GridViewController {
    transport: Arc<dyn RowTransport>,
    config: BufferConfig,
    state: Mutex<GridState>,
    tasks: RowTaskQueue,
}

impl GridViewController {
    pub fn new(
        transport: Arc<dyn RowTransport>,
        config: BufferConfig,
        fields: Vec<Field>,
        view: ViewDefinition,
    ) -> Self {
        Self::with_context(transport, config, ViewContext::new(fields, view))
    }

    /// Use a prepared context, e.g. one with custom filter or search
    /// evaluators.
    pub fn with_context(transport: Arc<dyn RowTransport>, config: BufferConfig, view: ViewContext) -> Self {
        let aggregates = AggregationTracker::new(&view.view().group_by, view.fields());
        let state = GridState {
            buffer: Buffer::new(config.storage),
            view,
            aggregates,
            drag: DragReorderController::new(),
            visible: None,
            fetching: false,
            delayed_request: None,
            generation: 0,
            layout_epoch: 0,
            abort: AbortHandle::new(),
        };
        GridViewController {
            transport,
            config,
            state: Mutex::new(state),
            tasks: RowTaskQueue::new(),
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn view(&self) -> ViewDefinition {
        self.state.lock().view.view().clone()
    }

    /// Drop the buffer and reload the count plus the rows around the last
    /// visible window (clamped to the new count), so the scroll position
    /// survives a filter or sort change. Aborts any earlier refresh.
    pub async fn refresh(&self) -> Result<()> {
        let (generation, signal, query, window, group_by) = {
            let mut state = self.state.lock();
            state.abort.abort();
            state.abort = AbortHandle::new();
            state.generation += 1;
            let window = state.visible.unwrap_or(self.config.initial_window);
            (
                state.generation,
                state.abort.signal(),
                query_for(state.view.view()),
                window,
                state.aggregates.group_by(),
            )
        };
        log::debug!("refreshing view, generation {}", generation);

        let count = self.transport.fetch_count(query.clone(), &signal).await?;
        let plan = window
            .clamp_to(count)
            .and_then(|w| RangeCalculator::plan_unfetched(count, self.config.request_size, w.start, w.end));

        let page = match plan {
            Some(plan) => {
                let request = FetchRowsRequest {
                    offset: plan.offset,
                    limit: plan.limit,
                    query: query.clone(),
                };
                Some((plan, self.transport.fetch_rows(request, &signal).await?))
            }
            None => None,
        };
        let groups = if group_by.is_empty() {
            Vec::new()
        } else {
            self.transport
                .fetch_group_counts(group_by, query, &signal)
                .await?
        };

        let mut state = self.state.lock();
        if state.generation != generation || signal.is_aborted() {
            return Err(Error::Cancelled);
        }
        state.buffer.reset(count);
        state.layout_epoch += 1;
        state.aggregates.clear();
        for (level, counts) in groups.into_iter().enumerate() {
            state.aggregates.set_counts(level, counts.counts);
        }
        if let Some((plan, page)) = page {
            if page.count != count {
                log::warn!("page reports {} rows, count request reported {}", page.count, count);
            }
            let GridState { buffer, view, .. } = &mut *state;
            buffer.fill(plan.offset, annotated(view, page.results));
        }
        Ok(())
    }

    /// Replace the view definition and refresh.
    pub async fn set_view(&self, definition: ViewDefinition) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.aggregates = AggregationTracker::new(&definition.group_by, state.view.fields());
            state.view.set_view(definition);
        }
        self.refresh().await
    }

    /// Change the search term. Search flags of every loaded row are updated
    /// right away; when the view hides non-matching rows it is refreshed.
    pub async fn set_search(&self, term: Option<String>) -> Result<()> {
        let hides = {
            let mut state = self.state.lock();
            state.view.set_search(term);
            let GridState { buffer, view, .. } = &mut *state;
            buffer.for_each_row_mut(|row| view.annotate(row));
            view.view().hide_non_matching
        };
        if hides {
            self.refresh().await
        } else {
            Ok(())
        }
    }

    /// The rendering layer now shows `[start, end]`.
    pub async fn on_visible_range_changed(&self, start: usize, end: usize) -> Result<()> {
        let range = VisibleRange::new(start, end);
        {
            let mut state = self.state.lock();
            state.visible = Some(range);
            if state.fetching {
                log::trace!("fetch in flight, delaying window [{}, {}]", start, end);
                state.delayed_request = Some(range);
                return Ok(());
            }
            state.fetching = true;
        }

        let mut slot = FetchSlot {
            state: &self.state,
            armed: true,
        };
        let mut result = Ok(());
        let mut next = Some(range);
        while let Some(range) = next.take() {
            if let Err(err) = self.fetch_window(range).await {
                log::debug!("fetch for window [{}, {}] failed: {}", range.start, range.end, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
            let mut state = self.state.lock();
            next = state.delayed_request.take();
            if next.is_none() {
                state.fetching = false;
                slot.armed = false;
            }
        }
        result
    }

    async fn fetch_window(&self, range: VisibleRange) -> Result<()> {
        for _ in 0..MAX_FETCH_ATTEMPTS {
            let (plan, request, signal, generation, epoch) = {
                let state = self.state.lock();
                let Some(plan) =
                    RangeCalculator::plan(&state.buffer, self.config.request_size, range.start, range.end)
                else {
                    return Ok(());
                };
                let request = FetchRowsRequest {
                    offset: plan.offset,
                    limit: plan.limit,
                    query: query_for(state.view.view()),
                };
                (plan, request, state.abort.signal(), state.generation, state.layout_epoch)
            };
            log::debug!("fetching rows offset={} limit={}", plan.offset, plan.limit);

            let page = self.transport.fetch_rows(request, &signal).await?;

            let mut state = self.state.lock();
            if state.generation != generation {
                return Err(Error::Cancelled);
            }
            if state.layout_epoch != epoch {
                log::debug!("buffer layout changed during fetch, planning again");
                continue;
            }
            if page.count != state.buffer.len() {
                log::warn!(
                    "page reports {} rows but the buffer holds {}",
                    page.count,
                    state.buffer.len()
                );
            }
            let GridState { buffer, view, .. } = &mut *state;
            buffer.fill(plan.offset, annotated(view, page.results));
            return Ok(());
        }
        Ok(())
    }

    /// Snapshot of the slot at `index`.
    pub fn get_row(&self, index: usize) -> Option<Slot> {
        self.state.lock().buffer.get(index).cloned()
    }

    pub fn get_count(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn find_row(&self, id: RowId) -> Option<(usize, Row)> {
        self.state
            .lock()
            .buffer
            .find_row(id)
            .map(|(index, row)| (index, row.clone()))
    }

    /// Slot ids in order, None for unfetched slots.
    pub fn ids(&self) -> Vec<Option<RowId>> {
        self.state.lock().buffer.ids()
    }

    /// Create a row on the server, then reconcile the confirmed row.
    pub async fn create_row(&self, values: RowValues) -> Result<Row> {
        let row = self.transport.create_row(values).await?;
        let outcome = self.state.lock().apply(&RowMutation::Created(row.clone()));
        log::debug!("created row {}: {:?}", row.id, outcome.membership);
        Ok(row)
    }

    /// Optimistically set one value, then confirm with the server. On
    /// failure the row snaps back and the error is returned.
    pub async fn update_row_value(&self, row: &Row, field: FieldId, value: FieldValue) -> Result<Row> {
        let id = row.id;
        self.tasks
            .run(id, async {
                let optimistic = {
                    let mut state = self.state.lock();
                    let old = state.current_row(row);
                    let mut new = old.clone();
                    new.values.insert(field, value.clone());
                    let mutation = RowMutation::Updated { old, new };
                    state.apply(&mutation);
                    state.mark_loading(id, true);
                    mutation
                };

                let mut values = RowValues::new();
                values.insert(field, value);
                let result = self.transport.update_row(id, values).await;

                let mut state = self.state.lock();
                let result = match result {
                    Ok(confirmed) => {
                        let old = match optimistic.after() {
                            Some(after) => state.current_row(after),
                            None => state.current_row(row),
                        };
                        state.apply(&RowMutation::Updated {
                            old,
                            new: confirmed.clone(),
                        });
                        Ok(confirmed)
                    }
                    Err(err) => {
                        log::debug!("update of row {} failed, rolling back: {}", id, err);
                        state.apply(&optimistic.inverse());
                        Err(err)
                    }
                };
                state.mark_loading(id, false);
                result
            })
            .await
    }

    /// Optimistically remove a row, then confirm with the server.
    pub async fn delete_row(&self, row: &Row) -> Result<()> {
        let id = row.id;
        self.tasks
            .run(id, async {
                let mutation = {
                    let mut state = self.state.lock();
                    let mutation = RowMutation::Deleted(state.current_row(row));
                    state.apply(&mutation);
                    mutation
                };
                if let Err(err) = self.transport.delete_row(id).await {
                    log::debug!("delete of row {} failed, rolling back: {}", id, err);
                    self.state.lock().apply(&mutation.inverse());
                    return Err(err);
                }
                Ok(())
            })
            .await
    }

    pub fn start_drag(&self, id: RowId) -> Result<()> {
        let mut state = self.state.lock();
        let GridState { drag, buffer, .. } = &mut *state;
        drag.start_drag(buffer, id)
    }

    pub fn force_move_row_to(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.buffer.changes().len();
        let GridState { drag, buffer, .. } = &mut *state;
        drag.force_move_row_to(buffer, index)?;
        state.note_layout(before);
        Ok(())
    }

    pub fn force_move_row_before(&self, before_row: Option<RowId>) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.buffer.changes().len();
        let GridState { drag, buffer, .. } = &mut *state;
        drag.force_move_row_before(buffer, before_row)?;
        state.note_layout(before);
        Ok(())
    }

    /// Finish a drag. A changed successor is sent as a move; if the server
    /// rejects it the row returns before its original successor and the
    /// error is returned.
    pub async fn stop_drag(&self) -> Result<DragDecision> {
        let (decision, old) = {
            let mut state = self.state.lock();
            let before = state.buffer.changes().len();
            let GridState { drag, buffer, .. } = &mut *state;
            let decision = drag.stop_drag(buffer)?;
            state.note_layout(before);
            let old = match decision {
                DragDecision::Commit { row, .. } => {
                    state.mark_loading(row, true);
                    state.buffer.find_row(row).map(|(_, r)| r.clone())
                }
                _ => None,
            };
            (decision, old)
        };

        let DragDecision::Commit { row, before } = decision else {
            return Ok(decision);
        };

        match self.tasks.run(row, self.transport.move_row(row, before)).await {
            Ok(moved) => {
                let mut state = self.state.lock();
                state.drag.commit_succeeded();
                if let Some(old) = old {
                    state.apply(&RowMutation::Moved { old, new: moved });
                }
                state.mark_loading(row, false);
                Ok(decision)
            }
            Err(err) => {
                log::debug!("move of row {} failed: {}", row, err);
                let mut state = self.state.lock();
                let changes_before = state.buffer.changes().len();
                let GridState { drag, buffer, .. } = &mut *state;
                drag.commit_failed(buffer);
                state.note_layout(changes_before);
                state.mark_loading(row, false);
                Err(err)
            }
        }
    }

    /// Abort a drag without contacting the server.
    pub fn cancel_drag(&self) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.buffer.changes().len();
        let GridState { drag, buffer, .. } = &mut *state;
        drag.cancel(buffer)?;
        state.note_layout(before);
        Ok(())
    }

    /// Reconcile an event from a collaborator. No transport call is made.
    pub fn apply_remote(&self, mutation: RowMutation) -> Reconciliation {
        let mut state = self.state.lock();
        let mutation = with_local_before(mutation, |row| state.current_row(row));
        state.apply(&mutation)
    }

    /// Fetch a fresh copy of `row` and run it through the update path, so
    /// both its membership and its position are re-evaluated.
    pub async fn refresh_row(&self, row: &Row) -> Result<Reconciliation> {
        self.state.lock().mark_loading(row.id, true);
        let fresh = self.transport.fetch_row(row.id).await;

        let mut state = self.state.lock();
        let outcome = fresh.map(|fresh| {
            let old = state.current_row(row);
            state.apply(&RowMutation::Updated { old, new: fresh })
        });
        state.mark_loading(row.id, false);
        outcome
    }

    /// Set a metadata entry on a loaded row without touching its position or
    /// membership. Returns false when the row is not loaded.
    pub fn update_row_metadata(&self, id: RowId, key: &str, value: serde_json::Value) -> bool {
        let mut state = self.state.lock();
        match state.buffer.position_of(id) {
            Some(index) => state.buffer.update_row(index, |row| {
                row.meta.metadata.insert(key.to_string(), value);
            }),
            None => false,
        }
    }

    /// Take the buffer's pending changes. Renderers should drain after each
    /// action; an undrained log collapses into a single `Reset` once it
    /// reaches `MAX_PENDING_CHANGES` entries.
    pub fn drain_changes(&self) -> Vec<BufferChange> {
        self.state.lock().buffer.drain_changes()
    }

    /// Snapshot of the group-by counts.
    pub fn aggregates(&self) -> AggregationTracker {
        self.state.lock().aggregates.clone()
    }
}

struct BucketState {
    partitioner: Partitioner,
    view: ViewContext,
    generation: u64,
    /// Bumped whenever a refresh replaces the buckets.
    buckets_epoch: u64,
    abort: AbortHandle,
}

impl BucketState {
    fn current_row(&self, row: &Row) -> Row {
        self.partitioner
            .find_row(row.id)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| row.clone())
    }

    fn mark_loading(&mut self, id: RowId, loading: bool) {
        self.partitioner.update_row(id, |row| row.meta.loading = loading);
    }
}

/// Controller for a view partitioned into date or option buckets.
pub struct BucketedViewController {
    transport: Arc<dyn RowTransport>,
    config: BufferConfig,
    state: Mutex<BucketState>,
    tasks: RowTaskQueue,
}

impl BucketedViewController {
    pub fn new(
        transport: Arc<dyn RowTransport>,
        config: BufferConfig,
        fields: Vec<Field>,
        view: ViewDefinition,
        partition: PartitionBy,
    ) -> Self {
        let state = BucketState {
            partitioner: Partitioner::new(partition),
            view: ViewContext::new(fields, view),
            generation: 0,
            buckets_epoch: 0,
            abort: AbortHandle::new(),
        };
        BucketedViewController {
            transport,
            config,
            state: Mutex::new(state),
            tasks: RowTaskQueue::new(),
        }
    }

    /// Reload the first page of every bucket in `keys`, replacing all
    /// buckets. Aborts any earlier refresh.
    pub async fn refresh(&self, keys: &[BucketKey]) -> Result<()> {
        let (generation, signal, query, partition) = {
            let mut state = self.state.lock();
            state.abort.abort();
            state.abort = AbortHandle::new();
            state.generation += 1;
            (
                state.generation,
                state.abort.signal(),
                query_for(state.view.view()),
                state.partitioner.partition_by(),
            )
        };
        log::debug!("refreshing {} buckets, generation {}", keys.len(), generation);

        let mut pages = Vec::with_capacity(keys.len());
        for key in keys {
            let request = FetchBucketRequest {
                partition,
                key: *key,
                offset: 0,
                limit: self.config.bucket_page_size,
                query: query.clone(),
            };
            pages.push((*key, self.transport.fetch_bucket(request, &signal).await?));
        }

        let mut state = self.state.lock();
        if state.generation != generation || signal.is_aborted() {
            return Err(Error::Cancelled);
        }
        state.buckets_epoch += 1;
        let BucketState {
            partitioner, view, ..
        } = &mut *state;
        partitioner.clear();
        for (key, page) in pages {
            partitioner.set_bucket(key, page.count, annotated(view, page.results));
        }
        Ok(())
    }

    pub fn get_bucket(&self, key: &BucketKey) -> Option<Bucket> {
        self.state.lock().partitioner.bucket(key).cloned()
    }

    pub fn bucket_keys(&self) -> Vec<BucketKey> {
        self.state.lock().partitioner.keys()
    }

    pub fn get_count(&self) -> usize {
        self.state.lock().partitioner.total_count()
    }

    /// Fetch the next page of `key`. A bucket that is already loading or
    /// fully fetched is left alone. Returns how many rows were added.
    pub async fn fetch_more_in_bucket(&self, key: &BucketKey) -> Result<usize> {
        let (request, signal, generation, epoch) = {
            let mut state = self.state.lock();
            let query = query_for(state.view.view());
            let partition = state.partitioner.partition_by();
            let generation = state.generation;
            let epoch = state.buckets_epoch;
            let signal = state.abort.signal();
            let bucket = state
                .partitioner
                .bucket_mut(key)
                .ok_or_else(|| Error::BucketNotFound(key.to_string()))?;
            if bucket.loading || bucket.is_complete() {
                return Ok(0);
            }
            bucket.loading = true;
            let request = FetchBucketRequest {
                partition,
                key: *key,
                offset: bucket.results.len(),
                limit: self.config.bucket_page_size,
                query,
            };
            (request, signal, generation, epoch)
        };

        let result = self.transport.fetch_bucket(request, &signal).await;

        let mut state = self.state.lock();
        if state.buckets_epoch == epoch {
            // Still the bucket this request marked
            if let Some(bucket) = state.partitioner.bucket_mut(key) {
                bucket.loading = false;
            }
        }
        if state.generation != generation {
            return Err(Error::Cancelled);
        }
        let page = result?;
        let BucketState {
            partitioner, view, ..
        } = &mut *state;
        Ok(partitioner.merge_page(*key, page.count, annotated(view, page.results)))
    }

    /// Create a row on the server, then reconcile the confirmed row.
    pub async fn create_row(&self, values: RowValues) -> Result<Row> {
        let row = self.transport.create_row(values).await?;
        let mut state = self.state.lock();
        let BucketState {
            partitioner, view, ..
        } = &mut *state;
        partitioner.apply(view, &RowMutation::Created(row.clone()));
        Ok(row)
    }

    /// Optimistically set one value, possibly moving the row to another
    /// bucket, then confirm with the server.
    pub async fn update_row_value(&self, row: &Row, field: FieldId, value: FieldValue) -> Result<Row> {
        let id = row.id;
        self.tasks
            .run(id, async {
                let optimistic = {
                    let mut state = self.state.lock();
                    let old = state.current_row(row);
                    let mut new = old.clone();
                    new.values.insert(field, value.clone());
                    let mutation = RowMutation::Updated { old, new };
                    let BucketState {
                        partitioner, view, ..
                    } = &mut *state;
                    partitioner.apply(view, &mutation);
                    state.mark_loading(id, true);
                    mutation
                };

                let mut values = RowValues::new();
                values.insert(field, value);
                let result = self.transport.update_row(id, values).await;

                let mut state = self.state.lock();
                let old = match optimistic.after() {
                    Some(after) => state.current_row(after),
                    None => state.current_row(row),
                };
                let BucketState {
                    partitioner, view, ..
                } = &mut *state;
                let result = match result {
                    Ok(confirmed) => {
                        partitioner.apply(
                            view,
                            &RowMutation::Updated {
                                old,
                                new: confirmed.clone(),
                            },
                        );
                        Ok(confirmed)
                    }
                    Err(err) => {
                        log::debug!("update of row {} failed, rolling back: {}", id, err);
                        partitioner.apply(view, &optimistic.inverse());
                        Err(err)
                    }
                };
                state.mark_loading(id, false);
                result
            })
            .await
    }

    pub async fn delete_row(&self, row: &Row) -> Result<()> {
        let id = row.id;
        self.tasks
            .run(id, async {
                let mutation = {
                    let mut state = self.state.lock();
                    let mutation = RowMutation::Deleted(state.current_row(row));
                    let BucketState {
                        partitioner, view, ..
                    } = &mut *state;
                    partitioner.apply(view, &mutation);
                    mutation
                };
                if let Err(err) = self.transport.delete_row(id).await {
                    log::debug!("delete of row {} failed, rolling back: {}", id, err);
                    let mut state = self.state.lock();
                    let BucketState {
                        partitioner, view, ..
                    } = &mut *state;
                    partitioner.apply(view, &mutation.inverse());
                    return Err(err);
                }
                Ok(())
            })
            .await
    }

    /// Reconcile an event from a collaborator. No transport call is made.
    pub fn apply_remote(&self, mutation: RowMutation) -> BucketReconciliation {
        let mut state = self.state.lock();
        let mutation = with_local_before(mutation, |row| state.current_row(row));
        let BucketState {
            partitioner, view, ..
        } = &mut *state;
        partitioner.apply(view, &mutation)
    }

    pub fn drain_changes(&self, key: &BucketKey) -> Vec<BufferChange> {
        self.state
            .lock()
            .partitioner
            .bucket_mut(key)
            .map(Bucket::drain_changes)
            .unwrap_or_default()
    }
}
