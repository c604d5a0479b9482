//! The grid coordination controller.
//!
//! A [`GridController`] owns the query state, the loaded page of rows and the
//! selection of one grid. Every query mutation issues a fetch; responses are
//! applied only if no later request has been issued since (last-issued-wins),
//! so out-of-order responses can never overwrite newer data.
//!
//! # States
//!
//! ```text
//! Idle ──mount──▶ Fetching ──response──▶ Ready
//!                   ▲  │                   │
//!                   │  └──rejection──▶ Error
//!                   └────mutation──────────┘
//! ```
//!
//! The controller talks to the rest of the application through the hub: it
//! listens for table-scoped requests (filters, search, refresh, select-all,
//! import, download) and announces totals and selection changes. Hub
//! emissions never happen while the controller's state lock is held.
//!
//! Each state change and the emissions it causes run under a per-grid
//! re-entrant sequencer, so watchers and hub handlers observe changes in the
//! order they were made even when responses land on several worker threads.
//! A handler may call back into the grid from the emitting thread.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use stockgrid_core::SubscriptionId;
use stockgrid_core::logging::targets;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};

use super::config::{GridConfig, SelectionPolicy};
use super::event::{GridEvent, GridEventKind, GridHub, NoExtension};
use super::export;
use super::fetch::{FetchResponse, Fetcher, rows_from_json};
use super::local;
use super::query::{self, Filter, QueryParams, QueryState, SortOrder};
use crate::error::{FetchError, GridError, Result};
use crate::model::{Column, Row, RowKey, SelectionTracker};

/// Identity of an issued fetch. Later requests have larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// The raw sequence number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridStatus {
    /// Not mounted yet.
    #[default]
    Idle,
    /// A page request is outstanding.
    Fetching,
    /// The latest request was applied.
    Ready,
    /// The latest request was rejected; the last good rows are kept.
    Error,
}

/// Where the displayed rows come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSource {
    /// Each page is fetched from the server.
    #[default]
    Remote,
    /// The full data set is held locally and viewed client-side.
    Local,
}

/// Point-in-time copy of a grid's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    /// Lifecycle state.
    pub status: GridStatus,
    /// Query state of the latest request.
    pub query: QueryState,
    /// Rows on display.
    pub rows: Vec<Row>,
    /// Records matching the current query.
    pub total_records: u64,
    /// Selected keys in selection order.
    pub selected_keys: Vec<RowKey>,
    /// Origin of the rows.
    pub source: DataSource,
    /// Whether the filter panel is shown.
    pub filter_visible: bool,
    /// The most recent fetch rejection, cleared on success.
    pub last_error: Option<FetchError>,
    /// Latest page request issued.
    pub latest_request: Option<RequestId>,
    /// Request whose rows are on display.
    pub applied_request: Option<RequestId>,
}

impl GridSnapshot {
    /// Number of selected keys.
    pub fn selected_count(&self) -> usize {
        self.selected_keys.len()
    }

    /// Keys of the rows on display.
    pub fn row_keys(&self) -> Vec<RowKey> {
        self.rows.iter().map(|row| row.key().clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    /// Page, page size or sort.
    View,
    /// Filters or search; returns to page 1 and starts a new filter epoch.
    Filter,
    /// Refetch from the server with the current state.
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketKind {
    Page,
    FullLoad,
    SelectAll,
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    id: RequestId,
    kind: TicketKind,
    epoch: u64,
    page: u32,
    page_size: u32,
    fresh_filter: bool,
}

/// Which query produced the rows on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadedView {
    epoch: u64,
    page: u32,
    page_size: u32,
}

struct GridState {
    status: GridStatus,
    query: QueryState,
    rows: Vec<Row>,
    total_records: u64,
    selection: SelectionTracker,
    source: DataSource,
    local_rows: Vec<Row>,
    filter_visible: bool,
    last_error: Option<FetchError>,
    next_request: u64,
    latest_request: Option<RequestId>,
    applied_request: Option<RequestId>,
    select_all_request: Option<RequestId>,
    filter_epoch: u64,
    fresh_filter_pending: bool,
    loaded: Option<LoadedView>,
    /// First page held in `rows` when lazily appending.
    appended_from: u32,
    /// Filter epoch of a select-all waiting for its page to load.
    deferred_select_all: Option<u64>,
    mounted: bool,
    disposed: bool,
}

impl GridState {
    fn new(config: &GridConfig) -> Self {
        Self {
            status: GridStatus::Idle,
            query: QueryState::new(config.table_name.clone(), config.page_size),
            rows: Vec::new(),
            total_records: 0,
            selection: SelectionTracker::with_mode(config.selection_mode),
            source: DataSource::Remote,
            local_rows: Vec::new(),
            filter_visible: false,
            last_error: None,
            next_request: 0,
            latest_request: None,
            applied_request: None,
            select_all_request: None,
            filter_epoch: 0,
            fresh_filter_pending: false,
            loaded: None,
            appended_from: 1,
            deferred_select_all: None,
            mounted: false,
            disposed: false,
        }
    }

    fn next_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    /// Whether the rows on display were produced by the current filters.
    fn filters_loaded(&self) -> bool {
        self.loaded.is_some_and(|loaded| loaded.epoch == self.filter_epoch)
    }

    fn view(&self) -> LoadedView {
        LoadedView {
            epoch: self.filter_epoch,
            page: self.query.page,
            page_size: self.query.page_size,
        }
    }

    fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            status: self.status,
            query: self.query.clone(),
            rows: self.rows.clone(),
            total_records: self.total_records,
            selected_keys: self.selection.selected_keys().to_vec(),
            source: self.source,
            filter_visible: self.filter_visible,
            last_error: self.last_error.clone(),
            latest_request: self.latest_request,
            applied_request: self.applied_request,
        }
    }
}

struct ControllerInner<X: Send + Sync + 'static> {
    config: GridConfig,
    hub: GridHub<X>,
    fetcher: Arc<dyn Fetcher>,
    runtime: Handle,
    state: Mutex<GridState>,
    /// Held from a state change until its emissions are delivered.
    sequencer: ReentrantMutex<()>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    snapshot_tx: watch::Sender<GridSnapshot>,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl<X: Send + Sync + 'static> Drop for ControllerInner<X> {
    fn drop(&mut self) {
        for id in self.subscriptions.get_mut().drain(..) {
            self.hub.off(id);
        }
    }
}

/// Coordinates paging, sorting, search, filters and selection of one grid.
///
/// Cloning is cheap; clones control the same grid. The controller stops
/// listening to the hub when [`dispose`](Self::dispose) is called or the last
/// clone is dropped.
///
/// # Example
///
/// ```no_run
/// use stockgrid::grid::{FetchResponse, GridConfig, GridController, GridHub, fetcher_fn};
///
/// # async fn demo() -> stockgrid::Result<()> {
/// let hub = GridHub::new();
/// let grid = GridController::new(
///     GridConfig::new().with_table_name("products").with_page_size(20),
///     hub.clone(),
///     fetcher_fn(|_params| async { Ok(FetchResponse::default()) }),
/// )?;
///
/// grid.mount()?;
/// grid.search(Some("cement"))?;
/// grid.settled().await;
/// println!("{} matching products", grid.snapshot().total_records);
/// # Ok(())
/// # }
/// ```
pub struct GridController<X: Send + Sync + 'static = NoExtension> {
    inner: Arc<ControllerInner<X>>,
}

impl<X: Send + Sync + 'static> Clone for GridController<X> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<X: Send + Sync + 'static> fmt::Debug for GridController<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("GridController")
            .field("table_name", &self.inner.config.table_name)
            .field("status", &state.status)
            .field("rows", &state.rows.len())
            .field("total_records", &state.total_records)
            .field("selected", &state.selection.count())
            .finish()
    }
}

static_assertions::assert_impl_all!(GridController: Send, Sync, Clone);

impl GridController {
    /// Create a controller that spawns fetches on the current Tokio runtime.
    ///
    /// Fails with [`GridError::NoRuntime`] outside a runtime. Hubs carrying
    /// application events use [`with_extension`](Self::with_extension).
    pub fn new<F: Fetcher>(config: GridConfig, hub: GridHub, fetcher: F) -> Result<Self> {
        Self::with_extension(config, hub, fetcher)
    }

    /// Create a controller that spawns fetches on `runtime`.
    pub fn with_runtime<F: Fetcher>(
        config: GridConfig,
        hub: GridHub,
        fetcher: F,
        runtime: Handle,
    ) -> Self {
        Self::with_extension_runtime(config, hub, fetcher, runtime)
    }
}

impl<X: Send + Sync + 'static> GridController<X> {
    /// Create a controller on a hub whose events carry extensions of type `X`,
    /// spawning fetches on the current Tokio runtime.
    pub fn with_extension<F: Fetcher>(
        config: GridConfig,
        hub: GridHub<X>,
        fetcher: F,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|err| GridError::NoRuntime(err.to_string()))?;
        Ok(Self::with_extension_runtime(config, hub, fetcher, runtime))
    }

    /// [`with_extension`](Self::with_extension) on an explicit runtime.
    pub fn with_extension_runtime<F: Fetcher>(
        config: GridConfig,
        hub: GridHub<X>,
        fetcher: F,
        runtime: Handle,
    ) -> Self {
        let state = GridState::new(&config);
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(ControllerInner {
                config,
                hub,
                fetcher: Arc::new(fetcher),
                runtime,
                state: Mutex::new(state),
                sequencer: ReentrantMutex::new(()),
                subscriptions: Mutex::new(Vec::new()),
                snapshot_tx,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &GridConfig {
        &self.inner.config
    }

    /// The table name this grid is bound to.
    pub fn table_name(&self) -> Option<&str> {
        self.inner.config.table_name.as_deref()
    }

    /// The hub this grid listens to.
    pub fn hub(&self) -> &GridHub<X> {
        &self.inner.hub
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start listening to the hub and load the first page.
    ///
    /// Mounting an already mounted grid reloads it.
    pub fn mount(&self) -> Result<Option<RequestId>> {
        let first_mount = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(GridError::Disposed);
            }
            !std::mem::replace(&mut state.mounted, true)
        };
        if first_mount {
            self.subscribe_all();
            tracing::debug!(target: targets::GRID, table = ?self.table_name(), "grid mounted");
        }
        self.mutate(Change::Reload, |_| {})
    }

    /// Stop listening to the hub. Later mutations fail with
    /// [`GridError::Disposed`] and responses still in flight are discarded.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            if std::mem::replace(&mut state.disposed, true) {
                return;
            }
        }
        let ids = std::mem::take(&mut *self.inner.subscriptions.lock());
        for id in ids {
            self.inner.hub.off(id);
        }
        tracing::debug!(target: targets::GRID, table = ?self.table_name(), "grid disposed");
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    // -------------------------------------------------------------------------
    // Query mutations
    // -------------------------------------------------------------------------

    /// Refetch with the current query state.
    pub fn refresh(&self) -> Result<Option<RequestId>> {
        self.mutate(Change::Reload, |_| {})
    }

    /// Go to `page` (1-based).
    pub fn set_page(&self, page: u32) -> Result<Option<RequestId>> {
        self.mutate(Change::View, |query| query.page = page.max(1))
    }

    /// Change the page size; always returns to the first page.
    pub fn set_page_size(&self, page_size: u32) -> Result<Option<RequestId>> {
        self.mutate(Change::View, |query| query.set_page_size(page_size))
    }

    /// Sort by `field`, or restore the server order with `None`.
    ///
    /// Fields of configured columns must be sortable; other fields are sent
    /// as given.
    pub fn sort_by(&self, field: Option<&str>, order: SortOrder) -> Result<Option<RequestId>> {
        if let Some(column) = field.and_then(|field| self.inner.config.column(field))
            && !column.sortable
        {
            return Err(GridError::ColumnNotSortable(column.field.clone()));
        }
        let field = field.map(str::to_string);
        self.mutate(Change::View, move |query| {
            query.sort_order = if field.is_some() { order } else { SortOrder::None };
            query.sort_field = field;
            query.page = 1;
        })
    }

    /// Sort by a column, refusing columns that are not sortable.
    pub fn sort_by_column(&self, column: &Column, order: SortOrder) -> Result<Option<RequestId>> {
        if !column.sortable {
            return Err(GridError::ColumnNotSortable(column.field.clone()));
        }
        self.sort_by(Some(&column.field), order)
    }

    /// Commit a free-text search; blank text clears it.
    pub fn search(&self, text: Option<&str>) -> Result<Option<RequestId>> {
        self.mutate(Change::Filter, |query| {
            query.set_search(text);
        })
    }

    /// Set the filter on `field`. An empty filter removes it.
    pub fn apply_filter(&self, field: &str, filter: Filter) -> Result<Option<RequestId>> {
        self.mutate(Change::Filter, |query| {
            query.set_filter(field, filter);
        })
    }

    /// Remove the filter on `field`.
    pub fn remove_filter(&self, field: &str) -> Result<Option<RequestId>> {
        self.mutate(Change::Filter, |query| {
            query.filters.remove(field);
        })
    }

    /// Replace every filter from a parameter bag, as sent by a filter panel.
    ///
    /// `search`, `sortBy` and `sortOrder` keys in the bag update the search
    /// and sort as well.
    pub fn apply_filters(&self, params: &QueryParams) -> Result<Option<RequestId>> {
        self.mutate(Change::Filter, |state| {
            state.replace_filters(params);
            if let Some(search) = params.get("search") {
                state.set_search(search.as_str());
            }
            if let Some((field, order)) = query::sort_from_params(params) {
                state.sort_field = Some(field);
                state.sort_order = order;
            }
        })
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Toggle the selection of `key`. Returns the new membership.
    ///
    /// Disabled keys stay unselected.
    pub fn toggle_row(&self, key: &RowKey) -> Result<bool> {
        let _order = self.inner.sequencer.lock();
        let mut events = Vec::new();
        let (selected, snapshot) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.disposed {
                return Err(GridError::Disposed);
            }
            let before = state.selection.is_selected(key);
            let after = match state.rows.iter().find(|row| row.key() == key) {
                Some(row) => state.selection.toggle_row(row),
                None => state.selection.toggle(key),
            };
            if before != after {
                events.push(self.selected_event(state));
            }
            (after, state.snapshot())
        };
        self.publish(snapshot, events);
        Ok(selected)
    }

    /// Deselect every row and announce it.
    pub fn clear_selection(&self) -> Result<()> {
        self.clear_selection_inner(true)
    }

    /// Select every record matching the current query, across all pages.
    ///
    /// When the loaded rows already cover the whole result this happens
    /// immediately and `None` is returned. Otherwise every matching row is
    /// fetched (`page = 1`, `limit = total`); the result is dropped if the
    /// filters change before it arrives.
    ///
    /// While the first page for the current filters is still outstanding the
    /// select-all waits for it, then runs against the new total. `None` is
    /// returned in that case too.
    pub fn select_all_records(&self) -> Result<Option<RequestId>> {
        let _order = self.inner.sequencer.lock();
        let mut events = Vec::new();
        let (dispatch, snapshot) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.disposed {
                return Err(GridError::Disposed);
            }

            let dispatch = if state.source == DataSource::Remote && !state.filters_loaded() {
                state.deferred_select_all = Some(state.filter_epoch);
                tracing::debug!(
                    target: targets::SELECTION,
                    table = ?self.table_name(),
                    epoch = state.filter_epoch,
                    "select-all waits for the current filters to load"
                );
                None
            } else {
                self.plan_select_all(state, &mut events)
            };
            (dispatch, state.snapshot())
        };
        self.publish(snapshot, events);
        Ok(dispatch.map(|(ticket, params)| self.spawn_fetch(ticket, params)))
    }

    /// Select locally when possible, otherwise build the select-all fetch.
    fn plan_select_all(
        &self,
        state: &mut GridState,
        events: &mut Vec<GridEvent<X>>,
    ) -> Option<(Ticket, QueryParams)> {
        state.deferred_select_all = None;
        if state.source == DataSource::Local {
            let rows = local::matching_rows(&state.local_rows, &state.query);
            self.select_rows(state, &rows, events);
            None
        } else if state.rows.len() as u64 >= state.total_records {
            let rows = state.rows.clone();
            self.select_rows(state, &rows, events);
            None
        } else {
            let id = state.next_id();
            state.select_all_request = Some(id);
            let limit = state.total_records;
            let overrides = QueryParams::from([
                ("page".to_string(), Value::from(1)),
                ("limit".to_string(), Value::from(limit)),
            ]);
            let params = self.page_params(&state.query, &overrides);
            let ticket = Ticket {
                id,
                kind: TicketKind::SelectAll,
                epoch: state.filter_epoch,
                page: 1,
                page_size: state.query.page_size,
                fresh_filter: false,
            };
            tracing::debug!(target: targets::GRID, table = ?self.table_name(), request = %id, limit, "select-all fetch issued");
            Some((ticket, params))
        }
    }

    /// Whether `key` is selected.
    pub fn is_selected(&self, key: &RowKey) -> bool {
        self.inner.state.lock().selection.is_selected(key)
    }

    /// Number of selected keys.
    pub fn selected_count(&self) -> usize {
        self.inner.state.lock().selection.count()
    }

    /// Selected rows with known data, in selection order.
    ///
    /// Keys toggled before their page was loaded are left out; use
    /// [`snapshot`](Self::snapshot) for every selected key. The
    /// `UpdateSelectedData` event carries a key-only row for each of them.
    pub fn selected_rows(&self) -> Vec<Row> {
        self.inner.state.lock().selection.selected_rows()
    }

    /// Check the selection's internal guarantees.
    pub fn check_invariants(&self) -> Result<()> {
        self.inner.state.lock().selection.check_invariants()
    }

    // -------------------------------------------------------------------------
    // Import, export and panels
    // -------------------------------------------------------------------------

    /// Replace the rows with imported records, viewed client-side.
    ///
    /// Outstanding page requests are superseded. A later
    /// [`refresh`](Self::refresh) returns to server data.
    pub fn import_records(&self, rows: Vec<Row>) -> Result<()> {
        let _order = self.inner.sequencer.lock();
        let mut events = Vec::new();
        let snapshot = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.disposed {
                return Err(GridError::Disposed);
            }
            let id = state.next_id();
            state.latest_request = Some(id);
            state.applied_request = Some(id);
            state.local_rows = rows;
            state.source = DataSource::Local;
            state.query.page = 1;
            state.deferred_select_all = None;
            tracing::info!(
                target: targets::TRANSFER,
                table = ?self.table_name(),
                rows = state.local_rows.len(),
                "records imported"
            );
            self.apply_local_view(state, &mut events);
            state.snapshot()
        };
        self.publish(snapshot, events);
        Ok(())
    }

    /// Import raw JSON records, keyed by the configured data key.
    pub fn import_json(&self, records: Vec<Value>) -> Result<()> {
        let rows = rows_from_json(records, &self.inner.config.data_key)?;
        self.import_records(rows)
    }

    /// Write the selected rows, or every displayed row when nothing is
    /// selected, to `export_dir/file_name` as CSV.
    pub fn download(&self, file_name: &str) -> Result<PathBuf> {
        let rows = {
            let state = self.inner.state.lock();
            if state.disposed {
                return Err(GridError::Disposed);
            }
            if state.selection.has_selection() {
                state.selection.selected_rows()
            } else {
                state.rows.clone()
            }
        };
        export::export_to_file(&self.inner.config.export_dir, file_name, &self.inner.config.columns, &rows)
    }

    /// Show or hide the filter panel.
    pub fn set_filter_visible(&self, show: bool) -> Result<()> {
        let _order = self.inner.sequencer.lock();
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(GridError::Disposed);
            }
            state.filter_visible = show;
            state.snapshot()
        };
        self.publish(snapshot, Vec::new());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Current state.
    pub fn snapshot(&self) -> GridSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Lifecycle state.
    pub fn status(&self) -> GridStatus {
        self.inner.state.lock().status
    }

    /// A receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<GridSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Number of fetches still in flight, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every issued fetch has resolved and been applied or
    /// discarded.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn mutate<F>(&self, change: Change, apply: F) -> Result<Option<RequestId>>
    where
        F: FnOnce(&mut QueryState),
    {
        let _order = self.inner.sequencer.lock();
        let mut events = Vec::new();
        let (dispatch, snapshot) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.disposed {
                return Err(GridError::Disposed);
            }

            apply(&mut state.query);
            match change {
                Change::View => {}
                Change::Filter => {
                    state.query.page = 1;
                    state.filter_epoch += 1;
                    state.fresh_filter_pending = true;
                }
                Change::Reload => state.source = DataSource::Remote,
            }

            let dispatch = if state.source == DataSource::Local {
                self.apply_local_view(state, &mut events);
                None
            } else {
                Some(self.issue(state))
            };
            (dispatch, state.snapshot())
        };
        self.publish(snapshot, events);
        Ok(dispatch.map(|(ticket, params)| self.spawn_fetch(ticket, params)))
    }

    fn issue(&self, state: &mut GridState) -> (Ticket, QueryParams) {
        let id = state.next_id();
        let (kind, params) = if self.inner.config.lazy {
            (TicketKind::Page, self.page_params(&state.query, &QueryParams::new()))
        } else {
            (TicketKind::FullLoad, self.full_load_params())
        };
        state.latest_request = Some(id);
        state.status = GridStatus::Fetching;
        tracing::debug!(
            target: targets::GRID,
            table = ?self.table_name(),
            request = %id,
            page = state.query.page,
            limit = state.query.page_size,
            "fetch issued"
        );
        let ticket = Ticket {
            id,
            kind,
            epoch: state.filter_epoch,
            page: state.query.page,
            page_size: state.query.page_size,
            fresh_filter: state.fresh_filter_pending,
        };
        (ticket, params)
    }

    fn page_params(&self, query: &QueryState, overrides: &QueryParams) -> QueryParams {
        let base = query::merge_params(
            self.inner.config.default_query_params.clone(),
            &query::build_query(query, &QueryParams::new()),
        );
        query::merge_params(base, overrides)
    }

    fn full_load_params(&self) -> QueryParams {
        let mut params = self.inner.config.default_query_params.clone();
        if let Some(table) = self.table_name() {
            params.insert("tableName".to_string(), Value::from(table));
        }
        params
    }

    fn spawn_fetch(&self, ticket: Ticket, params: QueryParams) -> RequestId {
        let future = self.inner.fetcher.fetch(params);
        let weak: Weak<ControllerInner<X>> = Arc::downgrade(&self.inner);
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        self.inner.runtime.spawn(async move {
            let result = future.await;
            if let Some(inner) = weak.upgrade() {
                let controller = GridController { inner };
                controller.complete(ticket, result);
                if controller.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                    controller.inner.idle.notify_waiters();
                }
            }
        });
        ticket.id
    }

    fn complete(&self, ticket: Ticket, result: std::result::Result<FetchResponse, FetchError>) {
        let _order = self.inner.sequencer.lock();
        let mut events = Vec::new();
        let (dispatch, snapshot) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.disposed {
                tracing::debug!(target: targets::GRID, request = %ticket.id, "response after dispose discarded");
                return;
            }
            let applied = match ticket.kind {
                TicketKind::SelectAll => self.complete_select_all(state, &ticket, result, &mut events),
                TicketKind::Page | TicketKind::FullLoad => {
                    self.complete_page(state, &ticket, result, &mut events)
                }
            };
            if !applied {
                return;
            }
            let page_landed = ticket.kind != TicketKind::SelectAll && state.applied_request == Some(ticket.id);
            let dispatch = if page_landed {
                self.resume_select_all(state, &mut events)
            } else {
                None
            };
            (dispatch, state.snapshot())
        };
        self.publish(snapshot, events);
        if let Some((ticket, params)) = dispatch {
            self.spawn_fetch(ticket, params);
        }
    }

    /// Run a select-all that waited for this epoch's first page.
    fn resume_select_all(
        &self,
        state: &mut GridState,
        events: &mut Vec<GridEvent<X>>,
    ) -> Option<(Ticket, QueryParams)> {
        let epoch = state.deferred_select_all.take()?;
        if epoch != state.filter_epoch {
            tracing::debug!(target: targets::SELECTION, epoch, "select-all for replaced filters dropped");
            return None;
        }
        self.plan_select_all(state, events)
    }

    fn complete_page(
        &self,
        state: &mut GridState,
        ticket: &Ticket,
        result: std::result::Result<FetchResponse, FetchError>,
        events: &mut Vec<GridEvent<X>>,
    ) -> bool {
        if state.latest_request != Some(ticket.id) {
            tracing::debug!(
                target: targets::GRID,
                request = %ticket.id,
                latest = ?state.latest_request,
                "stale response discarded"
            );
            return false;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(target: targets::GRID, table = ?self.table_name(), request = %ticket.id, error = %err, "fetch failed");
                state.status = GridStatus::Error;
                state.last_error = Some(err);
                return true;
            }
        };

        state.applied_request = Some(ticket.id);
        if ticket.kind == TicketKind::FullLoad {
            state.local_rows = response.rows;
            state.source = DataSource::Local;
            self.apply_local_view(state, events);
            return true;
        }

        let view = LoadedView {
            epoch: ticket.epoch,
            page: ticket.page,
            page_size: ticket.page_size,
        };
        let append = self.inner.config.lazy_append
            && state.loaded.is_some_and(|loaded| {
                loaded.epoch == view.epoch
                    && loaded.page_size == view.page_size
                    && view.page == loaded.page + 1
            });
        let same_view = state.loaded == Some(view);
        // Appended rows hold earlier pages too; a reload covers its own slice.
        let splice = same_view && self.inner.config.lazy_append;
        let slice = if splice {
            let page_size = ticket.page_size as usize;
            let offset = ticket.page.saturating_sub(state.appended_from) as usize * page_size;
            let start = offset.min(state.rows.len());
            start..(start + page_size).min(state.rows.len())
        } else {
            0..state.rows.len()
        };

        let before = state.selection.count();
        sync_disabled(&mut state.selection, self.inner.config.disable_key.as_deref(), &response.rows);

        // A shrinking total on an unchanged query means rows were deleted.
        if same_view && response.total_records < state.total_records {
            let present: HashSet<&RowKey> = response.rows.iter().map(Row::key).collect();
            let gone: Vec<RowKey> = state.rows[slice.clone()]
                .iter()
                .map(Row::key)
                .filter(|key| !present.contains(key))
                .cloned()
                .collect();
            let pruned = state.selection.prune(gone);
            if pruned > 0 {
                tracing::debug!(target: targets::SELECTION, pruned, "deleted rows dropped from selection");
            }
        }

        if append {
            state.rows.extend(response.rows);
        } else if splice {
            state.rows.splice(slice, response.rows);
        } else {
            state.rows = response.rows;
            state.appended_from = ticket.page;
        }
        state.selection.remember(&state.rows);
        state.total_records = response.total_records;
        state.loaded = Some(view);

        let selection_changed = state.selection.count() != before;
        self.finish_ready(state, ticket.fresh_filter, selection_changed, events);
        true
    }

    fn complete_select_all(
        &self,
        state: &mut GridState,
        ticket: &Ticket,
        result: std::result::Result<FetchResponse, FetchError>,
        events: &mut Vec<GridEvent<X>>,
    ) -> bool {
        if state.select_all_request != Some(ticket.id) || ticket.epoch != state.filter_epoch {
            tracing::debug!(target: targets::GRID, request = %ticket.id, "stale select-all response discarded");
            return false;
        }
        state.select_all_request = None;
        match result {
            Ok(response) => {
                if (response.rows.len() as u64) < response.total_records {
                    tracing::warn!(
                        target: targets::SELECTION,
                        returned = response.rows.len(),
                        total = response.total_records,
                        "server returned fewer rows than requested for select-all"
                    );
                }
                self.select_rows(state, &response.rows, events);
            }
            Err(err) => {
                tracing::warn!(target: targets::GRID, request = %ticket.id, error = %err, "select-all fetch failed");
                state.last_error = Some(err);
            }
        }
        true
    }

    fn apply_local_view(&self, state: &mut GridState, events: &mut Vec<GridEvent<X>>) {
        let before = state.selection.count();
        sync_disabled(&mut state.selection, self.inner.config.disable_key.as_deref(), &state.local_rows);
        let (rows, total) = local::local_page(&state.local_rows, &state.query);
        state.rows = rows;
        state.total_records = total;
        state.selection.remember(&state.rows);
        state.loaded = Some(state.view());
        let fresh_filter = state.fresh_filter_pending;
        let selection_changed = state.selection.count() != before;
        self.finish_ready(state, fresh_filter, selection_changed, events);
    }

    fn finish_ready(
        &self,
        state: &mut GridState,
        fresh_filter: bool,
        mut selection_changed: bool,
        events: &mut Vec<GridEvent<X>>,
    ) {
        state.status = GridStatus::Ready;
        state.last_error = None;
        let selectable = state
            .total_records
            .saturating_sub(self.inner.config.total_disabled_rows);
        state.selection.set_total_selectable(selectable);

        events.push(GridEvent::UpdateTotalRecord {
            table_name: self.inner.config.table_name.clone(),
            total: state.total_records,
        });

        if fresh_filter {
            state.fresh_filter_pending = false;
            if self.inner.config.selection_policy == SelectionPolicy::ClearOnFilter {
                state.selection.clear();
                events.push(GridEvent::ClearSelectedData {
                    table_name: self.inner.config.table_name.clone(),
                });
                selection_changed = false;
            }
        }
        if selection_changed {
            events.push(self.selected_event(state));
        }
        tracing::debug!(
            target: targets::GRID,
            table = ?self.table_name(),
            rows = state.rows.len(),
            total = state.total_records,
            "grid ready"
        );
    }

    fn select_rows(&self, state: &mut GridState, rows: &[Row], events: &mut Vec<GridEvent<X>>) {
        sync_disabled(&mut state.selection, self.inner.config.disable_key.as_deref(), rows);
        state.selection.select_all(rows);
        events.push(self.selected_event(state));
    }

    fn selected_event(&self, state: &GridState) -> GridEvent<X> {
        let rows = state.selection.selected_entries(&self.inner.config.data_key);
        GridEvent::UpdateSelectedData {
            table_name: self.inner.config.table_name.clone(),
            data: (!rows.is_empty()).then_some(rows),
        }
    }

    fn clear_selection_inner(&self, announce: bool) -> Result<()> {
        let _order = self.inner.sequencer.lock();
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(GridError::Disposed);
            }
            state.selection.clear();
            state.snapshot()
        };
        let events = if announce {
            vec![GridEvent::ClearSelectedData {
                table_name: self.inner.config.table_name.clone(),
            }]
        } else {
            Vec::new()
        };
        self.publish(snapshot, events);
        Ok(())
    }

    /// Callers hold the sequencer.
    fn publish(&self, snapshot: GridSnapshot, events: Vec<GridEvent<X>>) {
        self.inner.snapshot_tx.send_replace(snapshot);
        for event in events {
            self.inner.hub.emit(event);
        }
    }

    fn subscribe_all(&self) {
        let ids = vec![
            self.listen(GridEventKind::ApplyFilters, |grid, event| match event {
                GridEvent::ApplyFilters { filter, .. } => grid.apply_filters(filter).map(drop),
                _ => Ok(()),
            }),
            self.listen(GridEventKind::Search, |grid, event| match event {
                GridEvent::Search { search, .. } => grid.search(search.as_deref()).map(drop),
                _ => Ok(()),
            }),
            self.listen(GridEventKind::Update, |grid, _| grid.refresh().map(drop)),
            self.listen(GridEventKind::SelectAllRecord, |grid, _| {
                grid.select_all_records().map(drop)
            }),
            self.listen(GridEventKind::ClearSelectedData, |grid, _| {
                grid.clear_selection_inner(false)
            }),
            self.listen(GridEventKind::ImportToRecords, |grid, event| match event {
                GridEvent::ImportToRecords { data, .. } => grid.import_records(data.clone()),
                _ => Ok(()),
            }),
            self.listen(GridEventKind::ShowFilter, |grid, event| match event {
                GridEvent::ShowFilter { show, .. } => grid.set_filter_visible(*show),
                _ => Ok(()),
            }),
            self.listen(GridEventKind::Download, |grid, event| match event {
                GridEvent::Download { file_name, .. } => grid.download(file_name).map(drop),
                _ => Ok(()),
            }),
        ];
        self.inner.subscriptions.lock().extend(ids);
    }

    fn listen<F>(&self, kind: GridEventKind, action: F) -> SubscriptionId
    where
        F: Fn(&GridController<X>, &GridEvent<X>) -> Result<()> + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        let table = self.inner.config.table_name.clone();
        self.inner.hub.on(kind, move |event| {
            if !event.is_for_table(table.as_deref()) {
                tracing::trace!(target: targets::GRID, ?kind, table = ?table, "event for another table ignored");
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(err) = action(&GridController { inner }, event) {
                tracing::warn!(target: targets::GRID, ?kind, table = ?table, error = %err, "event handling failed");
            }
        })
    }
}

/// Apply the disable flag of `rows` to the tracker.
fn sync_disabled(selection: &mut SelectionTracker, disable_key: Option<&str>, rows: &[Row]) {
    let Some(disable_key) = disable_key else {
        return;
    };
    for row in rows {
        if row.is_truthy(disable_key) {
            selection.mark_disabled(row.key().clone());
        } else {
            selection.mark_enabled(row.key());
        }
    }
}
