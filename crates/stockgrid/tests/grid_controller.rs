//! Behavior of the grid controller against a scripted fetcher.
//!
//! Every fetch parks until the test answers it, so response order is fully
//! under test control.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use stockgrid::grid::{
    FetchFuture, FetchResponse, Fetcher, Filter, FilterOperator, GridConfig, GridController,
    GridEvent, GridEventKind, GridHub, GridSnapshot, GridStatus, QueryParams, RequestId,
    SelectionPolicy, SortOrder, fetcher_fn,
};
use stockgrid::model::{Row, RowKey};
use stockgrid::{FetchError, Topic};
use tokio::sync::oneshot;

type Reply = Result<FetchResponse, FetchError>;

struct Pending {
    params: QueryParams,
    reply: oneshot::Sender<Reply>,
}

impl Pending {
    fn answer(self, reply: Reply) {
        let _ = self.reply.send(reply);
    }
}

#[derive(Clone, Default)]
struct ScriptedFetcher {
    pending: Arc<Mutex<Vec<Pending>>>,
}

impl ScriptedFetcher {
    fn take(&self) -> Vec<Pending> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn take_one(&self) -> Pending {
        let mut pending = self.take();
        assert_eq!(pending.len(), 1, "expected exactly one outstanding fetch");
        pending.remove(0)
    }

    fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, params: QueryParams) -> FetchFuture {
        let (reply, rx) = oneshot::channel();
        self.pending.lock().push(Pending { params, reply });
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(FetchError::Transport("request abandoned".into())))
        })
    }
}

fn page(keys: Range<i64>, total: u64) -> Reply {
    let rows = keys
        .map(|id| Row::new("id", id).with_field("name", format!("item {id}")))
        .collect();
    Ok(FetchResponse::new(rows, total))
}

fn keys(range: Range<i64>) -> Vec<RowKey> {
    range.map(RowKey::Int).collect()
}

fn record(hub: &GridHub, kind: GridEventKind) -> Arc<Mutex<Vec<GridEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    hub.on(kind, move |event: &GridEvent| sink.lock().push(event.clone()));
    log
}

/// Route controller logs to the test output; `RUST_LOG=stockgrid=debug`
/// shows the fetch lifecycle.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn wait_until(grid: &GridController, pred: impl FnMut(&GridSnapshot) -> bool) {
    let mut rx = grid.subscribe_state();
    let _ = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for grid state")
        .expect("grid state channel closed");
}

async fn mounted(config: GridConfig, total: u64) -> (GridHub, ScriptedFetcher, GridController) {
    init_tracing();
    let hub = GridHub::new();
    let fetcher = ScriptedFetcher::default();
    let grid = GridController::new(config, hub.clone(), fetcher.clone()).unwrap();
    let page_size = i64::from(grid.config().page_size);
    grid.mount().unwrap();
    fetcher
        .take_one()
        .answer(page(1..(page_size.min(total as i64) + 1), total));
    grid.settled().await;
    (hub, fetcher, grid)
}

#[tokio::test]
async fn test_last_issued_request_wins() {
    init_tracing();
    let hub = GridHub::new();
    let fetcher = ScriptedFetcher::default();
    let grid = GridController::new(GridConfig::new(), hub.clone(), fetcher.clone()).unwrap();

    let first = grid.mount().unwrap().unwrap();
    let second = grid.search(Some("cement")).unwrap().unwrap();
    assert!(second > first);

    let mut pending = fetcher.take();
    let late = pending.remove(0);
    let current = pending.remove(0);
    assert_eq!(current.params["search"], json!("cement"));

    current.answer(page(100..102, 2));
    wait_until(&grid, |s| s.applied_request == Some(second)).await;

    // The older response arrives last and must not overwrite anything.
    late.answer(page(1..11, 40));
    grid.settled().await;

    let snapshot = grid.snapshot();
    assert_eq!(snapshot.status, GridStatus::Ready);
    assert_eq!(snapshot.row_keys(), keys(100..102));
    assert_eq!(snapshot.total_records, 2);
    assert_eq!(snapshot.applied_request, Some(second));
}

#[tokio::test]
async fn test_events_only_reach_their_table() {
    let hub = GridHub::new();
    let products_fetcher = ScriptedFetcher::default();
    let orders_fetcher = ScriptedFetcher::default();
    let products = GridController::new(
        GridConfig::new().with_table_name("products"),
        hub.clone(),
        products_fetcher.clone(),
    )
    .unwrap();
    let orders = GridController::new(
        GridConfig::new().with_table_name("orders"),
        hub.clone(),
        orders_fetcher.clone(),
    )
    .unwrap();
    products.mount().unwrap();
    orders.mount().unwrap();
    products_fetcher.take_one().answer(page(1..4, 3));
    orders_fetcher.take_one().answer(page(1..6, 5));
    products.settled().await;
    orders.settled().await;

    hub.emit(GridEvent::Search {
        table_name: Some("orders".into()),
        search: Some("pending".into()),
    });
    hub.emit(GridEvent::Update { table_name: None });

    assert_eq!(products_fetcher.outstanding(), 0);
    let request = orders_fetcher.take_one();
    assert_eq!(request.params["tableName"], json!("orders"));
    assert_eq!(request.params["search"], json!("pending"));
    request.answer(page(1..2, 1));
    orders.settled().await;

    assert_eq!(products.snapshot().query.search, None);
    assert_eq!(orders.snapshot().total_records, 1);
}

#[tokio::test]
async fn test_select_all_spans_every_page() {
    let (hub, fetcher, grid) = mounted(GridConfig::new().with_page_size(20), 57).await;
    let selected = record(&hub, GridEventKind::UpdateSelectedData);
    assert_eq!(grid.snapshot().rows.len(), 20);

    let id = grid.select_all_records().unwrap();
    assert!(id.is_some());
    let request = fetcher.take_one();
    assert_eq!(request.params["page"], json!(1));
    assert_eq!(request.params["limit"], json!(57));
    request.answer(page(1..58, 57));
    grid.settled().await;

    assert_eq!(grid.selected_count(), 57);
    let events = selected.lock();
    assert_eq!(events.len(), 1);
    match &events[0] {
        GridEvent::UpdateSelectedData { data: Some(rows), .. } => assert_eq!(rows.len(), 57),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_select_all_dropped_when_filters_change() {
    let (_hub, fetcher, grid) = mounted(GridConfig::new(), 30).await;

    grid.select_all_records().unwrap();
    let select_all = fetcher.take_one();
    grid.apply_filter("brand", Filter::equals(2)).unwrap();
    let filtered = fetcher.take_one();

    select_all.answer(page(1..31, 30));
    filtered.answer(page(1..4, 3));
    grid.settled().await;

    assert_eq!(grid.selected_count(), 0);
    assert_eq!(grid.snapshot().total_records, 3);
}

#[tokio::test]
async fn test_select_all_waits_for_pending_search() {
    let (hub, fetcher, grid) = mounted(GridConfig::new(), 5).await;
    let cleared = record(&hub, GridEventKind::ClearSelectedData);

    grid.search(Some("bolt")).unwrap();
    let search = fetcher.take_one();
    // The five loaded rows belong to the old query.
    assert_eq!(grid.select_all_records().unwrap(), None);
    assert_eq!(fetcher.outstanding(), 0);
    assert_eq!(grid.selected_count(), 0);

    search.answer(page(1..11, 57));
    wait_until(&grid, |s| s.total_records == 57).await;
    let select_all = fetcher.take_one();
    assert_eq!(select_all.params["limit"], json!(57));
    assert_eq!(select_all.params["search"], json!("bolt"));
    select_all.answer(page(1..58, 57));
    grid.settled().await;

    assert_eq!(grid.selected_count(), 57);
    assert_eq!(cleared.lock().len(), 1);
}

#[tokio::test]
async fn test_select_all_during_search_uses_new_total() {
    let (_hub, fetcher, grid) = mounted(GridConfig::new(), 30).await;

    grid.search(Some("nut")).unwrap();
    let search = fetcher.take_one();
    assert_eq!(grid.select_all_records().unwrap(), None);
    assert_eq!(fetcher.outstanding(), 0);

    // The new result fits on the first page.
    search.answer(page(1..4, 3));
    grid.settled().await;
    assert_eq!(fetcher.outstanding(), 0);
    assert_eq!(grid.snapshot().selected_keys, keys(1..4));
}

#[tokio::test]
async fn test_waiting_select_all_dropped_by_newer_search() {
    let (_hub, fetcher, grid) = mounted(GridConfig::new(), 5).await;

    grid.search(Some("bolt")).unwrap();
    grid.select_all_records().unwrap();
    grid.search(Some("nut")).unwrap();
    let mut pending = fetcher.take();
    let current = pending.pop().unwrap();
    pending.pop().unwrap().answer(page(1..11, 57));
    current.answer(page(1..3, 2));
    grid.settled().await;

    assert_eq!(fetcher.outstanding(), 0);
    assert_eq!(grid.selected_count(), 0);
    assert_eq!(grid.snapshot().query.search.as_deref(), Some("nut"));
}

#[tokio::test]
async fn test_failed_fetch_keeps_previous_rows() {
    let (_hub, fetcher, grid) = mounted(GridConfig::new(), 25).await;
    assert!(grid.toggle_row(&RowKey::Int(3)).unwrap());

    grid.set_page(2).unwrap();
    fetcher
        .take_one()
        .answer(Err(FetchError::Transport("HTTP 500".into())));
    grid.settled().await;

    let snapshot = grid.snapshot();
    assert_eq!(snapshot.status, GridStatus::Error);
    assert_eq!(snapshot.row_keys(), keys(1..11));
    assert_eq!(snapshot.selected_keys, vec![RowKey::Int(3)]);
    assert_eq!(snapshot.last_error, Some(FetchError::Transport("HTTP 500".into())));

    // The next successful fetch recovers.
    grid.refresh().unwrap();
    fetcher.take_one().answer(page(11..21, 25));
    grid.settled().await;
    let snapshot = grid.snapshot();
    assert_eq!(snapshot.status, GridStatus::Ready);
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn test_page_size_change_requests_first_page() {
    let (_hub, fetcher, grid) = mounted(GridConfig::new(), 100).await;
    grid.set_page(4).unwrap();
    fetcher.take_one().answer(page(31..41, 100));
    grid.settled().await;

    grid.set_page_size(50).unwrap();
    let request = fetcher.take_one();
    assert_eq!(request.params["page"], json!(1));
    assert_eq!(request.params["limit"], json!(50));
    request.answer(page(1..51, 100));
    grid.settled().await;
    assert_eq!(grid.snapshot().rows.len(), 50);
}

#[tokio::test]
async fn test_sort_is_sent_and_cleared() {
    let (_hub, fetcher, grid) = mounted(GridConfig::new(), 10).await;

    grid.sort_by(Some("name"), SortOrder::Descending).unwrap();
    let request = fetcher.take_one();
    assert_eq!(request.params["sortBy"], json!("name"));
    assert_eq!(request.params["sortOrder"], json!("desc"));
    request.answer(page(1..11, 10));

    grid.sort_by(None, SortOrder::Ascending).unwrap();
    let request = fetcher.take_one();
    assert!(!request.params.contains_key("sortBy"));
    assert!(!request.params.contains_key("sortOrder"));
    request.answer(page(1..11, 10));
    grid.settled().await;
}

#[tokio::test]
async fn test_empty_filters_are_not_sent() {
    let (hub, fetcher, grid) = mounted(GridConfig::new().with_table_name("stock"), 10).await;

    grid.apply_filter("brand", Filter::one_of(Vec::<i64>::new())).unwrap();
    grid.apply_filter("name", Filter::new(FilterOperator::Contains, "  ")).unwrap();
    grid.apply_filter("status", Filter::equals("active")).unwrap();
    let mut pending = fetcher.take();
    let last = pending.pop().unwrap();
    assert_eq!(last.params["status"], json!("active"));
    assert!(!last.params.contains_key("brand"));
    assert!(!last.params.contains_key("name[contains]"));
    for request in pending {
        request.answer(page(1..2, 1));
    }
    last.answer(page(1..2, 1));
    grid.settled().await;

    hub.emit(GridEvent::ApplyFilters {
        table_name: Some("stock".into()),
        filter: QueryParams::from([
            ("brand".to_string(), json!([1, 2])),
            ("qty[gte]".to_string(), json!(5)),
            ("note".to_string(), json!("")),
        ]),
    });
    let request = fetcher.take_one();
    assert_eq!(request.params["brand"], json!([1, 2]));
    assert_eq!(request.params["qty[gte]"], json!(5));
    assert!(!request.params.contains_key("note"));
    assert!(!request.params.contains_key("status"));
    assert_eq!(request.params["page"], json!(1));
    request.answer(page(1..2, 1));
    grid.settled().await;
}

#[tokio::test]
async fn test_toggle_twice_restores_selection() {
    let (hub, _fetcher, grid) = mounted(GridConfig::new(), 10).await;
    let selected = record(&hub, GridEventKind::UpdateSelectedData);

    assert!(grid.toggle_row(&RowKey::Int(4)).unwrap());
    assert!(!grid.toggle_row(&RowKey::Int(4)).unwrap());
    assert_eq!(grid.selected_count(), 0);
    grid.check_invariants().unwrap();

    let events = selected.lock();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[1], GridEvent::UpdateSelectedData { data: None, .. }));
}

#[tokio::test]
async fn test_filter_change_clears_selection() {
    let (hub, fetcher, grid) = mounted(GridConfig::new(), 10).await;
    let cleared = record(&hub, GridEventKind::ClearSelectedData);
    let totals = record(&hub, GridEventKind::UpdateTotalRecord);
    grid.toggle_row(&RowKey::Int(1)).unwrap();
    grid.toggle_row(&RowKey::Int(2)).unwrap();

    grid.search(Some("item 1")).unwrap();
    // Nothing is cleared until the filtered rows arrive.
    assert_eq!(grid.selected_count(), 2);
    fetcher.take_one().answer(page(1..3, 2));
    grid.settled().await;

    assert_eq!(grid.selected_count(), 0);
    assert_eq!(cleared.lock().len(), 1);
    assert!(matches!(
        totals.lock().as_slice(),
        [GridEvent::UpdateTotalRecord { total: 2, .. }]
    ));

    // Paging afterwards does not clear again.
    grid.toggle_row(&RowKey::Int(1)).unwrap();
    grid.set_page(2).unwrap();
    fetcher.take_one().answer(page(11..13, 12));
    grid.settled().await;
    assert_eq!(grid.selected_count(), 1);
    assert_eq!(cleared.lock().len(), 1);
}

#[tokio::test]
async fn test_preserve_policy_keeps_selection() {
    let config = GridConfig::new().with_selection_policy(SelectionPolicy::Preserve);
    let (hub, fetcher, grid) = mounted(config, 10).await;
    let cleared = record(&hub, GridEventKind::ClearSelectedData);
    grid.toggle_row(&RowKey::Int(7)).unwrap();

    grid.apply_filter("brand", Filter::equals(1)).unwrap();
    fetcher.take_one().answer(page(20..22, 2));
    grid.settled().await;

    assert!(grid.is_selected(&RowKey::Int(7)));
    assert!(cleared.lock().is_empty());
}

#[tokio::test]
async fn test_clear_event_clears_selection() {
    let (hub, _fetcher, grid) = mounted(GridConfig::new().with_table_name("stock"), 10).await;
    grid.toggle_row(&RowKey::Int(1)).unwrap();

    hub.emit(GridEvent::ClearSelectedData {
        table_name: Some("stock".into()),
    });
    assert_eq!(grid.selected_count(), 0);

    grid.toggle_row(&RowKey::Int(2)).unwrap();
    let cleared = record(&hub, GridEventKind::ClearSelectedData);
    grid.clear_selection().unwrap();
    assert_eq!(grid.selected_count(), 0);
    assert_eq!(cleared.lock().len(), 1);
}

#[tokio::test]
async fn test_shrinking_total_prunes_deleted_rows() {
    let (_hub, fetcher, grid) = mounted(GridConfig::new(), 10).await;
    grid.toggle_row(&RowKey::Int(2)).unwrap();
    grid.toggle_row(&RowKey::Int(9)).unwrap();

    // Row 9 was deleted elsewhere.
    grid.refresh().unwrap();
    let rows: Vec<Row> = [1, 2, 3, 4, 5, 6, 7, 8, 10]
        .into_iter()
        .map(|id| Row::new("id", id))
        .collect();
    fetcher.take_one().answer(Ok(FetchResponse::new(rows, 9)));
    grid.settled().await;

    assert_eq!(grid.snapshot().selected_keys, vec![RowKey::Int(2)]);
}

#[tokio::test]
async fn test_import_and_download() {
    let dir = tempfile::tempdir().unwrap();
    let config = GridConfig::new()
        .with_table_name("stock")
        .with_page_size(2)
        .with_export_dir(dir.path());
    let (hub, fetcher, grid) = mounted(config, 10).await;
    let totals = record(&hub, GridEventKind::UpdateTotalRecord);

    let imported: Vec<Row> = (1..6)
        .map(|id| Row::new("id", id).with_field("name", format!("imported {id}")))
        .collect();
    hub.emit(GridEvent::ImportToRecords {
        table_name: Some("stock".into()),
        data: imported,
    });

    assert_eq!(fetcher.outstanding(), 0);
    let snapshot = grid.snapshot();
    assert_eq!(snapshot.total_records, 5);
    assert_eq!(snapshot.row_keys(), keys(1..3));
    assert!(matches!(
        totals.lock().as_slice(),
        [GridEvent::UpdateTotalRecord { total: 5, .. }]
    ));

    // Paging imported data happens locally.
    assert_eq!(grid.set_page(3).unwrap(), None);
    assert_eq!(grid.snapshot().row_keys(), keys(5..6));

    hub.emit(GridEvent::Download {
        table_name: Some("stock".into()),
        file_name: "stock".into(),
    });
    let text = std::fs::read_to_string(dir.path().join("stock.csv")).unwrap();
    assert!(text.contains("imported 5"));
    assert!(!text.contains("imported 1"));

    let path = grid.download("selection").unwrap();
    assert!(path.ends_with("selection.csv"));
}

#[tokio::test]
async fn test_dispose_stops_listening() {
    let hub = GridHub::new();
    let fetcher = ScriptedFetcher::default();
    let grid = GridController::new(GridConfig::new(), hub.clone(), fetcher.clone()).unwrap();
    grid.mount().unwrap();
    assert!(hub.handler_count(Topic::Event(GridEventKind::Update)) > 0);

    grid.dispose();
    assert_eq!(hub.subscription_count(), 0);

    fetcher.take_one().answer(page(1..11, 10));
    grid.settled().await;
    assert_eq!(grid.snapshot().status, GridStatus::Fetching);

    hub.emit(GridEvent::Update { table_name: None });
    assert_eq!(fetcher.outstanding(), 0);
    assert!(grid.refresh().is_err());
}

#[tokio::test]
async fn test_dropping_controller_deregisters() {
    let (hub, _fetcher, grid) = mounted(GridConfig::new(), 3).await;
    let clone = grid.clone();
    assert!(hub.subscription_count() > 0);

    drop(grid);
    assert!(hub.subscription_count() > 0);
    drop(clone);
    assert_eq!(hub.subscription_count(), 0);
}

#[tokio::test]
async fn test_non_lazy_grid_loads_once() {
    let hub = GridHub::new();
    let fetcher = ScriptedFetcher::default();
    let grid = GridController::new(
        GridConfig::new().with_lazy(false).with_page_size(5),
        hub.clone(),
        fetcher.clone(),
    )
    .unwrap();
    grid.mount().unwrap();
    let request = fetcher.take_one();
    assert!(!request.params.contains_key("page"));
    request.answer(page(1..13, 12));
    grid.settled().await;

    assert_eq!(grid.snapshot().row_keys(), keys(1..6));
    grid.search(Some("item 1")).unwrap();
    assert_eq!(fetcher.outstanding(), 0);
    // "item 1", "item 10", "item 11", "item 12"
    assert_eq!(grid.snapshot().total_records, 4);

    grid.refresh().unwrap();
    assert_eq!(fetcher.outstanding(), 1);
    fetcher.take_one().answer(page(1..3, 2));
    grid.settled().await;
}

#[tokio::test]
async fn test_state_watch_sees_transitions() {
    let hub = GridHub::new();
    let fetcher = ScriptedFetcher::default();
    let grid = GridController::new(GridConfig::new(), hub, fetcher.clone()).unwrap();
    let rx = grid.subscribe_state();
    assert_eq!(rx.borrow().status, GridStatus::Idle);

    let id: RequestId = grid.mount().unwrap().unwrap();
    assert_eq!(rx.borrow().status, GridStatus::Fetching);
    assert_eq!(rx.borrow().latest_request, Some(id));

    fetcher.take_one().answer(page(1..4, 3));
    wait_until(&grid, |s| s.status == GridStatus::Ready).await;
    assert_eq!(rx.borrow().total_records, 3);
    grid.settled().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_state_watch_ordered_across_threads() {
    init_tracing();
    let fetcher = fetcher_fn(|params: QueryParams| async move {
        let page = params.get("page").and_then(|page| page.as_i64()).unwrap_or(1);
        tokio::task::yield_now().await;
        Ok(FetchResponse::new(vec![Row::new("id", page)], 500))
    });
    let grid = GridController::new(GridConfig::new(), GridHub::new(), fetcher).unwrap();

    let mut rx = grid.subscribe_state();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            seen.push(rx.borrow_and_update().latest_request);
        }
        seen
    });

    grid.mount().unwrap();
    let workers: Vec<_> = (0..4u32)
        .map(|worker| {
            let grid = grid.clone();
            tokio::spawn(async move {
                for offset in 1..=25 {
                    grid.set_page(worker * 25 + offset).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for worker in workers {
        worker.await.unwrap();
    }
    grid.settled().await;

    let snapshot = grid.snapshot();
    assert_eq!(*grid.subscribe_state().borrow(), snapshot);
    assert_eq!(snapshot.status, GridStatus::Ready);
    assert_eq!(snapshot.applied_request, snapshot.latest_request);

    drop(grid);
    let seen = observer.await.unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
}
