//! Server-paginated data grid coordination.
//!
//! `stockgrid` keeps the widgets of a stock-administration screen in step:
//! a table, its search box, filter panel, selection counter and export
//! button talk to each other only through a shared event hub, and a
//! [`grid::GridController`] turns their requests into fetches.
//!
//! - **Model**: rows, column descriptors and the cross-page
//!   [`model::SelectionTracker`]
//! - **Grid**: the event catalog, query builder, fetch capability and
//!   controller
//! - **Codes**: product and transaction codes shown in stock tables
//!
//! Enable the `networking` feature for [`grid::RestFetcher`], which loads
//! pages through `stockgrid-net`.
//!
//! # Example
//!
//! ```no_run
//! use stockgrid::grid::{FetchResponse, GridConfig, GridController, GridEvent, GridHub, fetcher_fn};
//! use stockgrid::model::Row;
//!
//! # async fn demo() -> stockgrid::Result<()> {
//! let hub = GridHub::new();
//! let grid = GridController::new(
//!     GridConfig::new().with_table_name("products"),
//!     hub.clone(),
//!     fetcher_fn(|_params| async {
//!         Ok(FetchResponse::new(vec![Row::new("id", 1)], 1))
//!     }),
//! )?;
//! grid.mount()?;
//!
//! // A search box elsewhere on the page.
//! hub.emit(GridEvent::Search {
//!     table_name: Some("products".into()),
//!     search: Some("cement".into()),
//! });
//!
//! grid.settled().await;
//! # Ok(())
//! # }
//! ```

pub mod codes;
mod error;
pub mod grid;
pub mod model;

pub use error::{FetchError, GridError, Result};
pub use stockgrid_core::{EventHub, HubEvent, SubscriptionGuard, SubscriptionId, Topic};
