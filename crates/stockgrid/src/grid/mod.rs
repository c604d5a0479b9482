//! Grid coordination.
//!
//! The pieces a server-paginated table is assembled from:
//!
//! - **Events**: the [`GridEvent`] catalog carried by a [`GridHub`]
//! - **Queries**: [`QueryState`] and the parameter builder that turns it into
//!   a request
//! - **Fetching**: the [`Fetcher`] capability and its closure and REST forms
//! - **Controller**: [`GridController`], which ties query state, fetched rows
//!   and selection together
//! - **Transfer**: CSV export and client-side views of imported records

mod config;
mod controller;
pub mod event;
pub mod export;
mod fetch;
pub mod local;
pub mod query;

pub use config::{DEFAULT_PAGE_SIZE, GridConfig, SelectionPolicy};
pub use controller::{DataSource, GridController, GridSnapshot, GridStatus, RequestId};
pub use event::{GridEvent, GridEventKind, GridHub, NoExtension, UserProfile, global_hub};
#[cfg(feature = "networking")]
pub use fetch::RestFetcher;
pub use fetch::{FetchFuture, FetchResponse, Fetcher, FnFetcher, fetcher_fn, rows_from_json};
pub use query::{Filter, FilterOperator, QueryParams, QueryState, SortOrder, build_query, merge_params};
