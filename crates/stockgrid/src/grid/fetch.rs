//! The fetch capability.
//!
//! A [`Fetcher`] turns query parameters into a page of rows. The controller
//! owns no transport of its own: production code plugs in a REST-backed
//! fetcher (feature `networking`), tests plug in closures.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;

use super::query::QueryParams;
use crate::error::FetchError;
use crate::model::Row;

/// One page of rows plus the total number of matching records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchResponse {
    /// Rows of the requested page.
    pub rows: Vec<Row>,
    /// Records matching the query across all pages.
    pub total_records: u64,
}

impl FetchResponse {
    /// Create a response.
    pub fn new(rows: Vec<Row>, total_records: u64) -> Self {
        Self {
            rows,
            total_records,
        }
    }

    /// Decode the list envelope `{ data: { data: [...], totalRecords } }`.
    ///
    /// A bare `{ data: [...], totalRecords }` payload is accepted as well.
    /// When `totalRecords` is missing the row count is used.
    pub fn from_json(body: &Value, data_key: &str) -> Result<Self, FetchError> {
        let payload = match body.get("data") {
            Some(inner @ Value::Object(_)) => inner,
            _ => body,
        };
        let Some(Value::Array(items)) = payload.get("data") else {
            return Err(FetchError::Decode("missing data array".into()));
        };
        let rows = rows_from_json(items.iter().cloned(), data_key)?;
        let total_records = match payload.get("totalRecords") {
            Some(total) => total
                .as_u64()
                .ok_or_else(|| FetchError::Decode(format!("invalid totalRecords {total}")))?,
            None => rows.len() as u64,
        };
        Ok(Self::new(rows, total_records))
    }
}

/// Parse raw JSON records into rows keyed by `data_key`.
pub fn rows_from_json<I>(items: I, data_key: &str) -> Result<Vec<Row>, FetchError>
where
    I: IntoIterator<Item = Value>,
{
    items
        .into_iter()
        .map(|item| Row::from_json(item, data_key).map_err(|err| FetchError::Decode(err.to_string())))
        .collect()
}

/// Future returned by [`Fetcher::fetch`].
pub type FetchFuture = BoxFuture<'static, Result<FetchResponse, FetchError>>;

/// Asynchronously loads rows for a parameter bag.
pub trait Fetcher: Send + Sync + 'static {
    /// Start loading rows for `params`.
    fn fetch(&self, params: QueryParams) -> FetchFuture;
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch(&self, params: QueryParams) -> FetchFuture {
        (**self).fetch(params)
    }
}

/// A [`Fetcher`] backed by a closure. See [`fetcher_fn`].
pub struct FnFetcher<F> {
    func: F,
}

impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(QueryParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FetchResponse, FetchError>> + Send + 'static,
{
    fn fetch(&self, params: QueryParams) -> FetchFuture {
        (self.func)(params).boxed()
    }
}

/// Wrap an async closure as a [`Fetcher`].
///
/// # Example
///
/// ```
/// use stockgrid::grid::{FetchResponse, fetcher_fn};
///
/// let fetcher = fetcher_fn(|_params| async { Ok(FetchResponse::default()) });
/// # let _ = fetcher;
/// ```
pub fn fetcher_fn<F, Fut>(func: F) -> FnFetcher<F>
where
    F: Fn(QueryParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FetchResponse, FetchError>> + Send + 'static,
{
    FnFetcher { func }
}

#[cfg(feature = "networking")]
pub use rest::RestFetcher;

#[cfg(feature = "networking")]
mod rest {
    use stockgrid_core::logging::targets;
    use stockgrid_net::RestApiClient;

    use super::{FetchFuture, FetchResponse, Fetcher};
    use crate::grid::query::{QueryParams, query_pairs};

    /// Fetches a paginated resource from the REST API.
    ///
    /// Issues `GET {base}/{resource}` with the parameters as query string;
    /// arrays become repeated keys.
    #[derive(Debug, Clone)]
    pub struct RestFetcher {
        client: RestApiClient,
        resource: String,
        data_key: String,
    }

    impl RestFetcher {
        /// Create a fetcher for `resource`, keying rows by `id`.
        pub fn new(client: RestApiClient, resource: impl Into<String>) -> Self {
            Self {
                client,
                resource: resource.into(),
                data_key: "id".to_string(),
            }
        }

        /// Key rows by `data_key` instead of `id`.
        pub fn with_data_key(mut self, data_key: impl Into<String>) -> Self {
            self.data_key = data_key.into();
            self
        }

        /// The resource path.
        pub fn resource(&self) -> &str {
            &self.resource
        }
    }

    impl Fetcher for RestFetcher {
        fn fetch(&self, params: QueryParams) -> FetchFuture {
            let client = self.client.clone();
            let resource = self.resource.clone();
            let data_key = self.data_key.clone();
            let pairs = query_pairs(&params);
            Box::pin(async move {
                tracing::debug!(target: targets::REST, %resource, "fetching page");
                let body: serde_json::Value = client.get_json(&resource, &pairs).await?;
                FetchResponse::from_json(&body, &data_key)
            })
        }
    }
}
