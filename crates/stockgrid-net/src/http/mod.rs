//! HTTP access to the stock-management REST API.
//!
//! # Example
//!
//! ```ignore
//! use stockgrid_net::http::{ListResponse, RestApiClient};
//!
//! let client = RestApiClient::builder("https://stock.example.com/api/v1")
//!     .bearer_auth(token)
//!     .build()?;
//!
//! let page: ListResponse<serde_json::Value> = client
//!     .get_json("stock", &[("page".to_string(), "2".to_string())])
//!     .await?;
//! println!("{} of {}", page.data.data.len(), page.data.total_records);
//! ```

mod client;
mod envelope;

pub use client::{RemoteFile, RestApiClient, RestApiClientBuilder};
pub use envelope::{ApiResponse, ListPayload, ListResponse};
