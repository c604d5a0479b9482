//! Networking module for stockgrid.
//!
//! This crate provides the REST client the grid uses as its production fetch
//! capability:
//!
//! - **Configuration**: [`ApiConfig`] resolves the API origin from the
//!   environment or a TOML document
//! - **REST client**: [`http::RestApiClient`] with base URL, bearer auth and
//!   JSON decoding
//! - **Envelopes**: typed `{ message, data: { data, totalRecords } }` responses
//!
//! Authentication storage and token refresh live outside this crate; a 401
//! answer surfaces as [`NetworkError::Authentication`] and the caller decides
//! what to do with it.

pub mod config;
mod error;
pub mod http;

pub use config::{ApiConfig, AppMode};
pub use error::{NetworkError, Result};

// Re-export commonly used types at the crate root
pub use http::{ApiResponse, ListPayload, ListResponse, RemoteFile, RestApiClient, RestApiClientBuilder};
