//! Error types for the grid crate.

use thiserror::Error;

/// A rejected fetch.
///
/// The controller treats every rejection the same way regardless of its
/// cause; the variants only separate transport trouble from undecodable
/// payloads for logging and display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not produce a usable response (network, 4xx, 5xx).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The response arrived but could not be decoded into rows.
    #[error("malformed response: {0}")]
    Decode(String),
}

#[cfg(feature = "networking")]
impl From<stockgrid_net::NetworkError> for FetchError {
    fn from(err: stockgrid_net::NetworkError) -> Self {
        match err {
            stockgrid_net::NetworkError::Json(_) => Self::Decode(err.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Grid errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// A fetch was rejected.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Internal state broke one of its guarantees (a caller bug).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A row has no value under the configured data key.
    #[error("row is missing its key field '{0}'")]
    MissingRowKey(String),

    /// A row's key field holds something that cannot identify a row.
    #[error("row key field '{field}' holds unsupported value {value}")]
    InvalidRowKey {
        /// The configured data key.
        field: String,
        /// The offending value, JSON-encoded.
        value: String,
    },

    /// A row or child group was not a JSON object.
    #[error("row must be a JSON object")]
    NotAnObject,

    /// Sorting was requested on a column that does not allow it.
    #[error("column '{0}' is not sortable")]
    ColumnNotSortable(String),

    /// The controller was torn down.
    #[error("grid controller has been disposed")]
    Disposed,

    /// No Tokio runtime was available to drive fetches.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// Writing an export failed.
    #[error("export failed: {0}")]
    Export(String),
}

impl From<csv::Error> for GridError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        Self::Export(err.to_string())
    }
}

/// A specialized Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
