//! Response envelopes used by the stock-management API.

use serde::Deserialize;

/// Every API response wraps its payload with a human-readable message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiResponse<T> {
    /// HTTP-like status echoed by the server, when present.
    #[serde(default)]
    pub status: Option<u16>,
    /// Server message.
    #[serde(default)]
    pub message: String,
    /// The payload.
    pub data: T,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPayload<T> {
    /// Rows of the requested page.
    pub data: Vec<T>,
    /// Number of records matching the query across all pages.
    pub total_records: u64,
}

/// Response of a paginated list endpoint.
pub type ListResponse<T> = ApiResponse<ListPayload<T>>;
