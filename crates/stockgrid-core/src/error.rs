//! Error types for stockgrid core.

use thiserror::Error;

/// Hub-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The subscription id is invalid or has already been removed.
    #[error("Invalid or removed subscription id")]
    UnknownSubscription,
}

/// A specialized Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
