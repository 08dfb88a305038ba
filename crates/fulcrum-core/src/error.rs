//! Common error types shared across the Fulcrum crates.

use crate::ids::{JobId, ServiceId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the Fulcrum system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A service with the specified ID was not found.
    #[error("service not found: {0}")]
    ServiceNotFound(ServiceId),

    /// A job with the specified ID was not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
