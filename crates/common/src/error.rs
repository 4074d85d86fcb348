//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type, as seen by HTTP callers.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Unavailable`] → 503
///
/// `NotFound` deliberately carries no detail. Every rejected redirect token
/// collapses into it, whatever the underlying cause.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The requested resource does not exist, or the token was not accepted.
    #[error("not found")]
    NotFound,

    /// A required resource (key store) is not yet initialised.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::NotFound => 404,
            ServiceError::Unavailable(_) => 503,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound => "not_found",
            ServiceError::Unavailable(_) => "service_unavailable",
        }
    }
}
