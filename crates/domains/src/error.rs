//! # AppError
//!
//! Errors that can escape the feed engine. Store outages are normally absorbed
//! by fallbacks; what remains here is what a caller has to render.

use thiserror::Error;

/// The primary error type for feed engine operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., a post that was deleted)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Invalid request parameters (e.g., page size of zero)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The source of truth could not be reached and no fallback was left
    #[error("feed unavailable: {0}")]
    Unavailable(String),

    /// Anything else that should not have happened
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

/// A specialized Result type for feed engine logic.
pub type Result<T> = std::result::Result<T, AppError>;
