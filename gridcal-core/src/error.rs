//! Error types for the gridcal engine.

use thiserror::Error;

/// Errors that can occur in gridcal operations.
#[derive(Error, Debug)]
pub enum GridCalError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("No template page '{0}' on the surface")]
    TemplateUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GridCalError {
    /// True for failures of the external tabular surface, which never
    /// invalidate a store write that already succeeded.
    pub fn is_surface(&self) -> bool {
        matches!(
            self,
            GridCalError::Surface(_) | GridCalError::TemplateUnavailable(_)
        )
    }
}

/// Result type alias for gridcal operations.
pub type GridCalResult<T> = Result<T, GridCalError>;
