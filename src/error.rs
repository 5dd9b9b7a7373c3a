// src/error.rs
//! Request-level error taxonomy surfaced by the search coordinator and the API.

use thiserror::Error;

use crate::ingest::FetchError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str, id: i64 },

    #[error("invalid input for field '{field}': {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// Every provider failed and nothing was fetched. Retryable.
    #[error("provider error: {0}")]
    Provider(#[source] FetchError),

    #[error("database error during {operation}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl SearchError {
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        SearchError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn storage(operation: &'static str, source: StoreError) -> Self {
        SearchError::Storage { operation, source }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::NotFound { .. } => "NOT_FOUND",
            SearchError::InvalidInput { .. } => "INVALID_INPUT",
            SearchError::Provider(_) => "PROVIDER_ERROR",
            SearchError::Storage { .. } => "DATABASE_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Provider(_))
    }
}
