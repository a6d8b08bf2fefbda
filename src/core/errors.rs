use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the retrieval core.
///
/// Only `IndexNotFound` and `InvalidConfig` are raised at construction time
/// and cross the controller boundary. Collaborator failures (`Provider`,
/// `Storage`) are absorbed inside the search loop and encoded in the
/// returned `SearchResult` instead of propagating.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("vector index not found at {0}")]
    IndexNotFound(PathBuf),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RetrievalError {
    pub fn provider<E: std::fmt::Display>(err: E) -> Self {
        RetrievalError::Provider(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RetrievalError::Storage(err.to_string())
    }
}
