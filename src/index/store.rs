//! VectorIndex trait — abstract interface over the document embedding index.
//!
//! The index is built offline by the ingestion job and opened once; the
//! controller only ever reads from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::RetrievalError;
use crate::retrieval::types::Candidate;

/// A document chunk as persisted in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk identifier.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Origin document identifier (file name).
    pub source: String,
}

impl StoredChunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            chunk_id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            source: source.into(),
        }
    }
}

/// Nearest-neighbor search over pre-computed document embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Search for passages similar to `query`, ordered by ascending distance
    /// (most similar first). Each returned candidate carries its distance.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>, RetrievalError>;

    /// Convenience variant returning only the passage texts.
    async fn search_contents(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self
            .search(query, k)
            .await?
            .into_iter()
            .map(|candidate| candidate.content)
            .collect())
    }
}
