use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::RetrievalError;

/// A language-model backend used by the relevance judge, the query
/// reformulator and the vector index (for query embeddings).
///
/// Implementations are injected at construction; the core never configures
/// a process-wide client.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "openai", "lmstudio").
    fn name(&self) -> &str;

    /// Check if the provider is healthy/reachable.
    async fn health_check(&self) -> Result<bool, RetrievalError>;

    /// Chat completion (non-streaming).
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RetrievalError>;

    /// Generate embeddings, one vector per input, in input order.
    async fn embed(&self, inputs: &[String], model_id: &str)
        -> Result<Vec<Vec<f32>>, RetrievalError>;
}
