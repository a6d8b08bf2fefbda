//! Language-model boundary.
//!
//! The retrieval core crosses into an LLM for three things only: relevance
//! judgments, query reformulation and query embeddings. All three go through
//! the `LlmProvider` trait so tests can substitute deterministic doubles.

pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiCompatProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};
