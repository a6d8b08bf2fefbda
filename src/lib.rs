//! corag — corrective-retrieval controller for question answering over a
//! private document corpus.
//!
//! The core is a bounded retrieve → judge → correct loop: each iteration
//! searches the vector index, asks a relevance judge whether the evidence is
//! good enough, and either accepts, reformulates the query or broadens the
//! search via keyword fan-out. The loop produces a `SearchResult` — an
//! ordered, deduplicated evidence set with a confidence score, a strategy
//! label and the full per-iteration audit trail — which a downstream answer
//! generator consumes.
//!
//! Collaborators (vector index, judge, reformulator, LLM provider) are
//! injected trait objects; ingestion and answer generation live outside
//! this crate.

pub mod core;
pub mod index;
pub mod llm;
pub mod logging;
pub mod retrieval;

pub use crate::core::{RetrievalConfig, RetrievalError};
pub use crate::index::{SqliteVectorIndex, StoredChunk, VectorIndex};
pub use crate::llm::{ChatMessage, ChatRequest, LlmProvider, OpenAiCompatProvider};
pub use crate::retrieval::{
    Candidate, Decision, Evaluation, IterationRecord, LlmEvaluator, LlmReformulator,
    QueryReformulator, RelevanceEvaluator, RetrievalController, SearchResult, Strategy,
};
