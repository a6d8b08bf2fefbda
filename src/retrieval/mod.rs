//! Corrective-retrieval loop: controller, judge and reformulator contracts.

pub mod controller;
pub mod evaluator;
pub mod reformulator;
pub mod types;

pub use controller::RetrievalController;
pub use evaluator::{LlmEvaluator, RelevanceEvaluator};
pub use reformulator::{LlmReformulator, QueryReformulator};
pub use types::{
    dedup_by_signature, Candidate, Decision, Evaluation, IterationRecord, SearchResult, Strategy,
};
