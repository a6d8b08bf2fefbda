//! The corrective-retrieval controller.
//!
//! One call to `search` runs the bounded loop:
//! retrieve → judge → { accept | accept partially | reformulate | broaden }.
//! Collaborator failures never abort a run; they degrade into explicit
//! branches (empty candidate set, neutral judgment, unchanged query) and the
//! loop bound is the sole liveness guarantee. All scratch state is
//! call-local, so one controller is safe to share across concurrent callers.

use std::sync::Arc;

use crate::core::config::RetrievalConfig;
use crate::core::errors::RetrievalError;
use crate::index::store::VectorIndex;
use crate::retrieval::evaluator::RelevanceEvaluator;
use crate::retrieval::reformulator::{fallback_keywords, QueryReformulator};
use crate::retrieval::types::{
    dedup_by_signature, Candidate, Decision, Evaluation, IterationRecord, SearchResult, Strategy,
};

pub struct RetrievalController {
    index: Arc<dyn VectorIndex>,
    evaluator: Option<Arc<dyn RelevanceEvaluator>>,
    reformulator: Option<Arc<dyn QueryReformulator>>,
    config: RetrievalConfig,
}

impl RetrievalController {
    /// Build a controller over an opened index.
    ///
    /// `evaluator` and `reformulator` are optional: without an evaluator the
    /// controller runs in direct mode (one retrieval, accepted as-is);
    /// without a reformulator, reformulation keeps the query unchanged and
    /// keyword extraction falls back to query tokens.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        evaluator: Option<Arc<dyn RelevanceEvaluator>>,
        reformulator: Option<Arc<dyn QueryReformulator>>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        Ok(Self {
            index,
            evaluator,
            reformulator,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run the loop with the configured defaults for fan-out and iteration
    /// bound.
    pub async fn search(&self, query: &str) -> SearchResult {
        self.search_with(query, self.config.default_k, self.config.default_max_iterations)
            .await
    }

    /// Run the corrective-retrieval loop for `query`.
    ///
    /// Never fails: exhaustion resolves through fallback-best and a truly
    /// empty corpus yields an empty result with zero confidence.
    pub async fn search_with(&self, query: &str, k: usize, max_iterations: usize) -> SearchResult {
        let k = k.max(1);
        let max_iterations = max_iterations.max(1);

        let Some(evaluator) = self.evaluator.clone() else {
            return self.search_direct(query, k).await;
        };

        let mut records: Vec<IterationRecord> = Vec::new();
        let mut current_query = query.to_string();
        let mut iterations = 0usize;

        for iteration in 1..=max_iterations {
            iterations = iteration;

            let mut candidates = self.retrieve(&current_query, k).await;
            if candidates.is_empty() && iteration == 1 {
                tracing::debug!("First retrieval empty, broadening with keyword search");
                candidates = self.expand(query, k).await;
                if candidates.is_empty() {
                    break;
                }
            }

            let evaluation = self.judge(evaluator.as_ref(), query, &candidates).await;
            tracing::info!(
                iteration,
                decision = evaluation.decision.as_str(),
                score = evaluation.score,
                candidates = candidates.len(),
                "Relevance judgment"
            );
            records.push(IterationRecord::new(
                current_query.clone(),
                candidates,
                evaluation.clone(),
            ));

            match evaluation.decision {
                Decision::Utiliser => {
                    return self.accept(Strategy::Direct, evaluation, iteration, records);
                }
                Decision::UtiliserPartiel => {
                    if iteration == max_iterations
                        || evaluation.score > self.config.partial_accept_score
                    {
                        return self.accept(Strategy::Partiel, evaluation, iteration, records);
                    }
                    current_query = self.next_query(&current_query).await;
                }
                Decision::Reformuler => {
                    current_query = self.next_query(&current_query).await;
                }
                Decision::ChercherPlus => {
                    let broadened = self.expand(query, k * 2).await;
                    let broadened_eval = self.judge(evaluator.as_ref(), query, &broadened).await;
                    records.push(IterationRecord::new(
                        query.to_string(),
                        broadened,
                        broadened_eval.clone(),
                    ));

                    if broadened_eval.score > evaluation.score {
                        return self.accept(
                            Strategy::RechercheEtendue,
                            broadened_eval,
                            iteration,
                            records,
                        );
                    }
                    current_query = self.next_query(&current_query).await;
                }
            }
        }

        self.fall_back(max_iterations, iterations, records)
    }

    /// Direct mode, used when no evaluator was injected: a single retrieval
    /// (broadened once if empty) accepted with neutral confidence.
    async fn search_direct(&self, query: &str, k: usize) -> SearchResult {
        let mut candidates = self.retrieve(query, k).await;
        if candidates.is_empty() {
            candidates = self.expand(query, k).await;
        }
        if candidates.is_empty() {
            return SearchResult::empty(1, Vec::new());
        }

        let kept: Vec<Candidate> = candidates
            .iter()
            .take(self.config.eval_top_n)
            .cloned()
            .collect();
        let evaluation = Evaluation {
            score: 0.5,
            decision: Decision::UtiliserPartiel,
            relevant: kept,
            reason: "Mode direct sans évaluateur".to_string(),
        };
        let records = vec![IterationRecord::new(
            query.to_string(),
            candidates,
            evaluation.clone(),
        )];

        self.accept(Strategy::Direct, evaluation, 1, records)
    }

    /// Single-query similarity search, filtered by the distance cutoff.
    /// A failed search step degrades to an empty candidate set.
    async fn retrieve(&self, query: &str, k: usize) -> Vec<Candidate> {
        match self.index.search(query, k).await {
            Ok(candidates) => candidates
                .into_iter()
                .filter(|c| {
                    c.distance
                        .map_or(true, |d| d < self.config.distance_cutoff)
                })
                .collect(),
            Err(err) => {
                tracing::warn!("Vector search failed for '{query}': {err}");
                Vec::new()
            }
        }
    }

    /// Broadened retrieval: keyword fan-out over the original query, merged
    /// in term order, deduplicated by first appearance, truncated to `k`.
    async fn expand(&self, original_query: &str, k: usize) -> Vec<Candidate> {
        let terms = self.keywords(original_query).await;
        let per_term = (k / self.config.keyword_fanout).max(1);

        let mut merged: Vec<Candidate> = Vec::new();
        for term in &terms {
            match self.index.search(term, per_term).await {
                Ok(candidates) => merged.extend(candidates),
                Err(err) => {
                    tracing::warn!("Keyword search failed for '{term}': {err}");
                }
            }
        }

        let mut unique = dedup_by_signature(merged, self.config.signature_len);
        unique.truncate(k);
        tracing::debug!(
            terms = terms.len(),
            candidates = unique.len(),
            "Broadened retrieval"
        );
        unique
    }

    /// Keyword terms for broadened retrieval, capped at the configured
    /// fan-out. Extraction failure or an absent reformulator degrades to
    /// whitespace tokens of the query.
    async fn keywords(&self, query: &str) -> Vec<String> {
        let mut terms = match &self.reformulator {
            Some(reformulator) => match reformulator.extract_keywords(query).await {
                Ok(terms) if !terms.is_empty() => terms,
                Ok(_) => fallback_keywords(query),
                Err(err) => {
                    tracing::warn!("Keyword extraction failed: {err}");
                    fallback_keywords(query)
                }
            },
            None => fallback_keywords(query),
        };
        terms.truncate(self.config.keyword_fanout);
        terms
    }

    /// Next query for the loop. Reformulation failure or an absent
    /// reformulator keeps the current query unchanged; bounded iteration
    /// makes the retry acceptable.
    async fn next_query(&self, current: &str) -> String {
        match &self.reformulator {
            Some(reformulator) => match reformulator.reformulate(current, 1).await {
                Ok(variants) => variants
                    .into_iter()
                    .map(|v| v.trim().to_string())
                    .find(|v| !v.is_empty())
                    .unwrap_or_else(|| current.to_string()),
                Err(err) => {
                    tracing::warn!("Reformulation failed, retrying current query: {err}");
                    current.to_string()
                }
            },
            None => current.to_string(),
        }
    }

    /// Judge the top candidates against the original question. An evaluator
    /// failure degrades to the neutral judgment; an empty candidate set is
    /// judged without consulting the evaluator at all.
    async fn judge(
        &self,
        evaluator: &dyn RelevanceEvaluator,
        question: &str,
        candidates: &[Candidate],
    ) -> Evaluation {
        if candidates.is_empty() {
            return Evaluation::no_documents();
        }

        let top = &candidates[..candidates.len().min(self.config.eval_top_n)];
        match evaluator.evaluate(question, top).await {
            Ok(mut evaluation) => {
                evaluation.score = evaluation.score.clamp(0.0, 1.0);
                evaluation
            }
            Err(err) => {
                tracing::warn!("Evaluation failed, using neutral judgment: {err}");
                Evaluation::neutral(top)
            }
        }
    }

    fn accept(
        &self,
        strategy: Strategy,
        evaluation: Evaluation,
        iterations: usize,
        records: Vec<IterationRecord>,
    ) -> SearchResult {
        let documents = dedup_by_signature(evaluation.relevant, self.config.signature_len);
        tracing::info!(
            strategy = strategy.as_str(),
            confidence = evaluation.score,
            iterations,
            documents = documents.len(),
            "Retrieval accepted"
        );
        SearchResult {
            documents,
            confidence: evaluation.score,
            strategy,
            iterations,
            records,
        }
    }

    /// Exhaustion path: the best-scoring iteration supplies the result. The
    /// first record reaching the maximum score wins ties. With no records at
    /// all (every retrieval came back empty), the result is empty with zero
    /// confidence.
    fn fall_back(
        &self,
        max_iterations: usize,
        iterations: usize,
        records: Vec<IterationRecord>,
    ) -> SearchResult {
        let mut best: Option<usize> = None;
        for (i, record) in records.iter().enumerate() {
            let is_better = match best {
                Some(b) => record.evaluation.score > records[b].evaluation.score,
                None => true,
            };
            if is_better {
                best = Some(i);
            }
        }

        match best {
            Some(i) => {
                let confidence = records[i].evaluation.score;
                let mut documents = records[i].evaluation.relevant.clone();
                documents.truncate(self.config.fallback_doc_limit);
                let documents = dedup_by_signature(documents, self.config.signature_len);
                tracing::info!(
                    confidence,
                    documents = documents.len(),
                    "Iterations exhausted, falling back to best-scoring batch"
                );
                SearchResult {
                    documents,
                    confidence,
                    strategy: Strategy::FallbackBest,
                    iterations: max_iterations,
                    records,
                }
            }
            None => {
                tracing::info!("No usable evidence retrieved");
                SearchResult::empty(iterations.max(1), records)
            }
        }
    }
}
