//! Relevance judgment over a (query, candidate-set) pair.
//!
//! The LLM-backed judge asks for a fixed `SCORE:` / `DECISION:` / `RAISON:`
//! reply and maps the raw verdict onto the closed decision vocabulary.
//! Malformed output degrades to a safe neutral judgment; it never becomes a
//! parse error.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::core::errors::RetrievalError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};
use crate::retrieval::types::{Candidate, Decision, Evaluation};

/// How many candidates are shown to the judge, and how much of each.
const JUDGED_CANDIDATES: usize = 5;
const EXCERPT_CHARS: usize = 300;

/// Below this score an ambiguous verdict asks for reformulation instead of
/// partial use.
const AMBIGUOUS_REFORMULATE_CUTOFF: f32 = 0.6;

#[async_trait]
pub trait RelevanceEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        query: &str,
        candidates: &[Candidate],
    ) -> Result<Evaluation, RetrievalError>;
}

/// LLM-backed relevance judge.
pub struct LlmEvaluator {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmEvaluator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl RelevanceEvaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        query: &str,
        candidates: &[Candidate],
    ) -> Result<Evaluation, RetrievalError> {
        if candidates.is_empty() {
            return Ok(Evaluation::no_documents());
        }

        let judged = &candidates[..candidates.len().min(JUDGED_CANDIDATES)];
        let prompt = build_judge_prompt(query, judged);

        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(0.1)
            .with_max_tokens(500);

        let reply = self.provider.chat(request, &self.model).await?;
        Ok(parse_verdict(&reply, judged))
    }
}

fn build_judge_prompt(query: &str, candidates: &[Candidate]) -> String {
    let mut excerpts = Vec::with_capacity(candidates.len());
    for (i, candidate) in candidates.iter().enumerate() {
        excerpts.push(format!(
            "DOC{}: {}...",
            i + 1,
            clip_chars(&candidate.content, EXCERPT_CHARS)
        ));
    }

    format!(
        "Tu es un évaluateur de pertinence pour un système documentaire.\n\n\
         QUESTION: {query}\n\n\
         DOCUMENTS À ÉVALUER:\n{}\n\n\
         Évalue si ces documents contiennent des informations suffisamment \
         pertinentes pour répondre à la question.\n\n\
         Réponds EXACTEMENT dans ce format:\n\
         SCORE: [0.0 à 1.0]\n\
         DECISION: [CORRECT|AMBIGU|INCORRECT]\n\
         RAISON: [explication courte]\n\n\
         Critères:\n\
         - CORRECT (0.8-1.0): Documents très pertinents, réponse complète possible\n\
         - AMBIGU (0.4-0.7): Informations partielles, réponse possible mais incomplète\n\
         - INCORRECT (0.0-0.3): Documents non pertinents ou hors sujet",
        excerpts.join("\n\n")
    )
}

/// Map the judge's free-text reply onto an `Evaluation`.
///
/// Raw verdicts: CORRECT keeps every candidate; AMBIGU keeps the first
/// `max(2, n/2)` and decides between partial use and reformulation on the
/// score; anything else keeps nothing and asks to search wider. A reply
/// missing the expected fields falls back to the neutral judgment.
fn parse_verdict(reply: &str, candidates: &[Candidate]) -> Evaluation {
    let score_re = Regex::new(r"SCORE:\s*([\d.]+)").ok();
    let decision_re = Regex::new(r"DECISION:\s*(\w+)").ok();
    let reason_re = Regex::new(r"RAISON:\s*(.+)").ok();

    let score = score_re
        .and_then(|re| re.captures(reply).and_then(|c| c[1].parse::<f32>().ok()));
    let raw_decision = decision_re
        .and_then(|re| re.captures(reply).map(|c| c[1].to_string()));

    if score.is_none() && raw_decision.is_none() {
        return Evaluation::neutral(candidates);
    }

    let score = score.unwrap_or(0.5).clamp(0.0, 1.0);
    let raw_decision = raw_decision.unwrap_or_else(|| "AMBIGU".to_string());
    let reason = reason_re
        .and_then(|re| re.captures(reply).map(|c| c[1].trim().to_string()))
        .unwrap_or_else(|| "Évaluation automatique".to_string());

    let (decision, relevant) = match raw_decision.as_str() {
        "CORRECT" => (Decision::Utiliser, candidates.to_vec()),
        "AMBIGU" => {
            let keep = (candidates.len() / 2).max(2).min(candidates.len());
            let decision = if score < AMBIGUOUS_REFORMULATE_CUTOFF {
                Decision::Reformuler
            } else {
                Decision::UtiliserPartiel
            };
            (decision, candidates[..keep].to_vec())
        }
        _ => (Decision::ChercherPlus, Vec::new()),
    };

    Evaluation {
        score,
        decision,
        relevant,
        reason,
    }
}

fn clip_chars(text: &str, len: usize) -> &str {
    match text.char_indices().nth(len) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate {
                content: format!("Article {i} : contenu du document"),
                source: format!("doc{i}.pdf"),
                distance: Some(0.5),
            })
            .collect()
    }

    #[test]
    fn correct_verdict_keeps_everything() {
        let docs = candidates(4);
        let eval = parse_verdict(
            "SCORE: 0.9\nDECISION: CORRECT\nRAISON: très pertinent",
            &docs,
        );
        assert_eq!(eval.decision, Decision::Utiliser);
        assert_eq!(eval.score, 0.9);
        assert_eq!(eval.relevant.len(), 4);
        assert_eq!(eval.reason, "très pertinent");
    }

    #[test]
    fn ambiguous_low_score_reformulates() {
        let docs = candidates(5);
        let eval = parse_verdict("SCORE: 0.45\nDECISION: AMBIGU\nRAISON: partiel", &docs);
        assert_eq!(eval.decision, Decision::Reformuler);
        assert_eq!(eval.relevant.len(), 2);
    }

    #[test]
    fn ambiguous_high_score_uses_partially() {
        let docs = candidates(6);
        let eval = parse_verdict("SCORE: 0.65\nDECISION: AMBIGU\nRAISON: ok", &docs);
        assert_eq!(eval.decision, Decision::UtiliserPartiel);
        assert_eq!(eval.relevant.len(), 3);
    }

    #[test]
    fn incorrect_verdict_keeps_nothing() {
        let docs = candidates(3);
        let eval = parse_verdict("SCORE: 0.1\nDECISION: INCORRECT\nRAISON: hors sujet", &docs);
        assert_eq!(eval.decision, Decision::ChercherPlus);
        assert!(eval.relevant.is_empty());
    }

    #[test]
    fn out_of_range_score_is_clamped() {
        let docs = candidates(2);
        let eval = parse_verdict("SCORE: 7.5\nDECISION: CORRECT\nRAISON: x", &docs);
        assert_eq!(eval.score, 1.0);
    }

    #[test]
    fn garbage_reply_degrades_to_neutral() {
        let docs = candidates(5);
        let eval = parse_verdict("je ne sais pas répondre à cette question", &docs);
        assert_eq!(eval.score, 0.5);
        assert_eq!(eval.decision, Decision::UtiliserPartiel);
        assert_eq!(eval.relevant.len(), 3);
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn health_check(&self) -> Result<bool, RetrievalError> {
            Ok(true)
        }

        async fn chat(&self, _: ChatRequest, _: &str) -> Result<String, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("SCORE: 0.8\nDECISION: CORRECT\nRAISON: ok".to_string())
        }

        async fn embed(&self, _: &[String], _: &str) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Err(RetrievalError::Provider("no embeddings".to_string()))
        }
    }

    #[tokio::test]
    async fn empty_candidates_short_circuit_without_model_call() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let evaluator = LlmEvaluator::new(provider.clone(), "judge");

        let eval = evaluator.evaluate("question", &[]).await.unwrap();
        assert_eq!(eval.decision, Decision::ChercherPlus);
        assert_eq!(eval.score, 0.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn judge_sees_at_most_five_candidates() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let evaluator = LlmEvaluator::new(provider.clone(), "judge");

        let eval = evaluator.evaluate("question", &candidates(8)).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(eval.relevant.len(), 5);
    }
}
