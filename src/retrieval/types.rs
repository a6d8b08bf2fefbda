//! Data model of the corrective-retrieval loop.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retrieved passage.
///
/// Candidates are produced fresh by each retrieval and never mutated, only
/// filtered and collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Passage text.
    pub content: String,
    /// Origin document identifier.
    pub source: String,
    /// Distance reported by the index (lower = more similar), when known.
    pub distance: Option<f32>,
}

impl Candidate {
    /// Content signature used for deduplication: a fixed-length character
    /// prefix, so near-duplicate chunks with identical openings collapse.
    pub fn signature(&self, len: usize) -> &str {
        match self.content.char_indices().nth(len) {
            Some((byte_index, _)) => &self.content[..byte_index],
            None => &self.content,
        }
    }
}

/// Drop candidates whose signature was already seen; first appearance wins,
/// input order is preserved.
pub fn dedup_by_signature(candidates: Vec<Candidate>, signature_len: usize) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if seen.insert(candidate.signature(signature_len).to_owned()) {
            unique.push(candidate);
        }
    }
    unique
}

/// The closed decision vocabulary of the relevance judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Evidence is good enough to answer from directly.
    #[serde(rename = "UTILISER")]
    Utiliser,
    /// Evidence is usable but incomplete.
    #[serde(rename = "UTILISER_PARTIEL")]
    UtiliserPartiel,
    /// The query itself should be rephrased.
    #[serde(rename = "REFORMULER")]
    Reformuler,
    /// The evidence is off-topic; search wider.
    #[serde(rename = "CHERCHER_PLUS")]
    ChercherPlus,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Utiliser => "UTILISER",
            Decision::UtiliserPartiel => "UTILISER_PARTIEL",
            Decision::Reformuler => "REFORMULER",
            Decision::ChercherPlus => "CHERCHER_PLUS",
        }
    }
}

/// The judgment produced for one (query, candidate-set) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Global relevance score in [0.0, 1.0].
    pub score: f32,
    pub decision: Decision,
    /// Order-preserving sub-sequence of the judged candidates.
    pub relevant: Vec<Candidate>,
    /// Diagnostic only, never used in control flow.
    pub reason: String,
}

impl Evaluation {
    /// Judgment for an empty candidate set, produced without consulting any
    /// model.
    pub fn no_documents() -> Self {
        Self {
            score: 0.0,
            decision: Decision::ChercherPlus,
            relevant: Vec::new(),
            reason: "Aucun document trouvé".to_string(),
        }
    }

    /// Safe neutral judgment used when the judge fails or returns something
    /// unparseable: middling score, partial use, a conservative subset of
    /// the input.
    pub fn neutral(candidates: &[Candidate]) -> Self {
        Self {
            score: 0.5,
            decision: Decision::UtiliserPartiel,
            relevant: candidates.iter().take(3).cloned().collect(),
            reason: "Évaluation par défaut".to_string(),
        }
    }
}

/// Per-iteration audit entry, kept for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// The query this iteration actually searched with.
    pub query: String,
    /// Raw candidates retrieved (post distance filter).
    pub candidates: Vec<Candidate>,
    pub evaluation: Evaluation,
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn new(query: String, candidates: Vec<Candidate>, evaluation: Evaluation) -> Self {
        Self {
            query,
            candidates,
            evaluation,
            recorded_at: Utc::now(),
        }
    }
}

/// Which decision path produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Accepted on a direct-use judgment.
    #[serde(rename = "DIRECT")]
    Direct,
    /// Accepted on a partial-use judgment.
    #[serde(rename = "PARTIEL")]
    Partiel,
    /// A broadened retrieval out-scored the direct one.
    #[serde(rename = "RECHERCHE_ETENDUE")]
    RechercheEtendue,
    /// Iterations exhausted; best-scoring iteration was selected.
    #[serde(rename = "FALLBACK_BEST")]
    FallbackBest,
    /// No usable evidence was ever retrieved.
    #[serde(rename = "AUCUN_RESULTAT")]
    AucunResultat,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "DIRECT",
            Strategy::Partiel => "PARTIEL",
            Strategy::RechercheEtendue => "RECHERCHE_ETENDUE",
            Strategy::FallbackBest => "FALLBACK_BEST",
            Strategy::AucunResultat => "AUCUN_RESULTAT",
        }
    }
}

/// The controller's final evidence package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Chosen relevant candidates, deduplicated by content signature.
    pub documents: Vec<Candidate>,
    /// Score of the evaluation that supplied `documents` (0.0 when empty).
    pub confidence: f32,
    pub strategy: Strategy,
    /// Iterations consumed; always within `1..=max_iterations`.
    pub iterations: usize,
    /// Full audit trail of the run.
    pub records: Vec<IterationRecord>,
}

impl SearchResult {
    pub fn empty(iterations: usize, records: Vec<IterationRecord>) -> Self {
        Self {
            documents: Vec::new(),
            confidence: 0.0,
            strategy: Strategy::AucunResultat,
            iterations,
            records,
        }
    }

    /// Convenience accessor for callers that do not need the audit trail.
    pub fn into_documents(self) -> Vec<Candidate> {
        self.documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str) -> Candidate {
        Candidate {
            content: content.to_string(),
            source: "code_du_travail.pdf".to_string(),
            distance: None,
        }
    }

    #[test]
    fn signature_respects_char_boundaries() {
        let c = candidate("Le congé de maternité est fixé à quatorze semaines");
        assert_eq!(c.signature(12), "Le congé de ");
        assert_eq!(c.signature(1000), c.content);
    }

    #[test]
    fn dedup_keeps_first_appearance() {
        let shared_opening = "Article 25.1 : la durée du préavis".to_string();
        let a = Candidate {
            content: format!("{shared_opening} est de huit jours."),
            source: "a.pdf".to_string(),
            distance: Some(0.4),
        };
        let b = Candidate {
            content: format!("{shared_opening} peut être prolongée."),
            source: "b.pdf".to_string(),
            distance: Some(0.9),
        };
        let c = candidate("Tout autre contenu");

        let unique = dedup_by_signature(vec![a.clone(), b, c], 20);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].source, "a.pdf");
        assert_eq!(unique[1].source, "code_du_travail.pdf");
    }

    #[test]
    fn decision_labels_round_trip() {
        for decision in [
            Decision::Utiliser,
            Decision::UtiliserPartiel,
            Decision::Reformuler,
            Decision::ChercherPlus,
        ] {
            let json = serde_json::to_string(&decision).unwrap();
            assert_eq!(json, format!("\"{}\"", decision.as_str()));
            let back: Decision = serde_json::from_str(&json).unwrap();
            assert_eq!(back, decision);
        }
    }

    #[test]
    fn neutral_evaluation_is_conservative() {
        let candidates: Vec<Candidate> =
            (0..6).map(|i| candidate(&format!("doc {i}"))).collect();
        let eval = Evaluation::neutral(&candidates);
        assert_eq!(eval.score, 0.5);
        assert_eq!(eval.decision, Decision::UtiliserPartiel);
        assert_eq!(eval.relevant.len(), 3);
        assert_eq!(eval.relevant[0].content, "doc 0");
    }
}
