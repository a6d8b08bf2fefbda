//! Query reformulation and keyword extraction.
//!
//! Two independent operations: producing alternate phrasings of a query,
//! and extracting search terms for broadened retrieval. Both degrade
//! gracefully so the controller always has a next query to try.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::errors::RetrievalError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};

/// Failure path of keyword extraction returns this many query tokens.
const FALLBACK_TOKEN_LIMIT: usize = 5;

/// Terms of at most this many characters are noise (articles, prepositions).
const MIN_TERM_CHARS: usize = 2;

#[async_trait]
pub trait QueryReformulator: Send + Sync {
    /// Produce up to `desired_count` self-contained rephrasings of `query`,
    /// each directly usable as a new search query.
    async fn reformulate(
        &self,
        query: &str,
        desired_count: usize,
    ) -> Result<Vec<String>, RetrievalError>;

    /// Extract salient search terms from `query`, each longer than two
    /// characters. Duplicates may remain; downstream dedup handles them.
    async fn extract_keywords(&self, query: &str) -> Result<Vec<String>, RetrievalError>;
}

/// First whitespace tokens of the query, verbatim. Shared fallback for a
/// failed or absent reformulator.
pub fn fallback_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .take(FALLBACK_TOKEN_LIMIT)
        .map(str::to_string)
        .collect()
}

/// LLM-backed reformulator.
pub struct LlmReformulator {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmReformulator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl QueryReformulator for LlmReformulator {
    async fn reformulate(
        &self,
        query: &str,
        desired_count: usize,
    ) -> Result<Vec<String>, RetrievalError> {
        let prompt = format!(
            "Génère {desired_count} reformulations différentes de cette question \
             pour améliorer la recherche documentaire:\n\n\
             QUESTION ORIGINALE: {query}\n\n\
             Génère des variantes qui:\n\
             1. Utilisent des synonymes du domaine\n\
             2. Changent la structure de la phrase\n\
             3. Ajoutent des termes techniques pertinents\n\n\
             Format: une reformulation par ligne, sans numérotation."
        );

        let request = ChatRequest::new(vec![ChatMessage::user(prompt)]);
        match self.provider.chat(request, &self.model).await {
            Ok(reply) => {
                let variants: Vec<String> = reply
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .take(desired_count)
                    .map(str::to_string)
                    .collect();
                if variants.is_empty() {
                    Ok(vec![query.to_string()])
                } else {
                    Ok(variants)
                }
            }
            Err(err) => {
                tracing::warn!("Reformulation failed, keeping original query: {err}");
                Ok(vec![query.to_string()])
            }
        }
    }

    async fn extract_keywords(&self, query: &str) -> Result<Vec<String>, RetrievalError> {
        let prompt = format!(
            "Extrait les mots-clés les plus importants de cette question:\n\n\
             QUESTION: {query}\n\n\
             Retourne uniquement les mots-clés séparés par des virgules, sans explication."
        );

        let request = ChatRequest::new(vec![ChatMessage::user(prompt)]);
        match self.provider.chat(request, &self.model).await {
            Ok(reply) => {
                let terms: Vec<String> = reply
                    .split(',')
                    .map(str::trim)
                    .filter(|term| term.chars().count() > MIN_TERM_CHARS)
                    .map(str::to_string)
                    .collect();
                if terms.is_empty() {
                    Ok(fallback_keywords(query))
                } else {
                    Ok(terms)
                }
            }
            Err(err) => {
                tracing::warn!("Keyword extraction failed, using query tokens: {err}");
                Ok(fallback_keywords(query))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn health_check(&self) -> Result<bool, RetrievalError> {
            Ok(true)
        }

        async fn chat(&self, _: ChatRequest, _: &str) -> Result<String, RetrievalError> {
            self.reply
                .clone()
                .map_err(RetrievalError::Provider)
        }

        async fn embed(&self, _: &[String], _: &str) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Err(RetrievalError::Provider("no embeddings".to_string()))
        }
    }

    fn reformulator(reply: Result<&str, &str>) -> LlmReformulator {
        LlmReformulator::new(
            Arc::new(FixedProvider {
                reply: reply.map(str::to_string).map_err(str::to_string),
            }),
            "rewriter",
        )
    }

    #[tokio::test]
    async fn splits_variants_per_line() {
        let r = reformulator(Ok(
            "Quelle est la durée du préavis ?\n\nCombien de temps dure le préavis de licenciement ?\nTroisième variante\nQuatrième",
        ));
        let variants = r.reformulate("durée préavis", 3).await.unwrap();
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0], "Quelle est la durée du préavis ?");
    }

    #[tokio::test]
    async fn reformulate_failure_returns_original() {
        let r = reformulator(Err("connexion refusée"));
        let variants = r.reformulate("durée préavis", 3).await.unwrap();
        assert_eq!(variants, vec!["durée préavis".to_string()]);
    }

    #[tokio::test]
    async fn keywords_are_comma_split_and_filtered() {
        let r = reformulator(Ok("préavis, licenciement, CD, durée légale"));
        let terms = r.extract_keywords("question").await.unwrap();
        assert_eq!(
            terms,
            vec!["préavis", "licenciement", "durée légale"]
        );
    }

    #[tokio::test]
    async fn keyword_failure_uses_query_tokens() {
        let r = reformulator(Err("timeout"));
        let terms = r
            .extract_keywords("durée du préavis de licenciement en CDI")
            .await
            .unwrap();
        assert_eq!(terms, vec!["durée", "du", "préavis", "de", "licenciement"]);
    }

    #[test]
    fn fallback_keywords_handles_short_queries() {
        assert_eq!(
            fallback_keywords("congé parental"),
            vec!["congé", "parental"]
        );
        assert!(fallback_keywords("").is_empty());
    }
}
