//! Retrieval configuration.
//!
//! The threshold constants here are tuned empirically against the legal
//! corpus the system was built for. They are configuration, not semantics:
//! a deployment can override any of them from a YAML file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::RetrievalError;

/// Design constants governing the corrective-retrieval loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates farther than this from the query embedding are discarded
    /// during direct retrieval (lower distance = more similar).
    pub distance_cutoff: f32,
    /// A partial-use judgment above this score is accepted without
    /// reformulating first.
    pub partial_accept_score: f32,
    /// How many top candidates are handed to the relevance judge.
    pub eval_top_n: usize,
    /// Prefix length (in characters) of the content signature used for
    /// deduplication.
    pub signature_len: usize,
    /// Maximum number of keyword terms driving a broadened retrieval.
    pub keyword_fanout: usize,
    /// Maximum documents taken from the best iteration when the loop
    /// exhausts without an accept decision.
    pub fallback_doc_limit: usize,
    /// Default retrieval fan-out per query.
    pub default_k: usize,
    /// Default bound on loop iterations.
    pub default_max_iterations: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            distance_cutoff: 1.5,
            partial_accept_score: 0.6,
            eval_top_n: 5,
            signature_len: 100,
            keyword_fanout: 3,
            fallback_doc_limit: 5,
            default_k: 15,
            default_max_iterations: 3,
        }
    }
}

impl RetrievalConfig {
    /// Load a configuration from a YAML file, falling back to defaults for
    /// any field the file omits.
    pub fn from_yaml_file(path: &Path) -> Result<Self, RetrievalError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            RetrievalError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| RetrievalError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        if !self.distance_cutoff.is_finite() || self.distance_cutoff <= 0.0 {
            return Err(RetrievalError::InvalidConfig(
                "distance_cutoff must be a positive finite number".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.partial_accept_score) {
            return Err(RetrievalError::InvalidConfig(
                "partial_accept_score must be within [0.0, 1.0]".to_string(),
            ));
        }
        for (name, value) in [
            ("eval_top_n", self.eval_top_n),
            ("signature_len", self.signature_len),
            ("keyword_fanout", self.keyword_fanout),
            ("fallback_doc_limit", self.fallback_doc_limit),
            ("default_k", self.default_k),
            ("default_max_iterations", self.default_max_iterations),
        ] {
            if value == 0 {
                return Err(RetrievalError::InvalidConfig(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RetrievalConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_score() {
        let config = RetrievalConfig {
            partial_accept_score: 1.2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_iterations() {
        let config = RetrievalConfig {
            default_max_iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: RetrievalConfig = serde_yaml::from_str("distance_cutoff: 2.0").unwrap();
        assert_eq!(config.distance_cutoff, 2.0);
        assert_eq!(config.eval_top_n, 5);
        assert_eq!(config.default_max_iterations, 3);
    }
}
