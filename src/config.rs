//! Matching configuration
//!
//! Loads the engine configuration from YAML and provides strongly-typed
//! access to thresholds, blocking rules, matcher selection and evaluation
//! settings. Every section has defaults, so an empty document is valid.
//!
//! ```yaml
//! scoring:
//!   approve_at_or_above: 0.85
//!   reject_below: 0.65
//! blocking:
//!   min_token_length: 2
//!   skip_blocking: false
//! matching:
//!   algorithm: optimal
//! evaluation:
//!   k_values: [1, 3, 5, 10, 20]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::matching::MatchingAlgorithm;

/// Default confidence at or above which a pair is auto-approved
pub const DEFAULT_APPROVE_AT_OR_ABOVE: f64 = 0.85;

/// Default confidence below which a pair is auto-rejected
pub const DEFAULT_REJECT_BELOW: f64 = 0.65;

/// Tokens shorter than this are ignored by blocking
pub const DEFAULT_MIN_TOKEN_LENGTH: usize = 2;

/// Legal suffixes and generic industry words ignored by blocking.
///
/// These carry no identity: "Acme Pharmaceuticals Inc" and "Zenith
/// Pharmaceuticals Inc" must not become candidates on "pharmaceuticals".
pub const DEFAULT_DOMAIN_STOPWORDS: &[&str] = &[
    "inc",
    "corp",
    "corporation",
    "ltd",
    "limited",
    "llc",
    "plc",
    "ag",
    "sa",
    "nv",
    "bv",
    "gmbh",
    "co",
    "company",
    "companies",
    "pharmaceutical",
    "pharmaceuticals",
    "pharma",
    "biotech",
    "therapeutics",
    "biosciences",
    "laboratories",
    "lab",
    "labs",
    "healthcare",
    "health",
    "medical",
    "sciences",
    "science",
    "international",
    "global",
    "group",
    "holdings",
    "the",
];

/// Default top-K values reported by the evaluator
pub const DEFAULT_K_VALUES: &[usize] = &[1, 3, 5, 10, 20];

const ENV_SKIP_BLOCKING: &str = "SPONSOR_MATCH_SKIP_BLOCKING";
const ENV_ALGORITHM: &str = "SPONSOR_MATCH_ALGORITHM";
const ENV_APPROVE_AT: &str = "SPONSOR_MATCH_APPROVE_AT";
const ENV_REJECT_BELOW: &str = "SPONSOR_MATCH_REJECT_BELOW";

/// Root configuration for a matching run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub scoring: ScoringConfig,
    pub blocking: BlockingConfig,
    pub matching: MatchingConfig,
    pub evaluation: EvaluationConfig,
}

/// Confidence thresholds and scoring context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Confidence at or above this is `approved`
    pub approve_at_or_above: f64,
    /// Confidence strictly below this is `rejected`
    pub reject_below: f64,
    /// Right-entity attributes appended to the name before embedding.
    /// Empty means the name alone is embedded.
    pub context_attributes: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            approve_at_or_above: DEFAULT_APPROVE_AT_OR_ABOVE,
            reject_below: DEFAULT_REJECT_BELOW,
            context_attributes: Vec::new(),
        }
    }
}

/// Candidate generation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    pub min_token_length: usize,
    pub domain_stopwords: BTreeSet<String>,
    /// Pair every left entity with every right entity (development only)
    pub skip_blocking: bool,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            min_token_length: DEFAULT_MIN_TOKEN_LENGTH,
            domain_stopwords: DEFAULT_DOMAIN_STOPWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_blocking: false,
        }
    }
}

/// Matcher selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub algorithm: MatchingAlgorithm,
    /// Minimum confidence for a pair to enter the assignment.
    /// Falls back to `scoring.reject_below` when unset.
    pub min_confidence: Option<f64>,
}

/// Ground-truth column names for loosely-typed label rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundTruthColumns {
    pub left: String,
    pub right: String,
    pub label: String,
}

impl Default for GroundTruthColumns {
    fn default() -> Self {
        Self {
            left: "left_id".to_string(),
            right: "right_id".to_string(),
            label: "label".to_string(),
        }
    }
}

/// Evaluation report settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub k_values: Vec<usize>,
    pub thresholds: Vec<f64>,
    pub columns: GroundTruthColumns,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            k_values: DEFAULT_K_VALUES.to_vec(),
            thresholds: default_thresholds(),
            columns: GroundTruthColumns::default(),
        }
    }
}

/// 0.00, 0.05, ..., 1.00
pub fn default_thresholds() -> Vec<f64> {
    (0..=20).map(|i| i as f64 / 20.0).collect()
}

impl MatchConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to null; treat it as all defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: MatchConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SPONSOR_MATCH_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment in production)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SKIP_BLOCKING) {
            self.blocking.skip_blocking = match value.trim() {
                "1" | "true" => true,
                "0" | "false" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        key: ENV_SKIP_BLOCKING,
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup(ENV_ALGORITHM) {
            self.matching.algorithm = value.parse()?;
        }
        if let Some(value) = lookup(ENV_APPROVE_AT) {
            self.scoring.approve_at_or_above = parse_threshold(ENV_APPROVE_AT, value)?;
        }
        if let Some(value) = lookup(ENV_REJECT_BELOW) {
            self.scoring.reject_below = parse_threshold(ENV_REJECT_BELOW, value)?;
        }
        debug!(
            skip_blocking = self.blocking.skip_blocking,
            algorithm = %self.matching.algorithm,
            "Applied configuration overrides"
        );
        self.validate()?;
        Ok(self)
    }

    /// Check threshold ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scoring = &self.scoring;
        check_unit_interval("approve_at_or_above", scoring.approve_at_or_above)?;
        check_unit_interval("reject_below", scoring.reject_below)?;
        if scoring.reject_below >= scoring.approve_at_or_above {
            return Err(ConfigError::ThresholdOrder {
                reject_below: scoring.reject_below,
                approve_at_or_above: scoring.approve_at_or_above,
            });
        }
        if let Some(min) = self.matching.min_confidence {
            check_unit_interval("min_confidence", min)?;
        }
        if self.blocking.min_token_length == 0 {
            return Err(ConfigError::MinTokenLength);
        }
        if self.evaluation.k_values.contains(&0) {
            return Err(ConfigError::InvalidKValue);
        }
        for &threshold in &self.evaluation.thresholds {
            check_unit_interval("evaluation.thresholds", threshold)?;
        }
        if self.blocking.skip_blocking && self.matching.algorithm == MatchingAlgorithm::Optimal {
            return Err(ConfigError::OptimalWithoutBlocking);
        }
        Ok(())
    }

    /// Minimum confidence used by the matcher
    pub fn min_match_confidence(&self) -> f64 {
        self.matching
            .min_confidence
            .unwrap_or(self.scoring.reject_below)
    }
}

fn check_unit_interval(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange { name, value })
    }
}

fn parse_threshold(key: &'static str, value: String) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidOverride { key, value })
}
