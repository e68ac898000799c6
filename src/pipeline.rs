//! End-to-end matching run
//!
//! Wires blocking, scoring and matching together under one validated
//! [`MatchConfig`]. The embedding provider is passed in per run, so the same
//! matcher can be reused across models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::blocking::{block, BlockingStats};
use crate::config::{EvaluationConfig, MatchConfig};
use crate::error::{EvaluationError, Result};
use crate::evaluation::{generate_evaluation_report, EvaluationReport, GroundTruth};
use crate::matching::{Matcher, MatchingAlgorithm};
use crate::scoring::{score_pairs, EmbeddingProvider};
use crate::types::{Entity, MatchStatus, Matching, ScoredPair};

/// Number of scored pairs per review status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
}

impl StatusCounts {
    pub fn from_pairs(pairs: &[ScoredPair]) -> Self {
        pairs.iter().fold(Self::default(), |mut counts, pair| {
            match pair.status {
                MatchStatus::Approved => counts.approved += 1,
                MatchStatus::Pending => counts.pending += 1,
                MatchStatus::Rejected => counts.rejected += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.approved + self.pending + self.rejected
    }
}

/// Output of one [`EntityMatcher::run`]
#[derive(Debug, Clone, Serialize)]
pub struct MatchRun {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub algorithm: MatchingAlgorithm,
    pub blocking: BlockingStats,
    /// Every candidate pair with its confidence, best first
    pub scored: Vec<ScoredPair>,
    /// One-to-one selection from `scored`
    pub matches: Matching,
    pub status_counts: StatusCounts,
}

impl MatchRun {
    /// Evaluate the final one-to-one matches
    pub fn evaluate(
        &self,
        ground_truth: &GroundTruth,
        config: &EvaluationConfig,
    ) -> std::result::Result<EvaluationReport, EvaluationError> {
        generate_evaluation_report(self.matches.pairs(), ground_truth, config)
    }

    /// Evaluate every scored candidate, a ranking view before assignment
    pub fn evaluate_candidates(
        &self,
        ground_truth: &GroundTruth,
        config: &EvaluationConfig,
    ) -> std::result::Result<EvaluationReport, EvaluationError> {
        generate_evaluation_report(&self.scored, ground_truth, config)
    }
}

/// Configured blocking → scoring → matching pipeline
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    config: MatchConfig,
}

impl EntityMatcher {
    /// Fails if the configuration is inconsistent
    pub fn new(config: MatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match `left` entities (sponsors) to `right` entities (tickers)
    ///
    /// Entity ids must be unique within each table. Empty tables or a run in
    /// which blocking finds no candidates produce an empty, valid result.
    #[instrument(skip_all, fields(left = left.len(), right = right.len(), model = provider.model_name()))]
    pub fn run<P: EmbeddingProvider + ?Sized>(
        &self,
        left: &[Entity],
        right: &[Entity],
        provider: &P,
    ) -> Result<MatchRun> {
        let run_id = Uuid::new_v4();
        let algorithm = self.config.matching.algorithm;

        let (candidates, blocking) = block(left, right, &self.config.blocking)?;
        let scored = score_pairs(left, right, &candidates, provider, &self.config.scoring)?;
        let matches = algorithm.match_pairs(&scored, self.config.min_match_confidence());
        let status_counts = StatusCounts::from_pairs(&scored);

        info!(
            %run_id,
            %algorithm,
            candidates = blocking.candidate_pairs,
            matches = matches.len(),
            approved = status_counts.approved,
            pending = status_counts.pending,
            rejected = status_counts.rejected,
            "Match run complete"
        );

        Ok(MatchRun {
            run_id,
            created_at: Utc::now(),
            model_name: provider.model_name().to_string(),
            algorithm,
            blocking,
            scored,
            matches,
            status_counts,
        })
    }
}
