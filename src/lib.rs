//! Sponsor ↔ Ticker Entity Resolution
//!
//! Links free-text clinical-trial sponsor names to public-company ticker
//! records when no shared identifier exists.
//!
//! # Architecture
//!
//! ```text
//! left entities (sponsors)        right entities (tickers)
//!          │                               │
//!          │                               ▼
//!          │               ┌─────────────────────────────────┐
//!          │               │  TokenIndex (token → ticker ids) │
//!          │               └─────────────────────────────────┘
//!          ▼                               │
//! ┌─────────────────────────────────────────────────────────┐
//! │  Blocking: shared significant token → CandidateSet       │
//! └─────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │  Scoring: EmbeddingProvider → dot product → ScoredPair   │
//! │  approved ≥ 0.85 │ pending │ rejected < 0.65             │
//! └─────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │  Matching: greedy | optimal (Kuhn-Munkres) → Matching    │
//! └─────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │  Evaluation: P / R / F1 / coverage, @K, threshold sweep  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Every stage is a pure function over its explicit inputs. The embedding
//! model is injected by the caller through [`EmbeddingProvider`].
//!
//! # Quick Start
//!
//! ```rust
//! use sponsor_match::{Entity, EntityMatcher, HashedTrigramEmbedder, MatchConfig};
//!
//! let sponsors = vec![Entity::new("s1", "Pfizer")];
//! let tickers = vec![Entity::new("PFE", "Pfizer Inc.")];
//!
//! let matcher = EntityMatcher::new(MatchConfig::default()).unwrap();
//! let embedder = HashedTrigramEmbedder::default();
//! let run = matcher.run(&sponsors, &tickers, &embedder).unwrap();
//!
//! assert_eq!(run.matches.len(), 1);
//! ```

pub mod blocking;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod matching;
pub mod pipeline;
pub mod scoring;
pub mod types;

pub use blocking::{
    all_pairs, build_token_index, generate_candidates, BlockingStats, CandidateSet, TextField,
    TokenIndex, Tokenizer,
};
pub use config::{
    BlockingConfig, EvaluationConfig, GroundTruthColumns, MatchConfig, MatchingConfig,
    ScoringConfig,
};
pub use error::{
    BlockingError, ConfigError, Error, EvaluationError, GroundTruthError, Result, ScoringError,
};
pub use evaluation::{
    compute_metrics, compute_metrics_at_k, confusion_examples, generate_evaluation_report,
    threshold_analysis, ConfusionCategory, ConfusionExample, EvaluationMetrics,
    EvaluationReport, GroundTruth, ThresholdPoint, ThresholdSweep,
};
pub use matching::{
    compare_matchers, GreedyMatcher, Matcher, MatcherComparison, MatchingAlgorithm,
    OptimalMatcher,
};
pub use pipeline::{EntityMatcher, MatchRun, StatusCounts};
pub use scoring::{score_pairs, EmbeddingProvider, HashedTrigramEmbedder, Thresholds};
pub use types::*;
