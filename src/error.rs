//! Error types for the matching engine
//!
//! One `thiserror` enum per stage, aggregated by [`Error`] so callers that run
//! the whole pipeline can use a single `?`.

use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error for a matching run
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Blocking error: {0}")]
    Blocking(#[from] BlockingError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Ground truth error: {0}")]
    GroundTruth(#[from] GroundTruthError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
}

/// Invalid or inconsistent configuration
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Threshold '{name}' must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("reject_below ({reject_below}) must be strictly less than approve_at_or_above ({approve_at_or_above})")]
    ThresholdOrder {
        reject_below: f64,
        approve_at_or_above: f64,
    },

    #[error("min_token_length must be at least 1")]
    MinTokenLength,

    #[error("Unknown matching algorithm '{0}', expected 'greedy' or 'optimal'")]
    UnknownAlgorithm(String),

    #[error("evaluation.k_values must all be at least 1")]
    InvalidKValue,

    #[error("The optimal matcher cannot run without blocking (full cartesian product)")]
    OptimalWithoutBlocking,

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Invalid entity tables handed to blocking
#[derive(Error, Debug, PartialEq)]
pub enum BlockingError {
    #[error("Duplicate {side} entity id '{id}'")]
    DuplicateEntityId { side: &'static str, id: String },
}

/// Failures of the scoring stage
///
/// Any malformed output from the embedding capability is a hard failure.
#[derive(Error, Debug, PartialEq)]
pub enum ScoringError {
    #[error("Embedding provider failed: {0}")]
    Embedding(String),

    #[error("Embedding provider returned {got} vectors for {expected} texts")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Embedding for text #{index} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("Embedding provider returned zero-dimensional vectors")]
    EmptyVector,

    #[error("Embedding for text #{index} contains non-finite values")]
    NonFinite { index: usize },

    #[error("Embedding for text #{index} is not unit-normalized (norm {norm})")]
    NotNormalized { index: usize, norm: f64 },

    #[error("Candidate references unknown {side} entity '{id}'")]
    UnknownEntity { side: &'static str, id: String },
}

/// Ground-truth validation failures, raised before any metric is computed
#[derive(Error, Debug, PartialEq)]
pub enum GroundTruthError {
    #[error("Ground truth row {row} is missing required column '{column}'")]
    MissingColumn { row: usize, column: String },

    #[error("Ground truth row {row} has invalid label '{label}', expected one of: correct, incorrect, unknown")]
    InvalidLabel { row: usize, label: String },

    #[error("Ground truth contains conflicting labels for ({left_id}, {right_id})")]
    ConflictingLabels { left_id: String, right_id: String },
}

/// Invalid evaluation parameters
#[derive(Error, Debug, PartialEq)]
pub enum EvaluationError {
    #[error("K must be at least 1")]
    InvalidK,

    #[error("Threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),

    #[error("Threshold grid step must be positive, got {0}")]
    InvalidStep(f64),
}
