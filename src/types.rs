//! Record types flowing through the matching stages

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GroundTruthError;

/// Identifier of an entity within its own table (sponsor name, ticker symbol)
pub type EntityId = String;

/// A row of either entity table
///
/// Left entities (sponsors) usually carry only a name. Right entities
/// (tickers) may carry descriptive attributes; these feed scoring context
/// and never identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<String>>,
}

impl Entity {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.attributes
            .insert(key.into(), value.map(|v| v.to_string()));
        self
    }

    /// Attribute value, `None` when absent or null
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_deref())
    }
}

/// A (left, right) combination produced by blocking
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    pub left_id: EntityId,
    pub right_id: EntityId,
}

impl CandidatePair {
    pub fn new(left_id: impl Into<String>, right_id: impl Into<String>) -> Self {
        Self {
            left_id: left_id.into(),
            right_id: right_id.into(),
        }
    }
}

/// Review status derived from confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Approved,
    Pending,
    Rejected,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchStatus::Approved => "approved",
            MatchStatus::Pending => "pending",
            MatchStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A candidate pair with its confidence, status and justification
///
/// This is also the row shape of the outbound scored/matched-pair table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPair {
    pub left_id: EntityId,
    pub right_id: EntityId,
    pub confidence: f64,
    pub status: MatchStatus,
    pub reason: String,
}

impl ScoredPair {
    pub fn key(&self) -> (&str, &str) {
        (&self.left_id, &self.right_id)
    }

    pub fn candidate(&self) -> CandidatePair {
        CandidatePair::new(self.left_id.clone(), self.right_id.clone())
    }
}

/// Orders by confidence descending, then ids ascending.
///
/// Every stage that ranks pairs uses this ordering so ties resolve the same
/// way from run to run.
pub(crate) fn by_confidence_desc(a: &ScoredPair, b: &ScoredPair) -> std::cmp::Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.left_id.cmp(&b.left_id))
        .then_with(|| a.right_id.cmp(&b.right_id))
}

/// A one-to-one selection of scored pairs
///
/// No `left_id` and no `right_id` appears more than once. Only the matchers
/// and [`Matching::try_from_pairs`] construct values, so the invariant holds
/// for every instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Matching {
    pairs: Vec<ScoredPair>,
}

impl Matching {
    /// Build from pairs already known to be injective
    pub(crate) fn from_injective(mut pairs: Vec<ScoredPair>) -> Self {
        pairs.sort_by(by_confidence_desc);
        Self { pairs }
    }

    /// Validate an externally supplied selection
    ///
    /// Returns the first repeated endpoint on failure.
    pub fn try_from_pairs(pairs: Vec<ScoredPair>) -> Result<Self, CandidatePair> {
        let mut lefts = BTreeSet::new();
        let mut rights = BTreeSet::new();
        for pair in &pairs {
            if !lefts.insert(pair.left_id.as_str()) || !rights.insert(pair.right_id.as_str()) {
                return Err(pair.candidate());
            }
        }
        Ok(Self::from_injective(pairs))
    }

    /// Pairs ordered by confidence descending
    pub fn pairs(&self) -> &[ScoredPair] {
        &self.pairs
    }

    pub fn into_pairs(self) -> Vec<ScoredPair> {
        self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn contains(&self, left_id: &str, right_id: &str) -> bool {
        self.pairs
            .iter()
            .any(|p| p.left_id == left_id && p.right_id == right_id)
    }

    /// Right entity assigned to `left_id`, if any
    pub fn right_for(&self, left_id: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.left_id == left_id)
            .map(|p| p.right_id.as_str())
    }

    /// Sum of confidences, accumulated in the canonical pair order
    pub fn total_confidence(&self) -> f64 {
        self.pairs.iter().map(|p| p.confidence).sum()
    }

    pub fn average_confidence(&self) -> f64 {
        if self.pairs.is_empty() {
            0.0
        } else {
            self.total_confidence() / self.pairs.len() as f64
        }
    }

    /// Chosen (left, right) combinations
    pub fn pair_keys(&self) -> BTreeSet<CandidatePair> {
        self.pairs.iter().map(ScoredPair::candidate).collect()
    }
}

/// Curated correctness label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Correct,
    Incorrect,
    Unknown,
}

impl FromStr for Label {
    type Err = String;

    /// Strict: only the three lowercase spellings are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Label::Correct),
            "incorrect" => Ok(Label::Incorrect),
            "unknown" => Ok(Label::Unknown),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Correct => "correct",
            Label::Incorrect => "incorrect",
            Label::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One externally curated ground-truth row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthLabel {
    pub left_id: EntityId,
    pub right_id: EntityId,
    pub label: Label,
}

impl GroundTruthLabel {
    pub fn new(left_id: impl Into<String>, right_id: impl Into<String>, label: Label) -> Self {
        Self {
            left_id: left_id.into(),
            right_id: right_id.into(),
            label,
        }
    }

    /// Parse a raw label string, failing fast on anything unrecognised
    pub fn parse(
        row: usize,
        left_id: impl Into<String>,
        right_id: impl Into<String>,
        label: &str,
    ) -> Result<Self, GroundTruthError> {
        let label = label
            .parse::<Label>()
            .map_err(|label| GroundTruthError::InvalidLabel { row, label })?;
        Ok(Self::new(left_id, right_id, label))
    }
}
