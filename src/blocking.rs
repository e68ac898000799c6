//! Candidate generation via token blocking
//!
//! Reduces O(n×m) comparisons to roughly O(n×k) by comparing only entities
//! that share at least one significant token:
//!
//! - Unicode NFKC fold
//! - Lowercase conversion
//! - Split on non-alphanumeric boundaries
//! - Drop short tokens and domain stopwords (legal suffixes, generic
//!   industry words)
//!
//! The trade-off is a small false-negative risk (a true match whose names
//! share no significant token) in exchange for far fewer pairs reaching the
//! scorer, which is the expensive stage.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use unicode_normalization::UnicodeNormalization;

use crate::config::BlockingConfig;
use crate::error::BlockingError;
use crate::types::{CandidatePair, Entity, EntityId};

/// Above this many pairs an unblocked run is logged as a warning
const CARTESIAN_WARN_PAIRS: usize = 1_000_000;

/// Splits text into significant tokens
#[derive(Debug, Clone)]
pub struct Tokenizer {
    min_token_length: usize,
    stopwords: BTreeSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::from_config(&BlockingConfig::default())
    }
}

impl Tokenizer {
    pub fn new(min_token_length: usize, stopwords: BTreeSet<String>) -> Self {
        Self {
            min_token_length,
            stopwords,
        }
    }

    pub fn from_config(config: &BlockingConfig) -> Self {
        Self::new(config.min_token_length, config.domain_stopwords.clone())
    }

    /// Significant tokens of `text`; empty input yields the empty set.
    ///
    /// ```
    /// use sponsor_match::Tokenizer;
    ///
    /// let tokens = Tokenizer::default().tokenize("Pfizer Inc.");
    /// assert!(tokens.contains("pfizer"));
    /// assert!(!tokens.contains("inc"));
    /// ```
    pub fn tokenize(&self, text: &str) -> BTreeSet<String> {
        let folded: String = text.nfkc().collect();
        folded
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| self.is_significant(t))
            .map(str::to_string)
            .collect()
    }

    /// Tokens of an optional value (null attributes tokenize to nothing)
    pub fn tokenize_opt(&self, text: Option<&str>) -> BTreeSet<String> {
        text.map(|t| self.tokenize(t)).unwrap_or_default()
    }

    fn is_significant(&self, token: &str) -> bool {
        token.chars().count() >= self.min_token_length && !self.stopwords.contains(token)
    }
}

/// Which entity field feeds the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TextField {
    /// The entity's primary text (name)
    #[default]
    Text,
    /// A named attribute; null or missing values contribute no tokens
    Attribute(String),
}

impl TextField {
    fn value<'a>(&self, entity: &'a Entity) -> Option<&'a str> {
        match self {
            TextField::Text => Some(entity.text.as_str()),
            TextField::Attribute(name) => entity.attribute(name),
        }
    }
}

/// Inverted index: token → ids of right entities containing it
#[derive(Debug, Clone, Default)]
pub struct TokenIndex {
    buckets: BTreeMap<String, BTreeSet<EntityId>>,
}

impl TokenIndex {
    /// Entity ids whose indexed text contains `token`
    pub fn lookup(&self, token: &str) -> Option<&BTreeSet<EntityId>> {
        self.buckets.get(token)
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }
}

/// Build the inverted index over `entities` in a single pass
#[instrument(skip_all, fields(entities = entities.len()))]
pub fn build_token_index(
    entities: &[Entity],
    text_field: &TextField,
    tokenizer: &Tokenizer,
) -> TokenIndex {
    let mut buckets: BTreeMap<String, BTreeSet<EntityId>> = BTreeMap::new();

    for entity in entities {
        for token in tokenizer.tokenize_opt(text_field.value(entity)) {
            buckets.entry(token).or_default().insert(entity.id.clone());
        }
    }

    debug!(tokens = buckets.len(), "Built token index");
    TokenIndex { buckets }
}

/// Candidate right ids per left id
///
/// Left entities without candidates have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    by_left: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

impl CandidateSet {
    pub fn get(&self, left_id: &str) -> Option<&BTreeSet<EntityId>> {
        self.by_left.get(left_id)
    }

    /// Left ids that received at least one candidate
    pub fn left_ids(&self) -> impl Iterator<Item = &str> {
        self.by_left.keys().map(String::as_str)
    }

    /// Every (left, right) combination in id order
    pub fn pairs(&self) -> impl Iterator<Item = CandidatePair> + '_ {
        self.by_left.iter().flat_map(|(left, rights)| {
            rights
                .iter()
                .map(move |right| CandidatePair::new(left.clone(), right.clone()))
        })
    }

    pub fn pair_count(&self) -> usize {
        self.by_left.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_left.is_empty()
    }

    pub fn contains(&self, left_id: &str, right_id: &str) -> bool {
        self.by_left
            .get(left_id)
            .is_some_and(|rights| rights.contains(right_id))
    }
}

impl FromIterator<CandidatePair> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = CandidatePair>>(iter: I) -> Self {
        let mut by_left: BTreeMap<EntityId, BTreeSet<EntityId>> = BTreeMap::new();
        for pair in iter {
            by_left.entry(pair.left_id).or_default().insert(pair.right_id);
        }
        Self { by_left }
    }
}

/// How much blocking reduced the comparison space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockingStats {
    pub left_count: usize,
    pub right_count: usize,
    pub lefts_with_candidates: usize,
    pub candidate_pairs: usize,
    pub naive_pairs: usize,
    /// Percentage of the cartesian product never scored
    pub reduction_pct: f64,
}

impl BlockingStats {
    pub fn new(left_count: usize, right_count: usize, candidates: &CandidateSet) -> Self {
        let candidate_pairs = candidates.pair_count();
        let naive_pairs = left_count * right_count;
        let reduction_pct = if naive_pairs > 0 {
            (1.0 - candidate_pairs as f64 / naive_pairs as f64) * 100.0
        } else {
            0.0
        };
        Self {
            left_count,
            right_count,
            lefts_with_candidates: candidates.by_left.len(),
            candidate_pairs,
            naive_pairs,
            reduction_pct,
        }
    }
}

/// Union of index buckets for every token of each left entity
#[instrument(skip_all, fields(left = left_entities.len(), index_tokens = right_index.len()))]
pub fn generate_candidates(
    left_entities: &[Entity],
    right_index: &TokenIndex,
    tokenizer: &Tokenizer,
) -> CandidateSet {
    let mut by_left: BTreeMap<EntityId, BTreeSet<EntityId>> = BTreeMap::new();

    for entity in left_entities {
        let mut candidates = BTreeSet::new();
        for token in tokenizer.tokenize(&entity.text) {
            if let Some(ids) = right_index.lookup(&token) {
                candidates.extend(ids.iter().cloned());
            }
        }
        // No shared token is the expected outcome for unmatched sponsors
        if !candidates.is_empty() {
            by_left
                .entry(entity.id.clone())
                .or_default()
                .extend(candidates);
        }
    }

    let candidates = CandidateSet { by_left };
    if candidates.is_empty() {
        warn!("No candidate pairs generated");
    }
    candidates
}

/// Every left entity paired with every right entity (no blocking)
///
/// O(N·M); intended for completeness checks on small development datasets.
#[instrument(skip_all, fields(left = left_entities.len(), right = right_entities.len()))]
pub fn all_pairs(left_entities: &[Entity], right_entities: &[Entity]) -> CandidateSet {
    let naive = left_entities.len() * right_entities.len();
    if naive > CARTESIAN_WARN_PAIRS {
        warn!(
            pairs = naive,
            "Blocking disabled on a large dataset, every pair will be scored"
        );
    }

    let rights: BTreeSet<EntityId> = right_entities.iter().map(|e| e.id.clone()).collect();
    let by_left = if rights.is_empty() {
        BTreeMap::new()
    } else {
        left_entities
            .iter()
            .map(|e| (e.id.clone(), rights.clone()))
            .collect()
    };
    CandidateSet { by_left }
}

/// Run the configured blocking mode and report its statistics
pub fn block(
    left_entities: &[Entity],
    right_entities: &[Entity],
    config: &BlockingConfig,
) -> Result<(CandidateSet, BlockingStats), BlockingError> {
    ensure_unique_ids("left", left_entities)?;
    ensure_unique_ids("right", right_entities)?;

    let candidates = if config.skip_blocking {
        all_pairs(left_entities, right_entities)
    } else {
        let tokenizer = Tokenizer::from_config(config);
        let index = build_token_index(right_entities, &TextField::Text, &tokenizer);
        generate_candidates(left_entities, &index, &tokenizer)
    };

    let stats = BlockingStats::new(left_entities.len(), right_entities.len(), &candidates);
    info!(
        blocking = !config.skip_blocking,
        lefts_with_candidates = stats.lefts_with_candidates,
        left_count = stats.left_count,
        candidate_pairs = stats.candidate_pairs,
        naive_pairs = stats.naive_pairs,
        reduction_pct = %format_args!("{:.1}", stats.reduction_pct),
        "Candidate generation complete"
    );
    Ok((candidates, stats))
}

fn ensure_unique_ids(side: &'static str, entities: &[Entity]) -> Result<(), BlockingError> {
    let mut seen = BTreeSet::new();
    for entity in entities {
        if !seen.insert(entity.id.as_str()) {
            return Err(BlockingError::DuplicateEntityId {
                side,
                id: entity.id.clone(),
            });
        }
    }
    Ok(())
}
