//! Similarity scoring of candidate pairs
//!
//! Every distinct text is embedded exactly once through an injected
//! [`EmbeddingProvider`]; each candidate pair is then scored by the dot
//! product of two unit vectors (their cosine similarity), rounded to four
//! decimals and classified against the configured thresholds.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::blocking::CandidateSet;
use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::types::{by_confidence_desc, Entity, MatchStatus, ScoredPair};

/// Allowed deviation of an embedding norm from 1.0
const UNIT_NORM_TOLERANCE: f64 = 1e-3;

/// Dimension of [`HashedTrigramEmbedder::default`]
pub const DEFAULT_HASHED_DIM: usize = 384;

/// Text → vector capability
///
/// Implementations must return one vector per input text, all of the same
/// dimension, unit-normalized, and deterministic for identical input.
pub trait EmbeddingProvider {
    /// Identifier recorded with every run
    fn model_name(&self) -> &str;

    /// Embed a batch of texts
    fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for &P {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

/// Status thresholds; `reject_below < approve_at_or_above` is checked by
/// config validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub reject_below: f64,
    pub approve_at_or_above: f64,
}

impl Thresholds {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            reject_below: config.reject_below,
            approve_at_or_above: config.approve_at_or_above,
        }
    }

    pub fn classify(&self, confidence: f64) -> MatchStatus {
        if confidence >= self.approve_at_or_above {
            MatchStatus::Approved
        } else if confidence < self.reject_below {
            MatchStatus::Rejected
        } else {
            MatchStatus::Pending
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

/// Score every candidate pair
///
/// Returns pairs ordered by confidence descending (ties by ids). An empty
/// candidate set returns an empty list without calling the provider.
#[instrument(skip_all, fields(model = provider.model_name(), candidates = candidates.pair_count()))]
pub fn score_pairs<P: EmbeddingProvider + ?Sized>(
    left_entities: &[Entity],
    right_entities: &[Entity],
    candidates: &CandidateSet,
    provider: &P,
    config: &ScoringConfig,
) -> Result<Vec<ScoredPair>, ScoringError> {
    if candidates.is_empty() {
        debug!("No candidates to score");
        return Ok(Vec::new());
    }

    let lefts: BTreeMap<&str, &Entity> =
        left_entities.iter().map(|e| (e.id.as_str(), e)).collect();
    let rights: BTreeMap<&str, &Entity> =
        right_entities.iter().map(|e| (e.id.as_str(), e)).collect();

    // Resolve every pair to its two texts before touching the provider
    let mut texts = TextTable::default();
    let mut resolved = Vec::with_capacity(candidates.pair_count());
    for pair in candidates.pairs() {
        let left = lefts
            .get(pair.left_id.as_str())
            .ok_or_else(|| ScoringError::UnknownEntity {
                side: "left",
                id: pair.left_id.clone(),
            })?;
        let right = rights
            .get(pair.right_id.as_str())
            .ok_or_else(|| ScoringError::UnknownEntity {
                side: "right",
                id: pair.right_id.clone(),
            })?;
        let l = texts.intern(left.text.clone());
        let r = texts.intern(right_text(right, &config.context_attributes));
        resolved.push((pair, l, r));
    }

    let batch: Vec<&str> = texts.texts.iter().map(String::as_str).collect();
    let vectors = provider
        .embed(&batch)
        .map_err(|e| ScoringError::Embedding(e.to_string()))?;
    validate_vectors(&vectors, batch.len())?;
    debug!(texts = batch.len(), "Embedded distinct texts");

    let thresholds = Thresholds::from_config(config);
    let mut scored: Vec<ScoredPair> = resolved
        .into_iter()
        .map(|(pair, l, r)| {
            let similarity = dot(&vectors[l], &vectors[r]);
            let confidence = round4(similarity).clamp(0.0, 1.0);
            ScoredPair {
                left_id: pair.left_id,
                right_id: pair.right_id,
                confidence,
                status: thresholds.classify(confidence),
                reason: format!("embedding_similarity={similarity:.4}"),
            }
        })
        .collect();
    scored.sort_by(by_confidence_desc);

    let count = |status: MatchStatus| scored.iter().filter(|p| p.status == status).count();
    info!(
        pairs = scored.len(),
        texts_embedded = batch.len(),
        approved = count(MatchStatus::Approved),
        pending = count(MatchStatus::Pending),
        rejected = count(MatchStatus::Rejected),
        "Scoring complete"
    );
    Ok(scored)
}

/// Distinct texts in first-seen order
#[derive(Default)]
struct TextTable {
    texts: Vec<String>,
    positions: BTreeMap<String, usize>,
}

impl TextTable {
    fn intern(&mut self, text: String) -> usize {
        if let Some(&idx) = self.positions.get(&text) {
            return idx;
        }
        let idx = self.texts.len();
        self.positions.insert(text.clone(), idx);
        self.texts.push(text);
        idx
    }
}

/// Right entity text, optionally enriched with descriptive attributes
fn right_text(entity: &Entity, context_attributes: &[String]) -> String {
    let mut text = entity.text.clone();
    for value in context_attributes
        .iter()
        .filter_map(|name| entity.attribute(name))
        .filter(|v| !v.trim().is_empty())
    {
        text.push_str(". ");
        text.push_str(value.trim());
    }
    text
}

fn validate_vectors(vectors: &[Vec<f32>], expected: usize) -> Result<(), ScoringError> {
    if vectors.len() != expected {
        return Err(ScoringError::LengthMismatch {
            expected,
            got: vectors.len(),
        });
    }
    let Some(dim) = vectors.first().map(Vec::len) else {
        return Ok(());
    };
    if dim == 0 {
        return Err(ScoringError::EmptyVector);
    }

    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dim {
            return Err(ScoringError::DimensionMismatch {
                index,
                expected: dim,
                got: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(ScoringError::NonFinite { index });
        }
        let norm = vector
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt();
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(ScoringError::NotNormalized { index, norm });
        }
    }
    Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Deterministic embedder built from hashed character trigrams
///
/// Each word is padded with spaces (` pfizer `) and its trigrams are hashed
/// with blake3 into a fixed number of buckets; the bucket counts are then
/// L2-normalized. No model download, so it serves development runs and
/// tests. Names sharing words score high; "Pfizer" vs "Pfizer Inc." is
/// about 0.82.
#[derive(Debug, Clone)]
pub struct HashedTrigramEmbedder {
    dim: usize,
    name: String,
}

impl Default for HashedTrigramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHED_DIM)
    }
}

impl HashedTrigramEmbedder {
    /// `dim` is raised to 1 if zero
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self {
            dim,
            name: format!("hashed-trigram-{dim}"),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        let mut any = false;

        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                counts[self.bucket(&trigram)] += 1.0;
                any = true;
            }
        }
        // Text without any word still needs a unit vector
        if !any {
            counts[self.bucket("\u{0}empty")] = 1.0;
        }

        let norm = counts.iter().map(|x| x * x).sum::<f32>().sqrt();
        counts.iter_mut().for_each(|x| *x /= norm);
        counts
    }

    fn bucket(&self, feature: &str) -> usize {
        let hash = blake3::hash(feature.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % self.dim as u64) as usize
    }
}

impl EmbeddingProvider for HashedTrigramEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }
}
