//! One-to-one assignment of scored pairs
//!
//! Two strategies share the [`Matcher`] contract: drop pairs below
//! `min_confidence`, then choose a subset in which no left and no right
//! entity repeats.
//!
//! - [`GreedyMatcher`]: highest confidence first, claim both endpoints.
//!   O(E log E). Fast, but an early claim can block a better global total.
//! - [`OptimalMatcher`]: maximum-total-confidence assignment via
//!   Kuhn-Munkres on each connected component of the candidate graph.
//!
//! ```text
//! A–X 0.90  A–Y 0.85  B–X 0.88  B–Y 0.70
//! greedy:  A→X, B→Y  = 1.60
//! optimal: A→Y, B→X  = 1.73
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use pathfinding::kuhn_munkres::{kuhn_munkres_min, Weights};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::ConfigError;
use crate::types::{by_confidence_desc, Matching, ScoredPair};

/// Integer resolution of confidences inside the cost matrix
const COST_SCALE: f64 = 1_000_000.0;

/// Cost of a combination that is not a candidate edge.
///
/// Exceeds the largest achievable total gain of any component that fits in
/// memory, so the solver always prefers leaving an entity unmatched.
const FORBIDDEN_COST: i64 = 1_000_000_000_000;

/// Selects a one-to-one subset of scored pairs
pub trait Matcher {
    fn name(&self) -> &'static str;

    /// Pairs with confidence below `min_confidence` never enter the result
    fn match_pairs(&self, scored: &[ScoredPair], min_confidence: f64) -> Matching;
}

/// Configured matching strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingAlgorithm {
    Greedy,
    /// Also accepted as `hungarian`
    #[default]
    #[serde(alias = "hungarian")]
    Optimal,
}

impl FromStr for MatchingAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" => Ok(MatchingAlgorithm::Greedy),
            "optimal" | "hungarian" => Ok(MatchingAlgorithm::Optimal),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for MatchingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Matcher for MatchingAlgorithm {
    fn name(&self) -> &'static str {
        match self {
            MatchingAlgorithm::Greedy => GreedyMatcher.name(),
            MatchingAlgorithm::Optimal => OptimalMatcher.name(),
        }
    }

    fn match_pairs(&self, scored: &[ScoredPair], min_confidence: f64) -> Matching {
        match self {
            MatchingAlgorithm::Greedy => GreedyMatcher.match_pairs(scored, min_confidence),
            MatchingAlgorithm::Optimal => OptimalMatcher.match_pairs(scored, min_confidence),
        }
    }
}

/// Pairs at or above the threshold, highest confidence first
fn eligible(scored: &[ScoredPair], min_confidence: f64) -> Vec<&ScoredPair> {
    let mut pairs: Vec<&ScoredPair> = scored
        .iter()
        .filter(|p| p.confidence >= min_confidence)
        .collect();
    pairs.sort_by(|a, b| by_confidence_desc(a, b));
    pairs
}

/// Highest-confidence-first assignment
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyMatcher;

impl Matcher for GreedyMatcher {
    fn name(&self) -> &'static str {
        "greedy"
    }

    #[instrument(name = "greedy_match", skip_all, fields(pairs = scored.len()))]
    fn match_pairs(&self, scored: &[ScoredPair], min_confidence: f64) -> Matching {
        let mut used_left: HashSet<&str> = HashSet::new();
        let mut used_right: HashSet<&str> = HashSet::new();
        let mut selected = Vec::new();

        for pair in eligible(scored, min_confidence) {
            if used_left.contains(pair.left_id.as_str())
                || used_right.contains(pair.right_id.as_str())
            {
                continue;
            }
            used_left.insert(&pair.left_id);
            used_right.insert(&pair.right_id);
            selected.push(pair.clone());
        }

        let matching = Matching::from_injective(selected);
        info!(
            matches = matching.len(),
            total = matching.total_confidence(),
            "Greedy matching complete"
        );
        matching
    }
}

/// Maximum-total-confidence assignment
///
/// Each connected component of the candidate graph is solved independently
/// with Kuhn-Munkres, so the cubic cost applies per component rather than to
/// the whole table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimalMatcher;

impl Matcher for OptimalMatcher {
    fn name(&self) -> &'static str {
        "optimal"
    }

    #[instrument(name = "optimal_match", skip_all, fields(pairs = scored.len()))]
    fn match_pairs(&self, scored: &[ScoredPair], min_confidence: f64) -> Matching {
        let pairs = eligible(scored, min_confidence);
        let components = connected_components(&pairs);
        debug!(components = components.len(), "Split candidate graph");

        let mut selected = Vec::new();
        for component in &components {
            selected.extend(solve_component(component).into_iter().cloned());
        }
        // Only eligible candidate edges can come back from the solver
        selected.retain(|p| p.confidence >= min_confidence);

        let matching = Matching::from_injective(selected);
        info!(
            matches = matching.len(),
            total = matching.total_confidence(),
            "Optimal matching complete"
        );
        matching
    }
}

/// Group pairs that share an endpoint, transitively
fn connected_components<'a>(pairs: &[&'a ScoredPair]) -> Vec<Vec<&'a ScoredPair>> {
    let lefts: BTreeMap<&str, usize> = index_of(pairs.iter().map(|p| p.left_id.as_str()));
    let rights: BTreeMap<&str, usize> = index_of(pairs.iter().map(|p| p.right_id.as_str()));
    let offset = lefts.len();

    let mut sets = DisjointSet::new(lefts.len() + rights.len());
    for pair in pairs {
        sets.union(
            lefts[pair.left_id.as_str()],
            offset + rights[pair.right_id.as_str()],
        );
    }

    let mut groups: BTreeMap<usize, Vec<&'a ScoredPair>> = BTreeMap::new();
    for &pair in pairs {
        let root = sets.find(lefts[pair.left_id.as_str()]);
        groups.entry(root).or_default().push(pair);
    }
    groups.into_values().collect()
}

/// Sorted distinct ids mapped to their position
fn index_of<'a>(ids: impl Iterator<Item = &'a str>) -> BTreeMap<&'a str, usize> {
    let distinct: BTreeSet<&str> = ids.collect();
    distinct.into_iter().enumerate().map(|(i, id)| (id, i)).collect()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = ra.min(rb);
        }
    }
}

/// Solve one component; `pairs` are ordered by confidence descending
fn solve_component<'a>(pairs: &[&'a ScoredPair]) -> Vec<&'a ScoredPair> {
    match pairs {
        [] => return Vec::new(),
        [only] => return vec![*only],
        _ => {}
    }

    let lefts = index_of(pairs.iter().map(|p| p.left_id.as_str()));
    let rights = index_of(pairs.iter().map(|p| p.right_id.as_str()));
    let costs = PaddedCosts::new(lefts.len(), rights.len(), pairs, &lefts, &rights);
    let (_, assignment) = kuhn_munkres_min(&costs);

    assignment
        .iter()
        .take(lefts.len())
        .enumerate()
        .filter_map(|(row, &col)| costs.edge(row, col).map(|idx| pairs[idx]))
        .collect()
}

/// Square cost matrix of size `lefts + rights`
///
/// ```text
///             rights              left slack
/// lefts     [ -conf or FORBIDDEN | 0 on diagonal, else FORBIDDEN ]
/// right     [ 0 on diagonal,     | 0                             ]
/// slack       else FORBIDDEN
/// ```
///
/// Minimizing this is maximum-weight bipartite matching: every entity may
/// stay unmatched through its slack column or row at zero cost.
struct PaddedCosts {
    lefts: usize,
    rights: usize,
    /// Row-major `lefts × rights`, index into the component's pairs
    edges: Vec<Option<usize>>,
    costs: Vec<i64>,
    negated: bool,
}

impl PaddedCosts {
    fn new(
        lefts: usize,
        rights: usize,
        pairs: &[&ScoredPair],
        left_index: &BTreeMap<&str, usize>,
        right_index: &BTreeMap<&str, usize>,
    ) -> Self {
        let mut edges = vec![None; lefts * rights];
        let mut costs = vec![FORBIDDEN_COST; lefts * rights];
        for (idx, pair) in pairs.iter().enumerate() {
            let cell =
                left_index[pair.left_id.as_str()] * rights + right_index[pair.right_id.as_str()];
            // Duplicate keys keep the first, i.e. highest, confidence
            if edges[cell].is_none() {
                edges[cell] = Some(idx);
                costs[cell] = -((pair.confidence * COST_SCALE).round() as i64);
            }
        }
        Self {
            lefts,
            rights,
            edges,
            costs,
            negated: false,
        }
    }

    /// Candidate edge behind an assignment, if the cell is a real one
    fn edge(&self, row: usize, col: usize) -> Option<usize> {
        if row < self.lefts && col < self.rights {
            self.edges[row * self.rights + col]
        } else {
            None
        }
    }

    fn raw(&self, row: usize, col: usize) -> i64 {
        match (row < self.lefts, col < self.rights) {
            (true, true) => self.costs[row * self.rights + col],
            (true, false) if col - self.rights == row => 0,
            (false, true) if row - self.lefts == col => 0,
            (false, false) => 0,
            _ => FORBIDDEN_COST,
        }
    }
}

impl Weights<i64> for PaddedCosts {
    fn rows(&self) -> usize {
        self.lefts + self.rights
    }

    fn columns(&self) -> usize {
        self.lefts + self.rights
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        let cost = self.raw(row, col);
        if self.negated {
            -cost
        } else {
            cost
        }
    }

    fn neg(&self) -> Self {
        Self {
            lefts: self.lefts,
            rights: self.rights,
            edges: self.edges.clone(),
            costs: self.costs.clone(),
            negated: !self.negated,
        }
    }
}

/// Side-by-side outcome of both strategies on the same scored pairs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatcherComparison {
    pub greedy: Matching,
    pub optimal: Matching,
    pub greedy_matches: usize,
    pub greedy_total_score: f64,
    pub greedy_avg_score: f64,
    pub optimal_matches: usize,
    pub optimal_total_score: f64,
    pub optimal_avg_score: f64,
    /// Optimal total minus greedy total, never negative
    pub improvement: f64,
    /// `improvement` relative to the greedy total, 0 when that total is 0
    pub improvement_pct: f64,
    /// Size of the symmetric difference between the chosen pair sets
    pub different_pairs: usize,
}

/// Run both matchers and summarize how they differ
#[instrument(skip_all, fields(pairs = scored.len(), min_confidence = min_confidence))]
pub fn compare_matchers(scored: &[ScoredPair], min_confidence: f64) -> MatcherComparison {
    let greedy = GreedyMatcher.match_pairs(scored, min_confidence);
    let optimal = OptimalMatcher.match_pairs(scored, min_confidence);

    let greedy_total = greedy.total_confidence();
    let optimal_total = optimal.total_confidence();
    // Sub-resolution float noise must not read as a regression
    let improvement = (optimal_total - greedy_total).max(0.0);
    let improvement_pct = if greedy_total > 0.0 {
        improvement / greedy_total * 100.0
    } else {
        0.0
    };
    let different_pairs = greedy
        .pair_keys()
        .symmetric_difference(&optimal.pair_keys())
        .count();

    info!(
        greedy_total,
        optimal_total,
        improvement_pct = %format_args!("{improvement_pct:.2}"),
        different_pairs,
        "Compared matchers"
    );

    MatcherComparison {
        greedy_matches: greedy.len(),
        greedy_total_score: greedy_total,
        greedy_avg_score: greedy.average_confidence(),
        optimal_matches: optimal.len(),
        optimal_total_score: optimal_total,
        optimal_avg_score: optimal.average_confidence(),
        improvement,
        improvement_pct,
        different_pairs,
        greedy,
        optimal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchStatus;

    fn pair(left: &str, right: &str, confidence: f64) -> ScoredPair {
        ScoredPair {
            left_id: left.to_string(),
            right_id: right.to_string(),
            confidence,
            status: MatchStatus::Pending,
            reason: format!("embedding_similarity={confidence:.4}"),
        }
    }

    fn conflict_example() -> Vec<ScoredPair> {
        vec![
            pair("A", "X", 0.90),
            pair("A", "Y", 0.85),
            pair("B", "X", 0.88),
            pair("B", "Y", 0.70),
        ]
    }

    #[test]
    fn test_greedy_takes_highest_first() {
        let matching = GreedyMatcher.match_pairs(&conflict_example(), 0.65);
        assert_eq!(matching.len(), 2);
        assert_eq!(matching.right_for("A"), Some("X"));
        assert_eq!(matching.right_for("B"), Some("Y"));
        assert!((matching.total_confidence() - 1.60).abs() < 1e-9);
    }

    #[test]
    fn test_optimal_beats_greedy_on_conflict() {
        let matching = OptimalMatcher.match_pairs(&conflict_example(), 0.65);
        assert_eq!(matching.len(), 2);
        assert_eq!(matching.right_for("A"), Some("Y"));
        assert_eq!(matching.right_for("B"), Some("X"));
        assert!((matching.total_confidence() - 1.73).abs() < 1e-9);
    }

    #[test]
    fn test_compare_matchers() {
        let comparison = compare_matchers(&conflict_example(), 0.65);
        assert_eq!(comparison.greedy_matches, 2);
        assert_eq!(comparison.optimal_matches, 2);
        assert!((comparison.greedy_avg_score - 0.80).abs() < 1e-9);
        assert!((comparison.optimal_avg_score - 0.865).abs() < 1e-9);
        assert!((comparison.improvement - 0.13).abs() < 1e-9);
        assert!((comparison.improvement_pct - 8.125).abs() < 1e-6);
        assert_eq!(comparison.different_pairs, 4);
    }

    #[test]
    fn test_threshold_filters_before_matching() {
        // With B–Y filtered out the greedy pick is still A→X, B unmatched
        let greedy = GreedyMatcher.match_pairs(&conflict_example(), 0.80);
        assert_eq!(greedy.len(), 1);
        assert_eq!(greedy.right_for("A"), Some("X"));

        let optimal = OptimalMatcher.match_pairs(&conflict_example(), 0.80);
        assert!((optimal.total_confidence() - 1.73).abs() < 1e-9);

        let none = OptimalMatcher.match_pairs(&conflict_example(), 0.95);
        assert!(none.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(GreedyMatcher.match_pairs(&[], 0.0).is_empty());
        assert!(OptimalMatcher.match_pairs(&[], 0.0).is_empty());

        let comparison = compare_matchers(&[], 0.0);
        assert_eq!(comparison.improvement_pct, 0.0);
        assert_eq!(comparison.different_pairs, 0);
    }

    #[test]
    fn test_optimal_prefers_single_strong_edge() {
        // Two weak edges must not displace one strong edge
        let scored = vec![pair("A", "X", 0.9), pair("A", "Y", 0.01), pair("B", "X", 0.01)];
        let optimal = OptimalMatcher.match_pairs(&scored, 0.0);
        assert_eq!(optimal.len(), 1);
        assert!(optimal.contains("A", "X"));
    }

    #[test]
    fn test_optimal_unbalanced_sides() {
        let scored = vec![
            pair("A", "X", 0.9),
            pair("B", "X", 0.8),
            pair("C", "X", 0.7),
            pair("C", "Z", 0.75),
            pair("D", "W", 0.66),
        ];
        let optimal = OptimalMatcher.match_pairs(&scored, 0.65);
        assert_eq!(optimal.len(), 3);
        assert!(optimal.contains("A", "X"));
        assert!(optimal.contains("C", "Z"));
        assert!(optimal.contains("D", "W"));
        assert_eq!(optimal.right_for("B"), None);
    }

    #[test]
    fn test_optimal_keeps_best_duplicate() {
        let scored = vec![pair("A", "X", 0.7), pair("A", "X", 0.9), pair("B", "X", 0.8)];
        let optimal = OptimalMatcher.match_pairs(&scored, 0.0);
        assert_eq!(optimal.len(), 1);
        assert_eq!(optimal.pairs()[0].confidence, 0.9);
    }

    #[test]
    fn test_output_sorted_by_confidence() {
        let matching = OptimalMatcher.match_pairs(&conflict_example(), 0.0);
        let confidences: Vec<f64> = matching.pairs().iter().map(|p| p.confidence).collect();
        assert_eq!(confidences, vec![0.88, 0.85]);
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("greedy".parse::<MatchingAlgorithm>(), Ok(MatchingAlgorithm::Greedy));
        assert_eq!("Optimal".parse::<MatchingAlgorithm>(), Ok(MatchingAlgorithm::Optimal));
        assert_eq!("hungarian".parse::<MatchingAlgorithm>(), Ok(MatchingAlgorithm::Optimal));
        assert_eq!(
            "random".parse::<MatchingAlgorithm>(),
            Err(ConfigError::UnknownAlgorithm("random".to_string()))
        );
        assert_eq!(MatchingAlgorithm::Optimal.to_string(), "optimal");
    }

    #[test]
    fn test_algorithm_dispatch() {
        let greedy = MatchingAlgorithm::Greedy.match_pairs(&conflict_example(), 0.65);
        let optimal = MatchingAlgorithm::Optimal.match_pairs(&conflict_example(), 0.65);
        assert!(greedy.contains("A", "X"));
        assert!(optimal.contains("A", "Y"));
    }
}
