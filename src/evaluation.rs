//! Evaluation of scored pairs against curated ground truth
//!
//! - **Precision**: of the pairs we predicted, how many were correct
//! - **Recall**: of the correct pairs that exist, how many we found
//! - **F1**: harmonic mean of the two
//! - **Coverage**: share of ground-truth left entities with any prediction
//!
//! Predictions without a ground-truth label count as false positives. This
//! is pessimistic: with partial labeling it understates precision.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::{EvaluationConfig, GroundTruthColumns};
use crate::error::{EvaluationError, GroundTruthError};
use crate::types::{by_confidence_desc, CandidatePair, GroundTruthLabel, Label, ScoredPair};

/// Validated ground-truth table keyed by (left, right)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruth {
    labels: BTreeMap<CandidatePair, Label>,
}

impl GroundTruth {
    /// Collect typed labels
    ///
    /// Repeated identical rows collapse; the same pair with two different
    /// labels is rejected.
    pub fn from_labels(
        labels: impl IntoIterator<Item = GroundTruthLabel>,
    ) -> Result<Self, GroundTruthError> {
        let mut table = BTreeMap::new();
        for row in labels {
            let key = CandidatePair::new(row.left_id, row.right_id);
            match table.get(&key) {
                Some(existing) if *existing != row.label => {
                    return Err(GroundTruthError::ConflictingLabels {
                        left_id: key.left_id,
                        right_id: key.right_id,
                    });
                }
                Some(_) => {}
                None => {
                    table.insert(key, row.label);
                }
            }
        }
        Ok(Self { labels: table })
    }

    /// Validate loosely-typed rows (e.g. parsed CSV or JSON objects)
    ///
    /// Every row must carry the three configured columns and a label of
    /// `correct`, `incorrect` or `unknown`. Extra columns are ignored.
    pub fn from_rows(
        rows: &[BTreeMap<String, String>],
        columns: &GroundTruthColumns,
    ) -> Result<Self, GroundTruthError> {
        let mut labels = Vec::with_capacity(rows.len());
        for (row, fields) in rows.iter().enumerate() {
            let column = |name: &String| {
                fields
                    .get(name)
                    .ok_or_else(|| GroundTruthError::MissingColumn {
                        row,
                        column: name.clone(),
                    })
            };
            let left = column(&columns.left)?;
            let right = column(&columns.right)?;
            let label = column(&columns.label)?;
            labels.push(GroundTruthLabel::parse(row, left, right, label)?);
        }
        Self::from_labels(labels)
    }

    pub fn label(&self, left_id: &str, right_id: &str) -> Option<Label> {
        self.labels
            .get(&CandidatePair::new(left_id, right_id))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CandidatePair, Label)> {
        self.labels.iter().map(|(k, v)| (k, *v))
    }

    /// Distinct left ids referenced by any label
    pub fn left_ids(&self) -> BTreeSet<&str> {
        self.labels.keys().map(|k| k.left_id.as_str()).collect()
    }

    /// Pairs labeled `correct`
    pub fn correct_pairs(&self) -> impl Iterator<Item = &CandidatePair> {
        self.labels
            .iter()
            .filter(|(_, label)| **label == Label::Correct)
            .map(|(pair, _)| pair)
    }
}

/// Aggregate quality metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Never computed: the universe of non-matching pairs is not enumerated
    pub true_negatives: usize,
    pub coverage: f64,
    pub total_predictions: usize,
    pub total_ground_truth: usize,
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let predicted = self.true_positives + self.false_positives;
        let relevant = self.true_positives + self.false_negatives;
        writeln!(f, "Evaluation Metrics:")?;
        writeln!(
            f,
            "  Precision: {:.3} ({}/{} predictions correct)",
            self.precision, self.true_positives, predicted
        )?;
        writeln!(
            f,
            "  Recall:    {:.3} ({}/{} correct matches found)",
            self.recall, self.true_positives, relevant
        )?;
        writeln!(f, "  F1 Score:  {:.3}", self.f1)?;
        writeln!(
            f,
            "  Coverage:  {:.1}% (entities with predictions)",
            self.coverage * 100.0
        )?;
        writeln!(f)?;
        writeln!(f, "Confusion Matrix:")?;
        writeln!(f, "  True Positives:  {}", self.true_positives)?;
        writeln!(f, "  False Positives: {}", self.false_positives)?;
        writeln!(f, "  False Negatives: {}", self.false_negatives)?;
        writeln!(f, "  True Negatives:  not computed")?;
        writeln!(f)?;
        writeln!(f, "Totals:")?;
        writeln!(f, "  Predictions:   {}", self.total_predictions)?;
        write!(f, "  Ground Truth:  {}", self.total_ground_truth)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Compare predictions at or above `min_confidence` with the ground truth
pub fn compute_metrics(
    predictions: &[ScoredPair],
    ground_truth: &GroundTruth,
    min_confidence: f64,
) -> EvaluationMetrics {
    let kept: Vec<&ScoredPair> = predictions
        .iter()
        .filter(|p| p.confidence >= min_confidence)
        .collect();
    metrics_for(&kept, ground_truth)
}

fn metrics_for(kept: &[&ScoredPair], ground_truth: &GroundTruth) -> EvaluationMetrics {
    let mut true_positives = 0;
    let mut false_positives = 0;
    for pair in kept {
        match ground_truth.label(&pair.left_id, &pair.right_id) {
            Some(Label::Correct) => true_positives += 1,
            Some(Label::Incorrect) | None => false_positives += 1,
            Some(Label::Unknown) => {}
        }
    }

    let predicted: BTreeSet<(&str, &str)> = kept.iter().map(|p| p.key()).collect();
    let false_negatives = ground_truth
        .correct_pairs()
        .filter(|k| !predicted.contains(&(k.left_id.as_str(), k.right_id.as_str())))
        .count();

    let precision = ratio(true_positives, true_positives + false_positives);
    let recall = ratio(true_positives, true_positives + false_negatives);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let gt_lefts = ground_truth.left_ids();
    let predicted_lefts: BTreeSet<&str> = kept.iter().map(|p| p.left_id.as_str()).collect();
    let covered = gt_lefts.intersection(&predicted_lefts).count();

    EvaluationMetrics {
        precision,
        recall,
        f1,
        true_positives,
        false_positives,
        false_negatives,
        true_negatives: 0,
        coverage: ratio(covered, gt_lefts.len()),
        total_predictions: kept.len(),
        total_ground_truth: ground_truth.len(),
    }
}

/// Metrics over the `k` highest-confidence predictions of each left entity
pub fn compute_metrics_at_k(
    predictions: &[ScoredPair],
    ground_truth: &GroundTruth,
    k: usize,
) -> Result<EvaluationMetrics, EvaluationError> {
    if k == 0 {
        return Err(EvaluationError::InvalidK);
    }

    let mut by_left: BTreeMap<&str, Vec<&ScoredPair>> = BTreeMap::new();
    for pair in predictions {
        by_left.entry(pair.left_id.as_str()).or_default().push(pair);
    }
    let top_k: Vec<&ScoredPair> = by_left
        .into_values()
        .flat_map(|mut pairs| {
            pairs.sort_by(|a, b| by_confidence_desc(a, b));
            pairs.truncate(k);
            pairs
        })
        .collect();

    Ok(metrics_for(&top_k, ground_truth))
}

/// One point of a threshold sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub total_predictions: usize,
}

impl ThresholdPoint {
    fn new(threshold: f64, metrics: &EvaluationMetrics) -> Self {
        Self {
            threshold,
            precision: metrics.precision,
            recall: metrics.recall,
            f1: metrics.f1,
            true_positives: metrics.true_positives,
            false_positives: metrics.false_positives,
            false_negatives: metrics.false_negatives,
            total_predictions: metrics.total_predictions,
        }
    }
}

/// Precision/recall curve plus its best-F1 operating point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSweep {
    pub points: Vec<ThresholdPoint>,
    /// Highest F1; ties go to the lowest threshold. `None` for an empty grid.
    pub best: Option<ThresholdPoint>,
}

/// Evenly spaced thresholds from `start` to `stop` inclusive
pub fn threshold_grid(start: f64, stop: f64, step: f64) -> Result<Vec<f64>, EvaluationError> {
    if !(step > 0.0) {
        return Err(EvaluationError::InvalidStep(step));
    }
    for bound in [start, stop] {
        if !(0.0..=1.0).contains(&bound) {
            return Err(EvaluationError::ThresholdOutOfRange(bound));
        }
    }
    let steps = ((stop - start) / step + 1e-9).floor().max(-1.0) as i64;
    Ok((0..=steps)
        .map(|i| ((start + i as f64 * step) * 1e9).round() / 1e9)
        .collect())
}

/// Sweep `min_confidence` over `thresholds`
#[instrument(skip_all, fields(predictions = predictions.len(), thresholds = thresholds.len()))]
pub fn threshold_analysis(
    predictions: &[ScoredPair],
    ground_truth: &GroundTruth,
    thresholds: &[f64],
) -> Result<ThresholdSweep, EvaluationError> {
    if let Some(&bad) = thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
        return Err(EvaluationError::ThresholdOutOfRange(bad));
    }

    let points: Vec<ThresholdPoint> = thresholds
        .iter()
        .map(|&t| ThresholdPoint::new(t, &compute_metrics(predictions, ground_truth, t)))
        .collect();

    let best = points.iter().copied().reduce(|best, point| {
        let better = point.f1 > best.f1 || (point.f1 == best.f1 && point.threshold < best.threshold);
        if better {
            point
        } else {
            best
        }
    });
    if let Some(best) = &best {
        debug!(threshold = best.threshold, f1 = best.f1, "Best threshold");
    }

    Ok(ThresholdSweep { points, best })
}

/// Confusion-matrix cell for error analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfusionCategory {
    #[serde(rename = "tp")]
    TruePositive,
    #[serde(rename = "fp")]
    FalsePositive,
    #[serde(rename = "fn")]
    FalseNegative,
}

impl FromStr for ConfusionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tp" => Ok(ConfusionCategory::TruePositive),
            "fp" => Ok(ConfusionCategory::FalsePositive),
            "fn" => Ok(ConfusionCategory::FalseNegative),
            other => Err(format!(
                "Invalid category '{other}', expected one of: tp, fp, fn"
            )),
        }
    }
}

impl fmt::Display for ConfusionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfusionCategory::TruePositive => "TRUE POSITIVES (correct predictions)",
            ConfusionCategory::FalsePositive => "FALSE POSITIVES (incorrect predictions)",
            ConfusionCategory::FalseNegative => "FALSE NEGATIVES (missed correct matches)",
        };
        f.write_str(s)
    }
}

/// A single example from a confusion-matrix cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionExample {
    pub left_id: String,
    pub right_id: String,
    /// Absent for false negatives
    pub confidence: Option<f64>,
    /// Absent for unlabeled predictions
    pub label: Option<Label>,
}

impl fmt::Display for ConfusionExample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let confidence = self
            .confidence
            .map(|c| format!("{c:.3}"))
            .unwrap_or_else(|| "N/A".to_string());
        let label = self
            .label
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unlabeled".to_string());
        let left: String = self.left_id.chars().take(50).collect();
        write!(
            f,
            "[{confidence}] {left:50} → {:6} ({label})",
            self.right_id
        )
    }
}

/// Up to `limit` examples of one category
///
/// True and false positives come highest confidence first; false negatives
/// in id order.
pub fn confusion_examples(
    predictions: &[ScoredPair],
    ground_truth: &GroundTruth,
    category: ConfusionCategory,
    limit: usize,
) -> Vec<ConfusionExample> {
    let predicted = |pair: &ScoredPair| ConfusionExample {
        left_id: pair.left_id.clone(),
        right_id: pair.right_id.clone(),
        confidence: Some(pair.confidence),
        label: ground_truth.label(&pair.left_id, &pair.right_id),
    };

    match category {
        ConfusionCategory::TruePositive | ConfusionCategory::FalsePositive => {
            let mut sorted: Vec<&ScoredPair> = predictions.iter().collect();
            sorted.sort_by(|a, b| by_confidence_desc(a, b));
            sorted
                .into_iter()
                .map(predicted)
                .filter(|example| match category {
                    ConfusionCategory::TruePositive => example.label == Some(Label::Correct),
                    _ => matches!(example.label, Some(Label::Incorrect) | None),
                })
                .take(limit)
                .collect()
        }
        ConfusionCategory::FalseNegative => {
            let predicted: BTreeSet<(&str, &str)> = predictions.iter().map(|p| p.key()).collect();
            ground_truth
                .correct_pairs()
                .filter(|k| !predicted.contains(&(k.left_id.as_str(), k.right_id.as_str())))
                .take(limit)
                .map(|k| ConfusionExample {
                    left_id: k.left_id.clone(),
                    right_id: k.right_id.clone(),
                    confidence: None,
                    label: Some(Label::Correct),
                })
                .collect()
        }
    }
}

/// Full evaluation: overall, per-K and the threshold sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub overall_metrics: EvaluationMetrics,
    pub metrics_at_k: BTreeMap<usize, EvaluationMetrics>,
    pub best_threshold: Option<ThresholdPoint>,
    pub threshold_analysis: Vec<ThresholdPoint>,
}

/// Build the report described by `config`
#[instrument(skip_all, fields(predictions = predictions.len(), ground_truth = ground_truth.len()))]
pub fn generate_evaluation_report(
    predictions: &[ScoredPair],
    ground_truth: &GroundTruth,
    config: &EvaluationConfig,
) -> Result<EvaluationReport, EvaluationError> {
    let overall_metrics = compute_metrics(predictions, ground_truth, 0.0);

    let mut metrics_at_k = BTreeMap::new();
    for &k in &config.k_values {
        metrics_at_k.insert(k, compute_metrics_at_k(predictions, ground_truth, k)?);
    }

    let sweep = threshold_analysis(predictions, ground_truth, &config.thresholds)?;

    info!(
        precision = overall_metrics.precision,
        recall = overall_metrics.recall,
        f1 = overall_metrics.f1,
        coverage = overall_metrics.coverage,
        best_threshold = sweep.best.map(|b| b.threshold),
        "Evaluation complete"
    );

    Ok(EvaluationReport {
        overall_metrics,
        metrics_at_k,
        best_threshold: sweep.best,
        threshold_analysis: sweep.points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_thresholds;
    use crate::types::MatchStatus;

    fn pred(left: &str, right: &str, confidence: f64) -> ScoredPair {
        ScoredPair {
            left_id: left.to_string(),
            right_id: right.to_string(),
            confidence,
            status: MatchStatus::Pending,
            reason: String::new(),
        }
    }

    fn gt(rows: &[(&str, &str, Label)]) -> GroundTruth {
        GroundTruth::from_labels(
            rows.iter()
                .map(|(l, r, label)| GroundTruthLabel::new(*l, *r, *label)),
        )
        .unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_worked_example() {
        let truth = gt(&[
            ("A", "X", Label::Correct),
            ("B", "Y", Label::Correct),
            ("C", "Z", Label::Incorrect),
        ]);
        let predictions = vec![pred("A", "X", 0.90), pred("B", "Y", 0.80), pred("E", "W", 0.60)];

        let m = compute_metrics(&predictions, &truth, 0.0);
        assert_eq!(m.true_positives, 2);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.false_negatives, 0);
        assert_eq!(m.true_negatives, 0);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.recall, 1.0);
        assert!((m.f1 - 0.8).abs() < 1e-9);
        assert!((m.coverage - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.total_predictions, 3);
        assert_eq!(m.total_ground_truth, 3);
    }

    #[test]
    fn test_perfect_prediction() {
        let truth = gt(&[("A", "T1", Label::Correct), ("B", "T2", Label::Correct)]);
        let predictions = vec![pred("A", "T1", 0.9), pred("B", "T2", 0.8)];

        let m = compute_metrics(&predictions, &truth, 0.0);
        assert_eq!((m.precision, m.recall, m.f1), (1.0, 1.0, 1.0));
        assert_eq!(m.coverage, 1.0);
    }

    #[test]
    fn test_all_incorrect_predictions() {
        let truth = gt(&[("A", "T1", Label::Incorrect), ("B", "T2", Label::Incorrect)]);
        let predictions = vec![pred("A", "T1", 0.9), pred("B", "T2", 0.8)];

        let m = compute_metrics(&predictions, &truth, 0.0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.false_positives, 2);
    }

    #[test]
    fn test_missed_matches() {
        let truth = gt(&[
            ("A", "T1", Label::Correct),
            ("B", "T2", Label::Correct),
            ("C", "T3", Label::Correct),
        ]);
        let predictions = vec![pred("A", "T1", 0.9), pred("B", "T2", 0.8)];

        let m = compute_metrics(&predictions, &truth, 0.0);
        assert_eq!(m.false_negatives, 1);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.precision, 1.0);
    }

    #[test]
    fn test_unknown_label_is_neither_tp_nor_fp() {
        let truth = gt(&[("A", "T1", Label::Unknown)]);
        let m = compute_metrics(&[pred("A", "T1", 0.9)], &truth, 0.0);
        assert_eq!(m.true_positives, 0);
        assert_eq!(m.false_positives, 0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.coverage, 1.0);
    }

    #[test]
    fn test_confidence_threshold() {
        let truth = gt(&[("A", "T1", Label::Correct), ("B", "T2", Label::Correct)]);
        let predictions = vec![pred("A", "T1", 0.9), pred("B", "T2", 0.5)];

        let m = compute_metrics(&predictions, &truth, 0.7);
        assert_eq!(m.true_positives, 1);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.total_predictions, 1);
        assert_eq!(m.coverage, 0.5);
    }

    #[test]
    fn test_empty_inputs() {
        let m = compute_metrics(&[], &GroundTruth::default(), 0.0);
        assert_eq!((m.precision, m.recall, m.f1, m.coverage), (0.0, 0.0, 0.0, 0.0));

        let truth = gt(&[("A", "T1", Label::Correct)]);
        let m = compute_metrics(&[], &truth, 0.0);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.coverage, 0.0);
    }

    #[test]
    fn test_metrics_at_k() {
        let truth = gt(&[("A", "T1", Label::Correct), ("B", "T3", Label::Correct)]);
        let predictions = vec![
            pred("A", "T1", 0.9),
            pred("A", "T2", 0.8),
            pred("B", "T4", 0.7),
            pred("B", "T3", 0.6),
        ];

        let at1 = compute_metrics_at_k(&predictions, &truth, 1).unwrap();
        assert_eq!(at1.true_positives, 1);
        assert_eq!(at1.false_positives, 1);
        assert_eq!(at1.false_negatives, 1);
        assert_eq!(at1.total_predictions, 2);

        let at2 = compute_metrics_at_k(&predictions, &truth, 2).unwrap();
        assert_eq!(at2.true_positives, 2);
        assert_eq!(at2.recall, 1.0);

        assert_eq!(
            compute_metrics_at_k(&predictions, &truth, 0),
            Err(EvaluationError::InvalidK)
        );
    }

    #[test]
    fn test_threshold_analysis() {
        let truth = gt(&[("A", "T1", Label::Correct), ("B", "T2", Label::Correct)]);
        let predictions = vec![
            pred("A", "T1", 0.9),
            pred("B", "T2", 0.7),
            pred("C", "T3", 0.5),
        ];

        let sweep = threshold_analysis(&predictions, &truth, &default_thresholds()).unwrap();
        assert_eq!(sweep.points.len(), 21);
        assert_eq!(sweep.points[0].total_predictions, 3);
        assert_eq!(sweep.points[20].total_predictions, 0);

        let best = sweep.best.unwrap();
        assert_eq!(best.f1, 1.0);
        // 0.55 is the lowest threshold that excludes the unlabeled C–T3
        assert_eq!(best.threshold, 0.55);
    }

    #[test]
    fn test_threshold_analysis_validation() {
        let truth = GroundTruth::default();
        assert_eq!(
            threshold_analysis(&[], &truth, &[0.5, 1.5]),
            Err(EvaluationError::ThresholdOutOfRange(1.5))
        );
        let sweep = threshold_analysis(&[], &truth, &[]).unwrap();
        assert!(sweep.best.is_none());
    }

    #[test]
    fn test_threshold_grid() {
        let grid = threshold_grid(0.0, 1.0, 0.05).unwrap();
        assert_eq!(grid, default_thresholds());

        assert_eq!(threshold_grid(0.5, 0.7, 0.1).unwrap(), vec![0.5, 0.6, 0.7]);
        assert!(threshold_grid(0.7, 0.5, 0.1).unwrap().is_empty());
        assert_eq!(
            threshold_grid(0.0, 1.0, 0.0),
            Err(EvaluationError::InvalidStep(0.0))
        );
        assert_eq!(
            threshold_grid(0.0, 2.0, 0.1),
            Err(EvaluationError::ThresholdOutOfRange(2.0))
        );
    }

    #[test]
    fn test_from_rows() {
        let rows = vec![
            row(&[("left_id", "Pfizer Inc"), ("right_id", "PFE"), ("label", "correct")]),
            row(&[
                ("left_id", "Wrong Match"),
                ("right_id", "MSFT"),
                ("label", "incorrect"),
                ("notes", "extra columns are fine"),
            ]),
        ];
        let truth = GroundTruth::from_rows(&rows, &GroundTruthColumns::default()).unwrap();
        assert_eq!(truth.len(), 2);
        assert_eq!(truth.label("Pfizer Inc", "PFE"), Some(Label::Correct));
        assert_eq!(truth.label("Pfizer Inc", "MSFT"), None);
    }

    #[test]
    fn test_from_rows_missing_column() {
        let rows = vec![row(&[("left_id", "Pfizer Inc"), ("right_id", "PFE")])];
        assert_eq!(
            GroundTruth::from_rows(&rows, &GroundTruthColumns::default()),
            Err(GroundTruthError::MissingColumn {
                row: 0,
                column: "label".to_string()
            })
        );
    }

    #[test]
    fn test_from_rows_invalid_label() {
        let rows = vec![row(&[("left_id", "Pfizer Inc"), ("right_id", "PFE"), ("label", "maybe")])];
        assert_eq!(
            GroundTruth::from_rows(&rows, &GroundTruthColumns::default()),
            Err(GroundTruthError::InvalidLabel {
                row: 0,
                label: "maybe".to_string()
            })
        );
    }

    #[test]
    fn test_from_rows_custom_columns() {
        let columns = GroundTruthColumns {
            left: "sponsor_name".to_string(),
            right: "ticker".to_string(),
            label: "label".to_string(),
        };
        let rows = vec![row(&[("sponsor_name", "Moderna"), ("ticker", "MRNA"), ("label", "correct")])];
        let truth = GroundTruth::from_rows(&rows, &columns).unwrap();
        assert_eq!(truth.label("Moderna", "MRNA"), Some(Label::Correct));
    }

    #[test]
    fn test_duplicate_labels() {
        let same = GroundTruth::from_labels(vec![
            GroundTruthLabel::new("A", "X", Label::Correct),
            GroundTruthLabel::new("A", "X", Label::Correct),
        ])
        .unwrap();
        assert_eq!(same.len(), 1);

        let conflict = GroundTruth::from_labels(vec![
            GroundTruthLabel::new("A", "X", Label::Correct),
            GroundTruthLabel::new("A", "X", Label::Incorrect),
        ]);
        assert_eq!(
            conflict,
            Err(GroundTruthError::ConflictingLabels {
                left_id: "A".to_string(),
                right_id: "X".to_string()
            })
        );
    }

    #[test]
    fn test_confusion_examples() {
        let truth = gt(&[
            ("A", "X", Label::Correct),
            ("B", "Y", Label::Incorrect),
            ("C", "Z", Label::Correct),
            ("D", "W", Label::Correct),
        ]);
        let predictions = vec![
            pred("A", "X", 0.7),
            pred("B", "Y", 0.6),
            pred("E", "V", 0.9),
            pred("D", "W", 0.95),
        ];

        let tp = confusion_examples(&predictions, &truth, ConfusionCategory::TruePositive, 10);
        let tp_ids: Vec<&str> = tp.iter().map(|e| e.left_id.as_str()).collect();
        assert_eq!(tp_ids, vec!["D", "A"]);

        let fp = confusion_examples(&predictions, &truth, ConfusionCategory::FalsePositive, 10);
        assert_eq!(fp.len(), 2);
        assert_eq!(fp[0].left_id, "E");
        assert_eq!(fp[0].label, None);
        assert_eq!(fp[1].label, Some(Label::Incorrect));

        let fneg = confusion_examples(&predictions, &truth, ConfusionCategory::FalseNegative, 10);
        assert_eq!(fneg.len(), 1);
        assert_eq!(fneg[0].left_id, "C");
        assert_eq!(fneg[0].confidence, None);

        let limited = confusion_examples(&predictions, &truth, ConfusionCategory::FalsePositive, 1);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_confusion_example_display() {
        let example = ConfusionExample {
            left_id: "Pfizer".to_string(),
            right_id: "PFE".to_string(),
            confidence: Some(0.9123),
            label: None,
        };
        let line = example.to_string();
        assert!(line.starts_with("[0.912] Pfizer"));
        assert!(line.ends_with("PFE    (unlabeled)"));
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("fp".parse::<ConfusionCategory>(), Ok(ConfusionCategory::FalsePositive));
        assert!("tn".parse::<ConfusionCategory>().is_err());
    }

    #[test]
    fn test_metrics_display() {
        let truth = gt(&[("A", "X", Label::Correct)]);
        let m = compute_metrics(&[pred("A", "X", 0.9), pred("B", "Y", 0.8)], &truth, 0.0);
        let text = m.to_string();
        assert!(text.contains("Precision: 0.500 (1/2 predictions correct)"));
        assert!(text.contains("Coverage:  100.0%"));
        assert!(text.contains("True Negatives:  not computed"));
    }

    #[test]
    fn test_generate_report() {
        let truth = gt(&[("A", "X", Label::Correct), ("B", "Y", Label::Correct)]);
        let predictions = vec![pred("A", "X", 0.9), pred("A", "Y", 0.8), pred("B", "Y", 0.7)];

        let report =
            generate_evaluation_report(&predictions, &truth, &EvaluationConfig::default()).unwrap();
        assert_eq!(report.metrics_at_k.len(), 5);
        assert_eq!(report.metrics_at_k[&1].true_positives, 2);
        assert_eq!(report.threshold_analysis.len(), 21);
        assert_eq!(report.overall_metrics.false_positives, 1);
        assert!(report.best_threshold.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["metrics_at_k"]["1"]["precision"].is_number());
        assert!(json["best_threshold"]["f1"].is_number());
    }

    #[test]
    fn test_report_rejects_zero_k() {
        let config = EvaluationConfig {
            k_values: vec![0],
            ..EvaluationConfig::default()
        };
        assert_eq!(
            generate_evaluation_report(&[], &GroundTruth::default(), &config),
            Err(EvaluationError::InvalidK)
        );
    }
}
