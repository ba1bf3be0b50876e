//! Calibration engine (spec.md §4.7, C7).
//!
//! Tracks confidence-binned accuracy, corrects reported confidence against observed
//! accuracy, and runs a windowed drift detector over recent calibration error.
//! Grounded in the confidence/accuracy bookkeeping implied by spec.md §4.7 and the
//! bin-correction shape used throughout `examples/original_source/governance_core/`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::types::clip;

/// Non-uniform confidence bin boundaries (spec.md §4.7): five bins, finer near the
/// top of the range where miscalibration matters most.
const BIN_BOUNDS: [(f64, f64); 5] = [(0.0, 0.5), (0.5, 0.7), (0.7, 0.8), (0.8, 0.9), (0.9, 1.0)];
const BIN_COUNT: usize = BIN_BOUNDS.len();

/// Per-bin running accuracy statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BinStats {
    pub samples: u32,
    /// Float rather than a count so partial-credit outcomes (`weight` in `(0, 1)`)
    /// contribute fractional correctness (spec.md §4.7).
    pub correct: f64,
    pub confidence_sum: f64,
}

impl BinStats {
    pub fn accuracy(&self) -> Option<f64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.correct / self.samples as f64)
        }
    }

    pub fn mean_confidence(&self) -> Option<f64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.confidence_sum / self.samples as f64)
        }
    }
}

fn bin_index(confidence: f64) -> usize {
    let c = clip(confidence, 0.0, 1.0);
    BIN_BOUNDS
        .iter()
        .position(|(lo, hi)| c >= *lo && (c < *hi || *hi >= 1.0))
        .unwrap_or(BIN_COUNT - 1)
}

/// A prediction awaiting an outcome, queued by `record_prediction` and resolved by
/// `resolve_prediction` or one of the automatic outcome evaluators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPrediction {
    pub id: String,
    pub agent_id: String,
    pub confidence: f64,
    pub task_type: String,
    pub created_at: DateTime<Utc>,
}

/// Kind of automatic outcome evaluation requested for a pending prediction
/// (spec.md §4.7 "Automatic outcome evaluators").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Test,
    Command,
    File,
    Api,
}

/// Raw signal fed to an automatic outcome evaluator.
#[derive(Debug, Clone)]
pub enum OutcomeEvidence<'a> {
    Test { passed: bool },
    Command { exit_code: i32 },
    File { expected_exists: bool, actual_exists: bool },
    Api { status_code: u16 },
    #[allow(dead_code)]
    Explicit { correct: bool, note: Option<&'a str> },
}

/// Evaluates raw evidence into a boolean correctness verdict (spec.md §4.7).
pub fn evaluate_outcome(kind: OutcomeKind, evidence: &OutcomeEvidence<'_>) -> bool {
    match (kind, evidence) {
        (OutcomeKind::Test, OutcomeEvidence::Test { passed }) => *passed,
        (OutcomeKind::Command, OutcomeEvidence::Command { exit_code }) => *exit_code == 0,
        (OutcomeKind::File, OutcomeEvidence::File { expected_exists, actual_exists }) => {
            expected_exists == actual_exists
        }
        (OutcomeKind::Api, OutcomeEvidence::Api { status_code }) => {
            (200..300).contains(status_code)
        }
        (_, OutcomeEvidence::Explicit { correct, .. }) => *correct,
        _ => false,
    }
}

/// A resolved miscalibration report for one confidence bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiscalibrationReport {
    pub bin_start: f64,
    pub bin_end: f64,
    pub mean_confidence: f64,
    pub accuracy: f64,
    pub error: f64,
    pub overconfident: bool,
}

/// One row of `CalibrationReport.bins` (spec.md §4.7 `check()`'s `bins{}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinReport {
    pub bin_start: f64,
    pub bin_end: f64,
    pub samples: u32,
    pub accuracy: Option<f64>,
    pub mean_confidence: Option<f64>,
    pub correction_factor: Option<f64>,
}

/// One row of `CalibrationReport.correction_factors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinCorrectionFactor {
    pub bin_start: f64,
    pub bin_end: f64,
    pub factor: f64,
}

/// Aggregate report returned by `check()` (spec.md §4.7:
/// `Report{calibrated, total, issues[], bins{}, correction_factors{}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub calibrated: bool,
    pub total: u32,
    pub issues: Vec<MiscalibrationReport>,
    pub bins: Vec<BinReport>,
    pub correction_factors: Vec<BinCorrectionFactor>,
}

/// Direction the drift detector assigns to a rolling window (spec.md §4.7 "Drift
/// detection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClassification {
    Stable,
    Improving,
    Degrading,
    Unstable,
}

/// Which signal the drift detector's delta exceeded the threshold on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    Accuracy,
    Calibration,
    Oscillation,
}

/// Full drift-detector verdict: a type (what moved) and a direction (which way).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_type: Option<DriftType>,
    pub direction: DriftClassification,
    pub accuracy_delta: f64,
    pub calibration_delta: f64,
    pub oscillation_count: usize,
}

/// One `(confidence, correct, error)` sample in the drift detector's rolling window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DriftSample {
    confidence: f64,
    correct: bool,
    error: f64,
}

/// Counts sign changes between consecutive short-window accuracy deltas: a sequence
/// that keeps reversing direction (up, down, up, down, …) oscillates even though
/// neither half-window mean moves far from the other (spec.md §4.7).
fn oscillation_count(samples: &[DriftSample], short_window: usize) -> usize {
    if samples.len() < short_window * 2 {
        return 0;
    }
    let chunk_accuracy: Vec<f64> = samples
        .chunks(short_window)
        .map(|chunk| chunk.iter().filter(|s| s.correct).count() as f64 / chunk.len() as f64)
        .collect();
    let signs: Vec<i8> = chunk_accuracy
        .windows(2)
        .map(|w| if w[1] > w[0] { 1 } else if w[1] < w[0] { -1 } else { 0 })
        .filter(|s| *s != 0)
        .collect();
    signs.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

/// Per-agent calibration tracker: five confidence bins, a pending-prediction queue,
/// and a bounded sample window for drift detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationTracker {
    pub agent_id: String,
    bins: [BinStats; BIN_COUNT],
    pending: VecDeque<PendingPrediction>,
    error_window: VecDeque<DriftSample>,
    window_capacity: usize,
    min_samples: u32,
    error_threshold: f64,
    drift_threshold: f64,
}

impl CalibrationTracker {
    pub fn new(
        agent_id: impl Into<String>,
        min_samples: u32,
        window_capacity: usize,
        error_threshold: f64,
        drift_threshold: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            bins: [BinStats::default(); BIN_COUNT],
            pending: VecDeque::new(),
            error_window: VecDeque::new(),
            window_capacity,
            min_samples,
            error_threshold,
            drift_threshold,
        }
    }

    /// Queues a prediction for later resolution; returns the prediction id.
    pub fn record_prediction(&mut self, confidence: f64, task_type: impl Into<String>, now: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        self.pending.push_back(PendingPrediction {
            id: id.clone(),
            agent_id: self.agent_id.clone(),
            confidence: clip(confidence, 0.0, 1.0),
            task_type: task_type.into(),
            created_at: now,
        });
        id
    }

    /// Resolves a pending prediction against an observed correctness verdict: by id
    /// when one is given, otherwise FIFO (the oldest queued prediction). `weight`
    /// permits partial credit (spec.md §4.7 `outcome(correct, prediction_id?, weight)`).
    pub fn resolve_prediction(&mut self, prediction_id: Option<&str>, correct: bool, weight: f64) -> CoreResult<()> {
        let prediction = match prediction_id {
            Some(id) => {
                let pos = self
                    .pending
                    .iter()
                    .position(|p| p.id == id)
                    .ok_or_else(|| CoreError::PredictionNotFound(id.to_string()))?;
                self.pending.remove(pos).expect("position just found")
            }
            None => self
                .pending
                .pop_front()
                .ok_or_else(|| CoreError::PredictionNotFound("<no pending predictions to resolve FIFO>".to_string()))?,
        };
        self.apply_outcome(prediction.confidence, correct, weight);
        Ok(())
    }

    /// Records a confidence/correctness pair directly, bypassing the pending queue,
    /// with a partial-credit `weight` (spec.md §4.7 `record_with_outcome`).
    pub fn record_with_outcome(&mut self, confidence: f64, correct: bool, weight: f64) {
        self.apply_outcome(confidence, correct, weight);
    }

    /// `record_with_outcome` at full weight, for callers that never need partial credit.
    pub fn record_outcome(&mut self, confidence: f64, correct: bool) {
        self.apply_outcome(confidence, correct, 1.0);
    }

    fn apply_outcome(&mut self, confidence: f64, correct: bool, weight: f64) {
        let confidence = clip(confidence, 0.0, 1.0);
        let weight = clip(weight, 0.0, 1.0);
        let idx = bin_index(confidence);
        let bin = &mut self.bins[idx];
        bin.samples += 1;
        bin.confidence_sum += confidence;
        if correct {
            bin.correct += weight;
        }

        let error = (confidence - if correct { 1.0 } else { 0.0 }).abs();
        if self.error_window.len() == self.window_capacity {
            self.error_window.pop_front();
        }
        self.error_window.push_back(DriftSample { confidence, correct, error });
    }

    /// Applies a correction factor to a raw confidence value using the bin's observed
    /// accuracy, only once the bin has accumulated `min_samples` (spec.md §4.7
    /// "Correction"): `factor = clip(accuracy / mean_confidence, 0.5, 1.5)`,
    /// `adjusted = clip(raw * factor, 0, 1)`. An explanation is attached whenever the
    /// factor moves the confidence by more than 5%.
    pub fn calibrate(&self, raw_confidence: f64) -> (f64, Option<String>) {
        let idx = bin_index(raw_confidence);
        let bin = &self.bins[idx];
        match (bin.accuracy(), bin.mean_confidence()) {
            (Some(accuracy), Some(mean_confidence)) if bin.samples >= self.min_samples && mean_confidence > 0.0 => {
                let factor = clip(accuracy / mean_confidence, 0.5, 1.5);
                let adjusted = clip(raw_confidence * factor, 0.0, 1.0);
                let explanation = if (factor - 1.0).abs() > 0.05 {
                    Some(format!(
                        "confidence adjusted by factor {factor:.2} (observed accuracy {accuracy:.2} vs reported confidence {mean_confidence:.2} in this bin)"
                    ))
                } else {
                    None
                };
                (adjusted, explanation)
            }
            _ => (raw_confidence, None),
        }
    }

    /// Produces the full calibration report: per-bin stats, correction factors for
    /// bins with enough samples, and miscalibration issues where `|accuracy -
    /// mean_confidence| > error_threshold` (spec.md §4.7 `check(min_per_bin,
    /// error_threshold)`).
    pub fn check(&self, min_per_bin: u32, error_threshold: f64) -> CalibrationReport {
        let mut issues = Vec::new();
        let mut bins = Vec::new();
        let mut correction_factors = Vec::new();
        let mut total = 0u32;

        for (i, bin) in self.bins.iter().enumerate() {
            let (bin_start, bin_end) = BIN_BOUNDS[i];
            total += bin.samples;
            let accuracy = bin.accuracy();
            let mean_confidence = bin.mean_confidence();

            let mut correction_factor = None;
            if let (Some(acc), Some(mc)) = (accuracy, mean_confidence) {
                if bin.samples >= min_per_bin && mc > 0.0 {
                    let factor = clip(acc / mc, 0.5, 1.5);
                    correction_factor = Some(factor);
                    correction_factors.push(BinCorrectionFactor { bin_start, bin_end, factor });
                }
                if bin.samples >= min_per_bin {
                    let error = (mc - acc).abs();
                    if error > error_threshold {
                        issues.push(MiscalibrationReport {
                            bin_start,
                            bin_end,
                            mean_confidence: mc,
                            accuracy: acc,
                            error,
                            overconfident: mc > acc,
                        });
                    }
                }
            }

            bins.push(BinReport { bin_start, bin_end, samples: bin.samples, accuracy, mean_confidence, correction_factor });
        }

        CalibrationReport { calibrated: issues.is_empty(), total, issues, bins, correction_factors }
    }

    /// Classifies recent calibration drift by comparing accuracy and mean error
    /// between the first and second halves of the rolling sample window, and by
    /// counting sign changes in short-window accuracy trends to catch oscillation
    /// neither half-window comparison would see (spec.md §4.7 "Drift detection").
    pub fn detect_drift(&self) -> DriftReport {
        if self.error_window.len() < 10 {
            return DriftReport {
                drift_type: None,
                direction: DriftClassification::Stable,
                accuracy_delta: 0.0,
                calibration_delta: 0.0,
                oscillation_count: 0,
            };
        }

        let samples: Vec<DriftSample> = self.error_window.iter().copied().collect();
        let mid = samples.len() / 2;
        let (first, second) = samples.split_at(mid);

        let accuracy_of = |xs: &[DriftSample]| xs.iter().filter(|s| s.correct).count() as f64 / xs.len() as f64;
        let mean_error_of = |xs: &[DriftSample]| xs.iter().map(|s| s.error).sum::<f64>() / xs.len() as f64;

        let accuracy_delta = accuracy_of(second) - accuracy_of(first);
        let calibration_delta = mean_error_of(second) - mean_error_of(first);

        let short_window = (self.window_capacity / 10).max(3);
        let oscillation_count = oscillation_count(&samples, short_window);
        let oscillating = oscillation_count >= 2;

        let drift_type = if oscillating {
            Some(DriftType::Oscillation)
        } else if accuracy_delta.abs() > self.drift_threshold {
            Some(DriftType::Accuracy)
        } else if calibration_delta.abs() > self.drift_threshold {
            Some(DriftType::Calibration)
        } else {
            None
        };

        let direction = if oscillating {
            DriftClassification::Unstable
        } else if accuracy_delta > self.drift_threshold || calibration_delta < -self.drift_threshold {
            DriftClassification::Improving
        } else if accuracy_delta < -self.drift_threshold || calibration_delta > self.drift_threshold {
            DriftClassification::Degrading
        } else {
            DriftClassification::Stable
        };

        DriftReport { drift_type, direction, accuracy_delta, calibration_delta, oscillation_count }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overconfident_bin_is_flagged() {
        let mut tracker = CalibrationTracker::new("agent-1", 5, 100, 0.15, 0.15);
        for _ in 0..10 {
            tracker.record_outcome(0.9, false);
        }
        let report = tracker.check(5, 0.15);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].overconfident);
        assert!(!report.calibrated);
    }

    #[test]
    fn calibrate_corrects_toward_observed_accuracy() {
        let mut tracker = CalibrationTracker::new("agent-1", 5, 100, 0.15, 0.15);
        for _ in 0..10 {
            tracker.record_outcome(0.9, false);
        }
        let (corrected, explanation) = tracker.calibrate(0.9);
        assert!(corrected < 0.9);
        assert!(explanation.is_some());
    }

    #[test]
    fn partial_credit_weight_is_fractional() {
        let mut tracker = CalibrationTracker::new("agent-1", 1, 100, 0.15, 0.15);
        tracker.record_with_outcome(0.9, true, 0.5);
        let report = tracker.check(1, 0.15);
        let bin = &report.bins[4];
        assert_eq!(bin.samples, 1);
        assert_eq!(bin.accuracy, Some(0.5));
    }

    #[test]
    fn pending_prediction_round_trip() {
        let mut tracker = CalibrationTracker::new("agent-1", 5, 100, 0.15, 0.15);
        let now = Utc::now();
        let id = tracker.record_prediction(0.7, "code_review", now);
        assert_eq!(tracker.pending_count(), 1);
        tracker.resolve_prediction(Some(&id), true, 1.0).unwrap();
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn resolve_prediction_falls_back_to_fifo() {
        let mut tracker = CalibrationTracker::new("agent-1", 5, 100, 0.15, 0.15);
        let now = Utc::now();
        let first = tracker.record_prediction(0.6, "code_review", now);
        tracker.record_prediction(0.7, "code_review", now);
        assert_eq!(tracker.pending_count(), 2);
        tracker.resolve_prediction(None, true, 1.0).unwrap();
        assert_eq!(tracker.pending_count(), 1);
        assert!(tracker.resolve_prediction(Some(&first), true, 1.0).is_err());
    }

    #[test]
    fn resolve_unknown_prediction_errors() {
        let mut tracker = CalibrationTracker::new("agent-1", 5, 100, 0.15, 0.15);
        assert!(tracker.resolve_prediction(Some("missing"), true, 1.0).is_err());
    }

    #[test]
    fn resolve_prediction_on_empty_queue_errors() {
        let mut tracker = CalibrationTracker::new("agent-1", 5, 100, 0.15, 0.15);
        assert!(tracker.resolve_prediction(None, true, 1.0).is_err());
    }

    #[test]
    fn automatic_evaluators_match_spec_shapes() {
        assert!(evaluate_outcome(OutcomeKind::Test, &OutcomeEvidence::Test { passed: true }));
        assert!(!evaluate_outcome(OutcomeKind::Command, &OutcomeEvidence::Command { exit_code: 1 }));
        assert!(evaluate_outcome(
            OutcomeKind::File,
            &OutcomeEvidence::File { expected_exists: true, actual_exists: true }
        ));
        assert!(evaluate_outcome(OutcomeKind::Api, &OutcomeEvidence::Api { status_code: 204 }));
        assert!(!evaluate_outcome(OutcomeKind::Api, &OutcomeEvidence::Api { status_code: 500 }));
    }

    #[test]
    fn drift_detector_flags_degrading_window() {
        let mut tracker = CalibrationTracker::new("agent-1", 1, 20, 0.05, 0.05);
        for _ in 0..10 {
            tracker.record_outcome(0.9, true);
        }
        for _ in 0..10 {
            tracker.record_outcome(0.9, false);
        }
        let drift = tracker.detect_drift();
        assert_ne!(drift.direction, DriftClassification::Improving);
        assert!(drift.accuracy_delta < 0.0);
    }

    #[test]
    fn drift_detector_flags_oscillation() {
        let mut tracker = CalibrationTracker::new("agent-1", 1, 30, 0.05, 0.05);
        for i in 0..30 {
            tracker.record_outcome(0.9, i % 2 == 0);
        }
        let drift = tracker.detect_drift();
        assert_eq!(drift.direction, DriftClassification::Unstable);
        assert_eq!(drift.drift_type, Some(DriftType::Oscillation));
    }
}
