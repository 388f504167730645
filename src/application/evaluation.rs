//! Evaluation against a labeled reference dataset.
//!
//! Every labeled row is replayed through the full hybrid assessment on a
//! [`BatchWorker`], and the fused predictions are tallied against the
//! row's diagnosis into a confusion matrix with per-class metrics.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::prediction::{PredictionResponse, PredictionService};
use super::worker::{BatchProgress, BatchWorker};
use crate::domain::features::is_target_column;
use crate::domain::{DiagnosisClass, FinalLabel, ReferenceTable};

/// Predicted-label columns: the three classes, then "Uncertain".
const PREDICTED_LABELS: [&str; 4] = ["Normal", "Hypothyroid", "Hyperthyroid", "Uncertain"];

/// Actual class (rows) x predicted label (columns).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    counts: [[usize; 4]; 3],
}

impl ConfusionMatrix {
    pub fn record(&mut self, actual: DiagnosisClass, predicted: FinalLabel) {
        self.counts[actual as usize][predicted_index(predicted)] += 1;
    }

    #[must_use]
    pub fn count(&self, actual: DiagnosisClass, predicted: FinalLabel) -> usize {
        self.counts[actual as usize][predicted_index(predicted)]
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    #[must_use]
    pub fn correct(&self) -> usize {
        DiagnosisClass::ALL
            .iter()
            .map(|&c| self.count(c, FinalLabel::Class(c)))
            .sum()
    }

    /// Fraction of evaluated rows predicted correctly; "Uncertain" counts
    /// as wrong. 0 for an empty matrix.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Precision, recall and F1 for one class (0 where undefined).
    #[must_use]
    pub fn class_metrics(&self, class: DiagnosisClass) -> ClassMetrics {
        let tp = self.count(class, FinalLabel::Class(class));
        let predicted: usize = DiagnosisClass::ALL
            .iter()
            .map(|&actual| self.count(actual, FinalLabel::Class(class)))
            .sum();
        let support: usize = self.counts[class as usize].iter().sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            precision,
            recall,
            f1,
            support,
        }
    }
}

fn predicted_index(label: FinalLabel) -> usize {
    match label {
        FinalLabel::Class(c) => c as usize,
        FinalLabel::Uncertain => 3,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Per-class classification metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Outcome of replaying a reference dataset.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Rows in the dataset.
    pub rows: usize,
    /// Rows with an assessment compared against their label.
    pub evaluated: usize,
    /// Rows whose assessment failed (e.g. no model for their modality).
    pub failed: usize,
    /// Rows without a recognized diagnosis label.
    pub skipped: usize,
    pub accuracy: f64,
    pub actual_labels: [&'static str; 3],
    pub predicted_labels: [&'static str; 4],
    pub confusion_matrix: ConfusionMatrix,
    pub per_class: BTreeMap<DiagnosisClass, ClassMetrics>,
}

/// Turn labeled rows into request payloads.
///
/// Empty cells are sent as 0. Rows without a recognized label are dropped.
#[must_use]
pub fn labeled_requests(table: &ReferenceTable) -> Vec<(DiagnosisClass, Value)> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let label = row.diagnosis.as_deref().map(str::trim).and_then(DiagnosisClass::from_label)?;
            let payload: Map<String, Value> = table
                .columns
                .iter()
                .zip(row.values.iter())
                .filter(|(column, _)| !is_target_column(column))
                .map(|(column, value)| (column.clone(), Value::from(value.unwrap_or(0.0))))
                .collect();
            Some((label, Value::Object(payload)))
        })
        .collect()
}

/// Replay every labeled row of `table` through `service`.
#[must_use]
pub fn evaluate(service: Arc<PredictionService>, table: &ReferenceTable) -> EvaluationReport {
    let (labels, payloads): (Vec<DiagnosisClass>, Vec<Value>) =
        labeled_requests(table).into_iter().unzip();
    let skipped = table.rows.len() - labels.len();
    if skipped > 0 {
        tracing::warn!("Skipping {} rows without a recognized diagnosis", skipped);
    }

    let mut matrix = ConfusionMatrix::default();
    let mut failed = 0;
    let mut total = 0;
    for update in BatchWorker::spawn(service, payloads) {
        match update {
            BatchProgress::Started { total: n } => {
                total = n;
                tracing::info!("Evaluating {} labeled rows", total);
            }
            BatchProgress::Completed { index, response } => {
                match (&response, labels.get(index)) {
                    (PredictionResponse::Success(payload), Some(&actual)) => {
                        matrix.record(actual, payload.prediction);
                    }
                    _ => failed += 1,
                }
                tracing::debug!("Evaluated {}/{}", index + 1, total);
            }
            BatchProgress::Finished { .. } => {}
        }
    }

    let report = EvaluationReport {
        rows: table.rows.len(),
        evaluated: matrix.total(),
        failed,
        skipped,
        accuracy: matrix.accuracy(),
        actual_labels: DiagnosisClass::ALL.map(|c| c.as_str()),
        predicted_labels: PREDICTED_LABELS,
        per_class: DiagnosisClass::ALL
            .iter()
            .map(|&c| (c, matrix.class_metrics(c)))
            .collect(),
        confusion_matrix: matrix,
    };
    tracing::info!(
        "Evaluation complete: {} evaluated, {} failed, accuracy={:.4}",
        report.evaluated,
        report.failed,
        report.accuracy
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Pipeline;
    use crate::domain::{CohortStore, FusionPolicy, Modality, ReferenceRow};
    use crate::ports::{Classifier, ClassifierOutput, CollaboratorError, FeatureFrame};

    /// Reads TSH: high is hypothyroid, very low is hyperthyroid.
    struct TshRule;

    impl Classifier for TshRule {
        fn predict(&self, frame: &FeatureFrame) -> Result<ClassifierOutput, CollaboratorError> {
            let tsh = frame
                .columns()
                .iter()
                .position(|c| c == "TSH mIU/L")
                .and_then(|i| frame.first_row().map(|row| row[i]))
                .unwrap_or(0.0);
            let class_index = if tsh > 5.0 {
                1
            } else if tsh < 0.5 {
                2
            } else {
                0
            };
            let mut probabilities = vec![0.05; 3];
            probabilities[class_index] = 0.9;
            Ok(ClassifierOutput {
                class_index,
                probabilities: Some(probabilities),
            })
        }
    }

    fn row(label: &str, age: f64, tsh: Option<f64>) -> ReferenceRow {
        ReferenceRow {
            diagnosis: Some(label.to_string()),
            values: vec![Some(age), tsh],
        }
    }

    fn table() -> ReferenceTable {
        ReferenceTable {
            columns: vec!["Age".to_string(), "TSH mIU/L".to_string()],
            rows: vec![
                row("Normal", 34.0, Some(2.0)),
                row("Hypothyroid", 51.0, Some(8.0)),
                row("Hyperthyroid", 29.0, Some(0.2)),
                row("Hypothyroid", 47.0, Some(3.0)),
                row("Unknown", 60.0, Some(2.5)),
                // No lab value: routed to the symptom pipeline, which has no model.
                row("Normal", 40.0, None),
            ],
            has_diagnosis: true,
        }
    }

    fn service() -> Arc<PredictionService> {
        Arc::new(PredictionService::new(
            Pipeline::new(Modality::LabAssisted, CohortStore::empty()).with_classifier(Arc::new(TshRule)),
            Pipeline::new(Modality::SymptomOnly, CohortStore::empty()),
            FusionPolicy::default(),
        ))
    }

    #[test]
    fn test_labeled_requests_fill_missing_and_skip_unknown() {
        let requests = labeled_requests(&table());
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0].0, DiagnosisClass::Normal);
        assert_eq!(requests[4].1["TSH mIU/L"], Value::from(0.0));
        assert_eq!(requests[1].1["Age"], Value::from(51.0));
    }

    #[test]
    fn test_evaluate_builds_confusion_matrix() {
        let report = evaluate(service(), &table());

        assert_eq!(report.rows, 6);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.evaluated, 4);
        assert!((report.accuracy - 0.75).abs() < 1e-9);

        let m = &report.confusion_matrix;
        let hypo = DiagnosisClass::Hypothyroid;
        assert_eq!(m.count(hypo, FinalLabel::Class(DiagnosisClass::Normal)), 1);
        assert_eq!(m.count(hypo, FinalLabel::Class(hypo)), 1);

        let normal = report.per_class[&DiagnosisClass::Normal];
        assert!((normal.precision - 0.5).abs() < 1e-9);
        assert!((normal.recall - 1.0).abs() < 1e-9);
        let hypo_metrics = report.per_class[&hypo];
        assert!((hypo_metrics.precision - 1.0).abs() < 1e-9);
        assert!((hypo_metrics.recall - 0.5).abs() < 1e-9);
        assert_eq!(hypo_metrics.support, 2);
    }

    #[test]
    fn test_uncertain_predictions_count_against_recall() {
        let mut m = ConfusionMatrix::default();
        m.record(DiagnosisClass::Hyperthyroid, FinalLabel::Uncertain);
        m.record(DiagnosisClass::Hyperthyroid, FinalLabel::Class(DiagnosisClass::Hyperthyroid));

        assert_eq!(m.total(), 2);
        assert!((m.accuracy() - 0.5).abs() < 1e-9);
        let metrics = m.class_metrics(DiagnosisClass::Hyperthyroid);
        assert!((metrics.precision - 1.0).abs() < 1e-9);
        assert!((metrics.recall - 0.5).abs() < 1e-9);
        assert_eq!(m.class_metrics(DiagnosisClass::Normal).f1, 0.0);
    }

    #[test]
    fn test_report_serializes() {
        let report = evaluate(service(), &table());
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["predicted_labels"][3], "Uncertain");
        assert_eq!(json["confusion_matrix"]["counts"][1][0], 1);
        assert!(json["per_class"]["Hypothyroid"]["recall"].is_number());
    }
}
