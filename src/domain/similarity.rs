//! Cosine case matching against the reference cohorts.
//!
//! Each cohort is compared only on the active features it actually has
//! (shared columns). A cohort with no shared column, or with no rows, is
//! skipped rather than scored as zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cohort::{Cohort, CohortStore};
use super::diagnosis::{round2, DiagnosisClass};
use super::features::{active_features, FeatureRecord};

/// Outcome of matching one record against all cohorts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Best-matching class; `None` when no cohort could be scored.
    pub best_class: Option<DiagnosisClass>,
    /// Best class's mean similarity in [0, 100]; 0 when nothing matched.
    pub best_score: f64,
    /// Mean similarity ×100 per scored class.
    pub class_scores: BTreeMap<DiagnosisClass, f64>,
}

/// Cosine similarity of two equally sized vectors.
///
/// Defined as 0 when either vector has zero norm or a non-finite entry.
/// Each vector is divided by its largest magnitude first, so very large
/// inputs cannot overflow the norms.
#[must_use]
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let (Some(scale_a), Some(scale_b)) = (max_magnitude(a), max_magnitude(b)) else {
        return 0.0;
    };
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (x / scale_a, y / scale_b);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Largest absolute value; `None` for an all-zero or non-finite vector.
fn max_magnitude(v: &[f64]) -> Option<f64> {
    if v.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let max = v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    (max > 0.0).then_some(max)
}

/// Mean cosine similarity between `record` and every row of `cohort`,
/// restricted to the active features the cohort shares.
///
/// `None` when the cohort is empty or shares no column.
fn mean_similarity(record: &FeatureRecord, cohort: &Cohort, active: &[&str]) -> Option<f64> {
    if cohort.is_empty() {
        return None;
    }
    let shared = cohort.shared_columns(active);
    if shared.is_empty() {
        return None;
    }

    let input = record.vectorize(&shared);
    let rows = cohort.project(&shared);
    let total: f64 = rows.iter().map(|row| cosine(&input, row)).sum();
    Some(total / rows.len() as f64)
}

/// Score `record` against every cohort and pick the best class.
///
/// Ties keep the first class in priority order (Normal, Hypothyroid,
/// Hyperthyroid).
#[must_use]
pub fn cosine_match(record: &FeatureRecord, store: &CohortStore, has_lab: bool) -> SimilarityResult {
    let active = active_features(has_lab);

    let mut best: Option<(DiagnosisClass, f64)> = None;
    let mut class_scores = BTreeMap::new();

    for (class, cohort) in store.iter() {
        let Some(mean) = mean_similarity(record, cohort, &active) else {
            tracing::debug!("Skipping {} cohort: no rows or no shared columns", class);
            continue;
        };
        class_scores.insert(class, round2(mean * 100.0));

        if best.map_or(true, |(_, score)| mean > score) {
            best = Some((class, mean));
        }
    }

    SimilarityResult {
        best_class: best.map(|(c, _)| c),
        best_score: best.map_or(0.0, |(_, score)| round2(score * 100.0)),
        class_scores,
    }
}

/// Validation confidence: how well `record` matches the cases labeled
/// with `best_class` specifically, ×100.
///
/// 0 when there is no class, the cohort is empty, or no column is shared.
#[must_use]
pub fn confirm_case(
    best_class: Option<DiagnosisClass>,
    record: &FeatureRecord,
    store: &CohortStore,
    has_lab: bool,
) -> f64 {
    let Some(cohort) = best_class.and_then(|c| store.cohort(c)) else {
        return 0.0;
    };
    let active = active_features(has_lab);
    mean_similarity(record, cohort, &active).map_or(0.0, |mean| round2(mean * 100.0))
}
