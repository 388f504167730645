//! Prediction service: Orchestrates one hybrid assessment.
//!
//! This service coordinates:
//! - Input normalization and modality routing
//! - Case matching and confirmation against the reference cohorts
//! - Column alignment, scaling and classification
//! - Decision fusion and the advisory message
//! - Best-effort explanation
//!
//! Both pipelines are built once and never mutated, so a single service can
//! be shared across threads behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::adapters::{load_artifacts, load_cohorts, CsvReferenceSource};
use crate::config::{PipelineConfig, ServiceConfig};
use crate::domain::explanation::explain_or_empty;
use crate::domain::features::is_target_column;
use crate::domain::fusion::{advisory, fuse, FusionInput};
use crate::domain::{
    confirm_case, cosine_match, detect_has_lab, normalize_input, round2, Advisory, CohortStore,
    CohortSummary, DiagnosisClass, ExplanationSummary, FeatureImpact, FeatureRecord, FinalLabel,
    FusionPolicy, FusionResult, Modality, SimilarityResult,
};
use crate::ports::{
    Classifier, ClassifierOutput, Collaborator, CollaboratorError, Explainer, Failure,
    FeatureFrame, FeatureNamed, Scaler,
};
use crate::{Result, ThyrocaseError};

/// Collaborators and reference cases for one modality.
pub struct Pipeline {
    modality: Modality,
    classifier: Option<Arc<dyn Classifier>>,
    scaler: Option<Arc<dyn Scaler>>,
    explainer: Option<Arc<dyn Explainer>>,
    cohorts: Arc<CohortStore>,
}

impl Pipeline {
    /// A pipeline with cohorts only; attach collaborators with the `with_*`
    /// builders.
    #[must_use]
    pub fn new(modality: Modality, cohorts: CohortStore) -> Self {
        Self {
            modality,
            classifier: None,
            scaler: None,
            explainer: None,
            cohorts: Arc::new(cohorts),
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    #[must_use]
    pub fn with_scaler(mut self, scaler: Arc<dyn Scaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    #[must_use]
    pub fn with_explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    /// Load artifacts and reference data from disk.
    ///
    /// Failures are logged and leave the matching collaborator absent; the
    /// pipeline itself is always constructed.
    #[must_use]
    pub fn load(modality: Modality, paths: &PipelineConfig, config: &ServiceConfig) -> Self {
        let source = CsvReferenceSource::new(&paths.reference_csv);
        let mut pipeline = Self::new(modality, load_cohorts(&source, config.cohort_size));

        match load_artifacts(&paths.model_dir, config.allow_unverified_models) {
            Ok(artifacts) => {
                pipeline.classifier = Some(artifacts.classifier);
                pipeline.scaler = artifacts.scaler.map(|s| s as Arc<dyn Scaler>);
                if config.disable_explainer {
                    tracing::info!("Explainer disabled for {} pipeline", modality);
                } else {
                    pipeline.explainer = Some(artifacts.explainer);
                }
            }
            Err(e) => {
                tracing::error!("Failed to load {} model: {}", modality, e);
            }
        }
        pipeline
    }

    #[must_use]
    pub fn modality(&self) -> Modality {
        self.modality
    }

    #[must_use]
    pub fn cohorts(&self) -> &CohortStore {
        &self.cohorts
    }

    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            mode: self.modality,
            classifier: self.classifier.is_some(),
            scaler: self.scaler.is_some(),
            explainer: self.explainer.is_some(),
            cohorts: self.cohorts.summary(),
        }
    }

    /// Column order handed to the scaler/classifier.
    fn align_columns(&self, classifier: &dyn Classifier, record: &FeatureRecord) -> Vec<String> {
        let columns = if let Some(names) = declared_names(classifier.as_feature_named()) {
            names
        } else if let Some(columns) = self.cohorts.reference_columns() {
            columns.to_vec()
        } else {
            record.sorted_keys()
        };
        columns.into_iter().filter(|c| !is_target_column(c)).collect()
    }

    fn scale(&self, frame: FeatureFrame) -> Result<FeatureFrame> {
        let Some(scaler) = &self.scaler else {
            return Ok(frame);
        };

        let expected = declared_names(scaler.as_feature_named())
            .map(|names| names.into_iter().filter(|c| !is_target_column(c)).collect::<Vec<_>>());
        let frame = match &expected {
            Some(order) => {
                let (aligned, missing) = frame.reindex(order);
                if !missing.is_empty() {
                    tracing::info!("Added {} missing columns for scaler alignment", missing.len());
                    tracing::debug!("Columns filled with 0: {:?}", missing);
                }
                aligned
            }
            None => frame,
        };

        let scaled = scaler.transform(&frame).map_err(|e| {
            tracing::warn!("Scaler rejected input: {}", e);
            ThyrocaseError::SchemaMismatch {
                expected: expected.clone().unwrap_or_default(),
                actual: frame.columns().to_vec(),
            }
        })?;
        if scaled.row_count() != frame.row_count() {
            return Err(CollaboratorError::call_failed(
                Collaborator::Scaler,
                format!("returned {} rows for {}", scaled.row_count(), frame.row_count()),
            )
            .into());
        }
        Ok(scaled)
    }

    fn classify(&self, classifier: &dyn Classifier, scaled: &FeatureFrame) -> Result<ClassifierOutput> {
        classifier.predict(scaled).map_err(|e| {
            if e.failure == Failure::SchemaMismatch {
                tracing::warn!("Classifier rejected input: {}", e);
                ThyrocaseError::SchemaMismatch {
                    expected: declared_names(classifier.as_feature_named()).unwrap_or_default(),
                    actual: scaled.columns().to_vec(),
                }
            } else {
                e.into()
            }
        })
    }

    fn explain(&self, scaled: &FeatureFrame, class_index: usize) -> (Vec<FeatureImpact>, ExplanationSummary) {
        let Some(explainer) = &self.explainer else {
            return (Vec::new(), ExplanationSummary::default());
        };
        let names = scaled.columns();
        let raw = explainer.explain(scaled, class_index);
        let summary = raw
            .as_ref()
            .map(|values| ExplanationSummary::from_raw(values, names))
            .unwrap_or_default();
        (explain_or_empty(raw, names), summary)
    }
}

fn declared_names(named: Option<&dyn FeatureNamed>) -> Option<Vec<String>> {
    named
        .map(|n| n.feature_names())
        .filter(|names| !names.is_empty())
        .map(<[String]>::to_vec)
}

/// Loaded-collaborator report for one pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub mode: Modality,
    pub classifier: bool,
    pub scaler: bool,
    pub explainer: bool,
    pub cohorts: CohortSummary,
}

/// Complete outcome of one assessment.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub modality: Modality,
    pub similarity: SimilarityResult,
    pub fusion: FusionResult,
    pub advisory: Advisory,
    pub explanation: Vec<FeatureImpact>,
    pub factors: ExplanationSummary,
    pub assessed_at: DateTime<Utc>,
}

/// Success payload returned at the request boundary.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionPayload {
    pub success: bool,
    pub prediction: FinalLabel,
    pub confidence: f64,
    pub classifier_prediction: DiagnosisClass,
    pub classifier_confidence: f64,
    pub case_similarity: f64,
    pub validation_confidence: f64,
    pub class_scores: BTreeMap<DiagnosisClass, f64>,
    pub mode: Modality,
    pub explanation: Vec<FeatureImpact>,
    pub factors: ExplanationSummary,
    pub message: String,
    pub assessed_at: DateTime<Utc>,
}

impl From<Assessment> for PredictionPayload {
    fn from(a: Assessment) -> Self {
        Self {
            success: true,
            prediction: a.fusion.label,
            confidence: a.fusion.confidence,
            classifier_prediction: a.fusion.classifier_label,
            classifier_confidence: a.fusion.classifier_confidence,
            case_similarity: a.similarity.best_score,
            validation_confidence: a.fusion.validation_confidence,
            class_scores: a.similarity.class_scores,
            mode: a.modality,
            explanation: a.explanation,
            factors: a.factors,
            message: a.advisory.message,
            assessed_at: a.assessed_at,
        }
    }
}

/// Structured response: every outcome, including failures, serializes to
/// a JSON object with a `success` flag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Success(Box<PredictionPayload>),
    Failure { success: bool, message: String },
}

impl PredictionResponse {
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            success: false,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Immutable service context holding both serving pipelines.
pub struct PredictionService {
    lab: Pipeline,
    symptom: Pipeline,
    policy: FusionPolicy,
}

impl PredictionService {
    /// Create a service from explicitly built pipelines.
    #[must_use]
    pub fn new(lab: Pipeline, symptom: Pipeline, policy: FusionPolicy) -> Self {
        Self { lab, symptom, policy }
    }

    /// Load both pipelines as described by `config`.
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        tracing::info!("Initializing prediction service (fusion profile {})", config.fusion_profile);
        Self::new(
            Pipeline::load(Modality::LabAssisted, &config.lab, config),
            Pipeline::load(Modality::SymptomOnly, &config.symptom, config),
            FusionPolicy::for_profile(config.fusion_profile),
        )
    }

    #[must_use]
    pub fn pipeline(&self, modality: Modality) -> &Pipeline {
        match modality {
            Modality::LabAssisted => &self.lab,
            Modality::SymptomOnly => &self.symptom,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    #[must_use]
    pub fn status(&self) -> Vec<PipelineStatus> {
        vec![self.lab.status(), self.symptom.status()]
    }

    /// Run one hybrid assessment.
    ///
    /// # Errors
    /// Returns `EmptyRequest` for an empty object, `ModelNotLoaded` if the
    /// routed pipeline has no classifier, `SchemaMismatch` if the aligned
    /// frame cannot be consumed, and `Collaborator` for any other scaler or
    /// classifier failure. Explainer failures never surface here.
    pub fn predict(&self, raw: &Map<String, Value>) -> Result<Assessment> {
        if raw.is_empty() {
            return Err(ThyrocaseError::EmptyRequest);
        }

        let record = normalize_input(raw);
        let has_lab = detect_has_lab(&record);
        let modality = Modality::from_has_lab(has_lab);
        let pipeline = self.pipeline(modality);
        tracing::info!("Routing request to {} pipeline ({} fields)", modality, record.len());

        let classifier = pipeline
            .classifier
            .as_deref()
            .ok_or(ThyrocaseError::ModelNotLoaded(modality))?;

        tracing::debug!("Step 1: Matching against reference cohorts...");
        let similarity = cosine_match(&record, &pipeline.cohorts, has_lab);
        let validation_confidence = confirm_case(similarity.best_class, &record, &pipeline.cohorts, has_lab);

        tracing::debug!("Step 2: Aligning and scaling features...");
        let columns = pipeline.align_columns(classifier, &record);
        let values = record.vectorize(&columns);
        let scaled = pipeline.scale(FeatureFrame::single(columns, values))?;

        tracing::debug!("Step 3: Classifying...");
        let output = pipeline.classify(classifier, &scaled)?;
        let classifier_label = DiagnosisClass::from_index(output.class_index).ok_or_else(|| {
            CollaboratorError::call_failed(
                Collaborator::Classifier,
                format!("class index {} outside the known classes", output.class_index),
            )
        })?;
        let classifier_confidence = round2(output.confidence_percent());

        tracing::debug!("Step 4: Fusing evidence...");
        let fusion = fuse(
            &self.policy,
            &FusionInput {
                classifier_label,
                classifier_confidence,
                cbr_class: similarity.best_class,
                validation_confidence,
                has_lab,
            },
        );
        let advice = advisory(
            &self.policy,
            modality,
            fusion.confidence,
            similarity.best_score,
            classifier_confidence,
        );

        let (explanation, factors) = pipeline.explain(&scaled, output.class_index);

        tracing::info!(
            "Assessment complete: prediction={}, confidence={:.2}, classifier={} ({:.2}), case={} ({:.2})",
            fusion.label,
            fusion.confidence,
            classifier_label,
            classifier_confidence,
            similarity
                .best_class
                .map_or("none", |c| c.as_str()),
            validation_confidence
        );

        Ok(Assessment {
            modality,
            similarity,
            fusion,
            advisory: advice,
            explanation,
            factors,
            assessed_at: Utc::now(),
        })
    }

    /// Request boundary: never fails, always returns a structured response.
    #[must_use]
    pub fn respond(&self, payload: &Value) -> PredictionResponse {
        let result = match payload {
            Value::Object(map) => self.predict(map),
            _ => Err(ThyrocaseError::EmptyRequest),
        };
        match result {
            Ok(assessment) => PredictionResponse::Success(Box::new(assessment.into())),
            Err(e) => {
                tracing::error!("Prediction failed: {}", e);
                PredictionResponse::failure(e.user_message())
            }
        }
    }
}
