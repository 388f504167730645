//! JSON model adapter: Implementation of the model ports.
//!
//! Loads artifacts exported by the offline training pipeline:
//! - `model.json`: multinomial linear classifier (softmax over `coef·x + b`)
//! - `scaler.json`: optional standard scaler fit alongside it
//! - `manifest.json`: SHA-256 hashes binding the files above
//!
//! The explainer is exact for a linear model: the attribution of feature `i`
//! towards class `k` is `coef[k][i] * x_scaled[i]`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::features::clean_column_name;
use crate::domain::DiagnosisClass;
use crate::ports::{
    Classifier, ClassifierOutput, Collaborator, CollaboratorError, Explainer, FeatureFrame,
    FeatureNamed, Scaler,
};

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

/// Model parameters exported by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub classes: Vec<String>,
    pub feature_names: Vec<String>,
    /// One coefficient row per class.
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearModel {
    /// Parse and sanity-check a model definition.
    ///
    /// # Errors
    /// Returns `Unavailable` if the JSON is invalid or the parameter shapes
    /// are inconsistent.
    pub fn from_json(content: &str) -> Result<Self, CollaboratorError> {
        let mut model: Self = serde_json::from_str(content).map_err(|e| {
            CollaboratorError::unavailable(Collaborator::Classifier, format!("Invalid {MODEL_FILE}: {e}"))
        })?;
        model.feature_names = model.feature_names.iter().map(|n| clean_column_name(n)).collect();
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), CollaboratorError> {
        let n = self.feature_names.len();
        let k = self.classes.len();
        if n == 0 || k == 0 {
            return Err(CollaboratorError::unavailable(
                Collaborator::Classifier,
                "model has no features or no classes",
            ));
        }
        if self.coefficients.len() != k || self.intercepts.len() != k {
            return Err(CollaboratorError::unavailable(
                Collaborator::Classifier,
                "coefficient and intercept rows do not match the class list",
            ));
        }
        if self.coefficients.iter().any(|row| row.len() != n) {
            return Err(CollaboratorError::unavailable(
                Collaborator::Classifier,
                "coefficient row length does not match feature_names length",
            ));
        }
        for (i, name) in self.classes.iter().enumerate() {
            if DiagnosisClass::from_label(name) != DiagnosisClass::from_index(i) {
                tracing::warn!(
                    "Model class {} at index {} does not follow the Normal/Hypothyroid/Hyperthyroid encoding",
                    name,
                    i
                );
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    fn decision(&self, x: &[f64]) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(self.intercepts.iter())
            .map(|(coef, b)| coef.iter().zip(x.iter()).map(|(c, v)| c * v).sum::<f64>() + b)
            .collect()
    }

    /// Class probabilities for one scaled row.
    #[must_use]
    pub fn probabilities(&self, x: &[f64]) -> Vec<f64> {
        softmax(&self.decision(x))
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if *v <= b => best,
            _ => Some((i, *v)),
        })
        .map(|(i, _)| i)
}

impl FeatureNamed for LinearModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

impl Classifier for LinearModel {
    fn predict(&self, frame: &FeatureFrame) -> Result<ClassifierOutput, CollaboratorError> {
        if frame.columns().len() != self.n_features() {
            return Err(CollaboratorError::schema_mismatch(
                Collaborator::Classifier,
                format!(
                    "expected {} features, got {}",
                    self.n_features(),
                    frame.columns().len()
                ),
            ));
        }
        let row = frame
            .first_row()
            .ok_or_else(|| CollaboratorError::call_failed(Collaborator::Classifier, "empty frame"))?;

        let probabilities = self.probabilities(row);
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(CollaboratorError::call_failed(
                Collaborator::Classifier,
                "non-finite decision values",
            ));
        }
        let class_index = argmax(&probabilities)
            .ok_or_else(|| CollaboratorError::call_failed(Collaborator::Classifier, "no classes"))?;

        Ok(ClassifierOutput {
            class_index,
            probabilities: Some(probabilities),
        })
    }

    fn as_feature_named(&self) -> Option<&dyn FeatureNamed> {
        Some(self)
    }
}

/// Standard scaler parameters: `(x - mean) / scale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// # Errors
    /// Returns `Unavailable` if the JSON is invalid or the vectors disagree
    /// in length.
    pub fn from_json(content: &str) -> Result<Self, CollaboratorError> {
        let mut scaler: Self = serde_json::from_str(content).map_err(|e| {
            CollaboratorError::unavailable(Collaborator::Scaler, format!("Invalid {SCALER_FILE}: {e}"))
        })?;
        scaler.feature_names = scaler.feature_names.iter().map(|n| clean_column_name(n)).collect();

        let n = scaler.mean.len();
        if n == 0
            || scaler.scale.len() != n
            || (!scaler.feature_names.is_empty() && scaler.feature_names.len() != n)
        {
            return Err(CollaboratorError::unavailable(
                Collaborator::Scaler,
                "mean, scale and feature_names lengths do not match",
            ));
        }
        Ok(scaler)
    }
}

impl FeatureNamed for StandardScaler {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

impl Scaler for StandardScaler {
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame, CollaboratorError> {
        if frame.columns().len() != self.mean.len() {
            return Err(CollaboratorError::schema_mismatch(
                Collaborator::Scaler,
                format!("expected {} features, got {}", self.mean.len(), frame.columns().len()),
            ));
        }
        let rows = frame
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(self.scale.iter()))
                    .map(|(x, (m, s))| {
                        let s = if *s == 0.0 { 1.0 } else { *s };
                        (x - m) / s
                    })
                    .collect()
            })
            .collect();
        FeatureFrame::new(frame.columns().to_vec(), rows)
            .map_err(|e| CollaboratorError::call_failed(Collaborator::Scaler, e.to_string()))
    }

    fn as_feature_named(&self) -> Option<&dyn FeatureNamed> {
        if self.feature_names.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// Exact per-feature attribution for [`LinearModel`].
#[derive(Debug, Clone)]
pub struct LinearExplainer {
    model: Arc<LinearModel>,
}

impl LinearExplainer {
    #[must_use]
    pub fn new(model: Arc<LinearModel>) -> Self {
        Self { model }
    }
}

impl Explainer for LinearExplainer {
    fn explain(&self, scaled: &FeatureFrame, class_index: usize) -> Result<Vec<f64>, CollaboratorError> {
        let coef = self.model.coefficients.get(class_index).ok_or_else(|| {
            CollaboratorError::call_failed(
                Collaborator::Explainer,
                format!("class index {class_index} out of range"),
            )
        })?;
        let row = scaled
            .first_row()
            .ok_or_else(|| CollaboratorError::call_failed(Collaborator::Explainer, "empty frame"))?;
        if row.len() != coef.len() {
            return Err(CollaboratorError::schema_mismatch(
                Collaborator::Explainer,
                format!("expected {} features, got {}", coef.len(), row.len()),
            ));
        }
        Ok(coef.iter().zip(row.iter()).map(|(c, x)| c * x).collect())
    }
}

/// Hashes binding the artifact files of one model directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    #[serde(default)]
    pub created_at: Option<i64>,
    pub files: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Hash the known artifact files present in `dir`.
    ///
    /// # Errors
    /// Returns `Unavailable` if `model.json` is missing or a file cannot be read.
    pub fn generate(dir: &Path) -> Result<Self, CollaboratorError> {
        let mut files = BTreeMap::new();
        for name in [MODEL_FILE, SCALER_FILE] {
            let path = dir.join(name);
            if !path.exists() {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| {
                CollaboratorError::unavailable(
                    Collaborator::Classifier,
                    format!("Failed to read {}: {e}", path.display()),
                )
            })?;
            files.insert(name.to_string(), sha256_hex_bytes(&bytes));
        }
        if !files.contains_key(MODEL_FILE) {
            return Err(CollaboratorError::unavailable(
                Collaborator::Classifier,
                format!("No {MODEL_FILE} found in {}", dir.display()),
            ));
        }
        Ok(Self {
            version: MANIFEST_VERSION,
            created_at: Some(chrono::Utc::now().timestamp()),
            files,
        })
    }
}

#[must_use]
pub fn sha256_hex_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Check `manifest.json` in `dir` against the files it lists.
///
/// `Ok(None)` means no manifest exists and unverified loading was allowed.
fn verify_manifest(
    dir: &Path,
    allow_unverified: bool,
) -> Result<Option<ArtifactManifest>, CollaboratorError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        if allow_unverified {
            tracing::warn!(
                "Loading unverified model artifacts from {} (no {})",
                dir.display(),
                MANIFEST_FILE
            );
            return Ok(None);
        }
        return Err(CollaboratorError::unavailable(
            Collaborator::Classifier,
            format!("{MANIFEST_FILE} missing in {}", dir.display()),
        ));
    }

    let content = fs::read(&manifest_path).map_err(|e| {
        CollaboratorError::unavailable(Collaborator::Classifier, format!("Failed to read manifest: {e}"))
    })?;
    let manifest: ArtifactManifest = serde_json::from_slice(&content).map_err(|e| {
        CollaboratorError::unavailable(
            Collaborator::Classifier,
            format!("Invalid {MANIFEST_FILE} format: {e}"),
        )
    })?;
    if manifest.version != MANIFEST_VERSION {
        return Err(CollaboratorError::unavailable(
            Collaborator::Classifier,
            format!("Unsupported manifest version: {}", manifest.version),
        ));
    }
    if !manifest.files.contains_key(MODEL_FILE) {
        return Err(CollaboratorError::unavailable(
            Collaborator::Classifier,
            format!("{MANIFEST_FILE} must include {MODEL_FILE}"),
        ));
    }

    for (rel, expected_hex) in &manifest.files {
        let path = dir.join(rel);
        let bytes = fs::read(&path).map_err(|e| {
            CollaboratorError::unavailable(
                Collaborator::Classifier,
                format!("Manifest references missing/unreadable file {}: {e}", path.display()),
            )
        })?;
        if !sha256_hex_bytes(&bytes).eq_ignore_ascii_case(expected_hex) {
            return Err(CollaboratorError::unavailable(
                Collaborator::Classifier,
                format!("File hash mismatch for {rel}"),
            ));
        }
    }

    tracing::info!("Artifact hashes verified for {}", dir.display());
    Ok(Some(manifest))
}

/// Collaborators loaded from one model directory.
#[derive(Clone)]
pub struct ModelArtifacts {
    pub classifier: Arc<LinearModel>,
    pub scaler: Option<Arc<StandardScaler>>,
    pub explainer: Arc<LinearExplainer>,
}

impl std::fmt::Debug for ModelArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifacts")
            .field("classes", &self.classifier.classes)
            .field("n_features", &self.classifier.n_features())
            .field("scaler", &self.scaler.is_some())
            .finish()
    }
}

/// Load and verify the artifacts in `dir`.
///
/// A scaler is only used when a manifest lists it, or when loading
/// unverified artifacts and `scaler.json` exists.
///
/// # Errors
/// Returns `Unavailable` if verification fails, the model file is missing,
/// or any artifact is malformed.
pub fn load_artifacts(dir: &Path, allow_unverified: bool) -> Result<ModelArtifacts, CollaboratorError> {
    if !dir.is_dir() {
        return Err(CollaboratorError::unavailable(
            Collaborator::Classifier,
            format!("model directory {} not found", dir.display()),
        ));
    }
    let manifest = verify_manifest(dir, allow_unverified)?;

    let model_path = dir.join(MODEL_FILE);
    let content = fs::read_to_string(&model_path).map_err(|e| {
        CollaboratorError::unavailable(
            Collaborator::Classifier,
            format!("Failed to read {}: {e}", model_path.display()),
        )
    })?;
    let model = Arc::new(LinearModel::from_json(&content)?);

    let scaler_path = dir.join(SCALER_FILE);
    let use_scaler = match &manifest {
        Some(m) => m.files.contains_key(SCALER_FILE),
        None => scaler_path.exists(),
    };
    let scaler = if use_scaler {
        let content = fs::read_to_string(&scaler_path).map_err(|e| {
            CollaboratorError::unavailable(
                Collaborator::Scaler,
                format!("Failed to read {}: {e}", scaler_path.display()),
            )
        })?;
        Some(Arc::new(StandardScaler::from_json(&content)?))
    } else {
        None
    };

    tracing::info!(
        "Loaded model from {} (classes={}, n_features={}, scaler={})",
        dir.display(),
        model.classes.len(),
        model.n_features(),
        scaler.is_some()
    );

    Ok(ModelArtifacts {
        explainer: Arc::new(LinearExplainer::new(Arc::clone(&model))),
        classifier: model,
        scaler,
    })
}
