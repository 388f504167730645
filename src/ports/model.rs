//! Model ports: the externally trained artifacts the engine consumes.
//!
//! Classifier, scaler and explainer are opaque. The engine only relies on
//! the call contracts below and on the optional [`FeatureNamed`] capability.

use super::collaborator::{CollaboratorError, FeatureFrame, FeatureNamed};

/// Uniform fallback used when a classifier exposes no probabilities.
pub const UNIFORM_PROBABILITIES: [f64; 3] = [0.33, 0.33, 0.33];

/// Raw classifier output for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutput {
    /// Index into the class encoding (0 = Normal, 1 = Hypothyroid, 2 = Hyperthyroid).
    pub class_index: usize,
    /// Per-class probabilities, if the model provides them.
    pub probabilities: Option<Vec<f64>>,
}

impl ClassifierOutput {
    /// Probability of the most likely class as a percentage.
    #[must_use]
    pub fn confidence_percent(&self) -> f64 {
        let probs = self
            .probabilities
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&UNIFORM_PROBABILITIES);
        probs
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .fold(0.0_f64, f64::max)
            * 100.0
    }
}

/// Trained classifier.
pub trait Classifier: Send + Sync {
    /// Predict the class of the single row in `frame`.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if the frame width does not match the model,
    /// `CallFailed` for any other prediction failure.
    fn predict(&self, frame: &FeatureFrame) -> Result<ClassifierOutput, CollaboratorError>;

    /// The model's expected column order, when it carries one.
    fn as_feature_named(&self) -> Option<&dyn FeatureNamed> {
        None
    }
}

/// Feature transform fit alongside the classifier.
pub trait Scaler: Send + Sync {
    /// Transform `frame`. The output has the same number of rows.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be transformed.
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame, CollaboratorError>;

    /// The scaler's expected column order, when it carries one.
    fn as_feature_named(&self) -> Option<&dyn FeatureNamed> {
        None
    }
}

/// Per-feature attribution for a prediction.
pub trait Explainer: Send + Sync {
    /// Attribution values of the first row of `scaled` towards `class_index`,
    /// one per column.
    ///
    /// # Errors
    /// Any failure; callers treat explanation as best-effort.
    fn explain(
        &self,
        scaled: &FeatureFrame,
        class_index: usize,
    ) -> Result<Vec<f64>, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_from_probabilities() {
        let out = ClassifierOutput {
            class_index: 1,
            probabilities: Some(vec![0.1, 0.75, 0.15]),
        };
        assert!((out.confidence_percent() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_without_probabilities_is_uniform() {
        let out = ClassifierOutput {
            class_index: 0,
            probabilities: None,
        };
        assert!((out.confidence_percent() - 33.0).abs() < 1e-9);
    }
}
