//! # Thyrocase
//!
//! Hybrid case-based reasoning and decision fusion engine for thyroid
//! status classification (Normal / Hypothyroid / Hyperthyroid).
//!
//! A request is normalized, routed to the lab-assisted or symptom-only
//! pipeline, scored against labeled reference cohorts by cosine similarity,
//! classified by an externally trained model and the two opinions fused
//! into one label and confidence.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and the matching/fusion algorithms
//! - `ports`: Trait definitions for external collaborators
//! - `adapters`: Concrete implementations (CSV reference data, JSON models, log sanitizing)
//! - `application`: Prediction service and batch worker
//! - `config`: Environment-driven service configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{DiagnosisClass, FeatureRecord, FinalLabel, Modality};

/// Result type for Thyrocase operations
pub type Result<T> = std::result::Result<T, ThyrocaseError>;

/// Main error type for Thyrocase
#[derive(Debug, thiserror::Error)]
pub enum ThyrocaseError {
    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] ports::CollaboratorError),

    #[error("Model not loaded for {0} mode.")]
    ModelNotLoaded(Modality),

    #[error("No JSON data received.")]
    EmptyRequest,

    #[error("Feature schema mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ThyrocaseError {
    /// Message safe to return to a caller. Internal detail stays in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelNotLoaded(_) | Self::EmptyRequest => self.to_string(),
            Self::Collaborator(e) => format!("Prediction failed: {} unavailable or failed.", e.collaborator),
            Self::SchemaMismatch { .. } => {
                "Prediction failed: input features do not match the model.".to_string()
            }
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) => {
                "Prediction failed: internal error.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Collaborator, CollaboratorError};

    #[test]
    fn test_user_message_hides_detail() {
        let err = ThyrocaseError::from(CollaboratorError::call_failed(
            Collaborator::Classifier,
            "stack trace with /srv/models/lab/model.json",
        ));
        let msg = err.user_message();
        assert!(msg.starts_with("Prediction failed"));
        assert!(!msg.contains("/srv"));
    }

    #[test]
    fn test_model_not_loaded_names_mode() {
        let err = ThyrocaseError::ModelNotLoaded(Modality::SymptomOnly);
        assert_eq!(err.user_message(), "Model not loaded for symptom-only mode.");
    }
}
