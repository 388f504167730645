//! Adapters layer: Concrete implementations of ports.
//!
//! - `csv_reference`: reference population read from CSV
//! - `json_model`: JSON-exported linear classifier, scaler and explainer
//! - `sanitize`: PII filtering for logs

pub mod csv_reference;
pub mod json_model;
pub mod sanitize;

pub use csv_reference::{load_cohorts, CsvReferenceSource};
pub use json_model::{load_artifacts, LinearExplainer, LinearModel, ModelArtifacts, StandardScaler};
