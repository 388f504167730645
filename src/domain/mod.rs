//! Domain layer: Core types and the case-based reasoning algorithms.
//!
//! Everything here is pure computation over in-memory values. No I/O,
//! no collaborator calls.

pub mod cohort;
mod diagnosis;
pub mod explanation;
pub mod features;
pub mod fusion;
pub mod similarity;

pub use cohort::{Cohort, CohortStore, CohortSummary, ReferenceRow, ReferenceTable, DEFAULT_COHORT_SIZE};
pub use diagnosis::{round2, DiagnosisClass, FinalLabel, Modality};
pub use explanation::{ExplanationSummary, FeatureImpact};
pub use features::{detect_has_lab, normalize_input, FeatureRecord};
pub use fusion::{Advisory, FusionPolicy, FusionProfile, FusionResult};
pub use similarity::{confirm_case, cosine_match, SimilarityResult};
