//! Decision fusion: merging classifier output with case-based evidence.
//!
//! # Weighting table
//!
//! | profile               | agreement (validation / classifier) | disagreement |
//! |-----------------------|-------------------------------------|--------------|
//! | `classifier-weighted` | 0.4 / 0.6                           | 0.5 / 0.5    |
//! | `case-weighted`       | 0.6 / 0.4                           | 0.5 / 0.5    |
//!
//! On disagreement the classifier label wins when lab data is present;
//! without lab data the case-based class wins, or "Uncertain" if there is
//! none.

use serde::{Deserialize, Serialize};

use super::diagnosis::{round2, DiagnosisClass, FinalLabel, Modality};

/// Confidence below which the advisory message is shown.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 50.0;

/// A pair of blend weights that always sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    validation: f64,
    classifier: f64,
}

impl BlendWeights {
    /// Weights giving `share` to validation confidence and the remainder to
    /// the classifier probability. `share` is clamped to [0, 1].
    #[must_use]
    pub fn favoring_validation(share: f64) -> Self {
        let validation = if share.is_finite() { share.clamp(0.0, 1.0) } else { 0.5 };
        Self {
            validation,
            classifier: 1.0 - validation,
        }
    }

    /// Equal weighting.
    #[must_use]
    pub fn even() -> Self {
        Self::favoring_validation(0.5)
    }

    #[must_use]
    pub fn validation(&self) -> f64 {
        self.validation
    }

    #[must_use]
    pub fn classifier(&self) -> f64 {
        self.classifier
    }

    #[must_use]
    pub fn blend(&self, validation_confidence: f64, classifier_confidence: f64) -> f64 {
        self.validation * validation_confidence + self.classifier * classifier_confidence
    }
}

/// Named deployment profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FusionProfile {
    /// Dual-model server: trusts the classifier on agreement.
    #[default]
    ClassifierWeighted,
    /// Single-model servers: trusts the case match on agreement.
    CaseWeighted,
}

impl std::str::FromStr for FusionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classifier-weighted" | "classifier" => Ok(Self::ClassifierWeighted),
            "case-weighted" | "case" => Ok(Self::CaseWeighted),
            other => Err(format!(
                "Unknown fusion profile '{other}' (expected classifier-weighted or case-weighted)"
            )),
        }
    }
}

impl std::fmt::Display for FusionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClassifierWeighted => write!(f, "classifier-weighted"),
            Self::CaseWeighted => write!(f, "case-weighted"),
        }
    }
}

/// Extra advisory trigger: weak case match and a hesitant classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityAdvisory {
    pub max_case_similarity: f64,
    pub max_classifier_confidence: f64,
}

/// One explicit weighting table, chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionPolicy {
    pub profile: FusionProfile,
    pub agreement: BlendWeights,
    pub disagreement: BlendWeights,
    pub low_confidence_threshold: f64,
    pub similarity_advisory: Option<SimilarityAdvisory>,
}

impl FusionPolicy {
    #[must_use]
    pub fn for_profile(profile: FusionProfile) -> Self {
        match profile {
            FusionProfile::ClassifierWeighted => Self {
                profile,
                agreement: BlendWeights::favoring_validation(0.4),
                disagreement: BlendWeights::even(),
                low_confidence_threshold: LOW_CONFIDENCE_THRESHOLD,
                similarity_advisory: None,
            },
            FusionProfile::CaseWeighted => Self {
                profile,
                agreement: BlendWeights::favoring_validation(0.6),
                disagreement: BlendWeights::even(),
                low_confidence_threshold: LOW_CONFIDENCE_THRESHOLD,
                similarity_advisory: Some(SimilarityAdvisory {
                    max_case_similarity: 60.0,
                    max_classifier_confidence: 70.0,
                }),
            },
        }
    }
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self::for_profile(FusionProfile::default())
    }
}

/// Both evidence lines for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionInput {
    pub classifier_label: DiagnosisClass,
    /// Classifier probability as a percentage.
    pub classifier_confidence: f64,
    pub cbr_class: Option<DiagnosisClass>,
    /// Validation confidence from the confirmation scorer, in [0, 100].
    pub validation_confidence: f64,
    pub has_lab: bool,
}

/// Fused decision plus the raw inputs, kept for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub label: FinalLabel,
    /// Final confidence in [0, 100], two decimals.
    pub confidence: f64,
    pub agreement: bool,
    pub classifier_label: DiagnosisClass,
    pub classifier_confidence: f64,
    pub cbr_class: Option<DiagnosisClass>,
    pub validation_confidence: f64,
}

/// Apply the fusion rule.
#[must_use]
pub fn fuse(policy: &FusionPolicy, input: &FusionInput) -> FusionResult {
    let agreement = input.cbr_class == Some(input.classifier_label);

    let (label, weights) = if agreement {
        (FinalLabel::Class(input.classifier_label), policy.agreement)
    } else if input.has_lab {
        // Lab values are more decisive than population similarity.
        (FinalLabel::Class(input.classifier_label), policy.disagreement)
    } else {
        let label = input.cbr_class.map_or(FinalLabel::Uncertain, FinalLabel::Class);
        (label, policy.disagreement)
    };

    let raw = weights.blend(input.validation_confidence, input.classifier_confidence);
    let confidence = if raw.is_finite() {
        round2(raw.clamp(0.0, 100.0))
    } else {
        0.0
    };

    FusionResult {
        label,
        confidence,
        agreement,
        classifier_label: input.classifier_label,
        classifier_confidence: input.classifier_confidence,
        cbr_class: input.cbr_class,
        validation_confidence: input.validation_confidence,
    }
}

/// User-facing message layered on top of the numeric result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub low_confidence: bool,
    pub message: String,
}

/// Build the advisory message. Never changes the label.
#[must_use]
pub fn advisory(
    policy: &FusionPolicy,
    modality: Modality,
    final_confidence: f64,
    case_similarity: f64,
    classifier_confidence: f64,
) -> Advisory {
    let weak_match = policy.similarity_advisory.is_some_and(|rule| {
        case_similarity < rule.max_case_similarity
            && classifier_confidence < rule.max_classifier_confidence
    });
    let low_confidence = final_confidence < policy.low_confidence_threshold || weak_match;

    let message = if low_confidence {
        "Low confidence: recommend adding lab results.".to_string()
    } else {
        format!("{} prediction successful.", modality.description())
    };

    Advisory {
        low_confidence,
        message,
    }
}
