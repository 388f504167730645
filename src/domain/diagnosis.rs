//! Diagnosis classes and labels.
//!
//! Represents the three thyroid states the engine can report, plus the
//! sentinel used when neither evidence line yields a class.

use serde::{Deserialize, Serialize};

/// Thyroid status classes.
///
/// Declaration order is the deterministic priority order used whenever
/// classes are iterated (cohort construction, tie-breaking, score maps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosisClass {
    /// Euthyroid, no indicators of dysfunction
    Normal,
    /// Underactive thyroid
    Hypothyroid,
    /// Overactive thyroid
    Hyperthyroid,
}

impl DiagnosisClass {
    /// All classes in priority order.
    pub const ALL: [DiagnosisClass; 3] = [Self::Normal, Self::Hypothyroid, Self::Hyperthyroid];

    /// Map a classifier output index to a class.
    ///
    /// Index order matches the label encoding of the exported models:
    /// 0 = Normal, 1 = Hypothyroid, 2 = Hyperthyroid.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Label as written in the reference dataset's diagnosis column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Hypothyroid => "Hypothyroid",
            Self::Hyperthyroid => "Hyperthyroid",
        }
    }

    /// Parse a dataset label. Matching is exact, as the reference files
    /// are generated with these spellings.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }
}

impl std::fmt::Display for DiagnosisClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final reported label: a diagnosis class or the "Uncertain" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FinalLabel {
    Class(DiagnosisClass),
    Uncertain,
}

impl FinalLabel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class(c) => c.as_str(),
            Self::Uncertain => "Uncertain",
        }
    }

    /// The diagnosis class, if this is not the sentinel.
    #[must_use]
    pub fn class(&self) -> Option<DiagnosisClass> {
        match self {
            Self::Class(c) => Some(*c),
            Self::Uncertain => None,
        }
    }
}

impl From<DiagnosisClass> for FinalLabel {
    fn from(class: DiagnosisClass) -> Self {
        Self::Class(class)
    }
}

impl From<FinalLabel> for String {
    fn from(label: FinalLabel) -> Self {
        label.as_str().to_string()
    }
}

impl TryFrom<String> for FinalLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "Uncertain" {
            return Ok(Self::Uncertain);
        }
        DiagnosisClass::from_label(&value)
            .map(Self::Class)
            .ok_or_else(|| format!("Unknown diagnosis label: {value}"))
    }
}

impl std::fmt::Display for FinalLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which serving pipeline handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    /// At least one laboratory value was supplied
    #[serde(rename = "lab-assisted")]
    LabAssisted,
    /// Demographics, symptoms and history only
    #[serde(rename = "symptom-only")]
    SymptomOnly,
}

impl Modality {
    #[must_use]
    pub fn from_has_lab(has_lab: bool) -> Self {
        if has_lab {
            Self::LabAssisted
        } else {
            Self::SymptomOnly
        }
    }

    #[must_use]
    pub fn has_lab(&self) -> bool {
        matches!(self, Self::LabAssisted)
    }

    /// Human-readable pipeline name used in messages.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::LabAssisted => "Hybrid (Lab-Assisted)",
            Self::SymptomOnly => "Symptom-Only",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LabAssisted => write!(f, "lab-assisted"),
            Self::SymptomOnly => write!(f, "symptom-only"),
        }
    }
}

/// Round to two decimal places, the precision of every reported score.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_from_index() {
        assert_eq!(DiagnosisClass::from_index(0), Some(DiagnosisClass::Normal));
        assert_eq!(DiagnosisClass::from_index(2), Some(DiagnosisClass::Hyperthyroid));
        assert_eq!(DiagnosisClass::from_index(3), None);
    }

    #[test]
    fn test_label_parsing_is_exact() {
        assert_eq!(
            DiagnosisClass::from_label("Hypothyroid"),
            Some(DiagnosisClass::Hypothyroid)
        );
        assert_eq!(DiagnosisClass::from_label("hypothyroid"), None);
    }

    #[test]
    fn test_final_label_serializes_as_string() {
        let json = serde_json::to_string(&FinalLabel::Uncertain).expect("serialize");
        assert_eq!(json, "\"Uncertain\"");

        let parsed: FinalLabel = serde_json::from_str("\"Normal\"").expect("deserialize");
        assert_eq!(parsed, FinalLabel::Class(DiagnosisClass::Normal));
    }

    #[test]
    fn test_round2() {
        assert!((round2(86.004) - 86.0).abs() < f64::EPSILON);
        assert!((round2(62.456) - 62.46).abs() < 1e-9);
    }
}
