//! Service configuration read from `THYROCASE_*` environment variables.

use std::path::PathBuf;

use crate::domain::{FusionProfile, DEFAULT_COHORT_SIZE};
use crate::{Result, ThyrocaseError};

pub const LAB_MODEL_DIR_ENV: &str = "THYROCASE_LAB_MODEL_DIR";
pub const SYMPTOM_MODEL_DIR_ENV: &str = "THYROCASE_SYMPTOM_MODEL_DIR";
pub const LAB_REFERENCE_ENV: &str = "THYROCASE_LAB_REFERENCE";
pub const SYMPTOM_REFERENCE_ENV: &str = "THYROCASE_SYMPTOM_REFERENCE";
pub const COHORT_SIZE_ENV: &str = "THYROCASE_COHORT_SIZE";
pub const FUSION_PROFILE_ENV: &str = "THYROCASE_FUSION_PROFILE";
pub const ALLOW_UNVERIFIED_MODELS_ENV: &str = "THYROCASE_ALLOW_UNVERIFIED_MODELS";
pub const DISABLE_EXPLAINER_ENV: &str = "THYROCASE_DISABLE_EXPLAINER";

/// Where one serving pipeline gets its artifacts and reference cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub model_dir: PathBuf,
    pub reference_csv: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub lab: PipelineConfig,
    pub symptom: PipelineConfig,
    /// Reference rows kept per class.
    pub cohort_size: usize,
    pub fusion_profile: FusionProfile,
    /// Load model directories that carry no `manifest.json`.
    pub allow_unverified_models: bool,
    pub disable_explainer: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            lab: PipelineConfig {
                model_dir: PathBuf::from("models/lab"),
                reference_csv: PathBuf::from("data/thyroid_lab_reference.csv"),
            },
            symptom: PipelineConfig {
                model_dir: PathBuf::from("models/symptom"),
                reference_csv: PathBuf::from("data/thyroid_symptom_reference.csv"),
            },
            cohort_size: DEFAULT_COHORT_SIZE,
            fusion_profile: FusionProfile::default(),
            allow_unverified_models: false,
            disable_explainer: false,
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns `Config` for a non-numeric or zero cohort size, or an unknown
    /// fusion profile.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(LAB_MODEL_DIR_ENV) {
            config.lab.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(SYMPTOM_MODEL_DIR_ENV) {
            config.symptom.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(LAB_REFERENCE_ENV) {
            config.lab.reference_csv = PathBuf::from(v);
        }
        if let Some(v) = lookup(SYMPTOM_REFERENCE_ENV) {
            config.symptom.reference_csv = PathBuf::from(v);
        }
        if let Some(v) = lookup(COHORT_SIZE_ENV) {
            config.cohort_size = v
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    ThyrocaseError::Config(format!("{COHORT_SIZE_ENV} must be a positive integer, got {v:?}"))
                })?;
        }
        if let Some(v) = lookup(FUSION_PROFILE_ENV) {
            config.fusion_profile = v
                .trim()
                .parse()
                .map_err(|e| ThyrocaseError::Config(format!("{FUSION_PROFILE_ENV}: {e}")))?;
        }
        config.allow_unverified_models = lookup(ALLOW_UNVERIFIED_MODELS_ENV)
            .as_deref()
            .is_some_and(is_truthy);
        config.disable_explainer = lookup(DISABLE_EXPLAINER_ENV)
            .as_deref()
            .is_some_and(is_truthy);

        Ok(config)
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v, "1" | "true" | "TRUE" | "yes" | "YES")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.cohort_size, 200);
        assert_eq!(config.fusion_profile, FusionProfile::ClassifierWeighted);
        assert_eq!(config.lab.model_dir, PathBuf::from("models/lab"));
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            (SYMPTOM_REFERENCE_ENV, "/data/sym.csv"),
            (COHORT_SIZE_ENV, " 50 "),
            (FUSION_PROFILE_ENV, "case-weighted"),
            (ALLOW_UNVERIFIED_MODELS_ENV, "yes"),
            (DISABLE_EXPLAINER_ENV, "no"),
        ]))
        .expect("config");

        assert_eq!(config.symptom.reference_csv, PathBuf::from("/data/sym.csv"));
        assert_eq!(config.cohort_size, 50);
        assert_eq!(config.fusion_profile, FusionProfile::CaseWeighted);
        assert!(config.allow_unverified_models);
        assert!(!config.disable_explainer);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for pairs in [
            [(COHORT_SIZE_ENV, "many")],
            [(COHORT_SIZE_ENV, "0")],
            [(FUSION_PROFILE_ENV, "majority-vote")],
        ] {
            let err = ServiceConfig::from_lookup(lookup_from(&pairs)).expect_err("invalid");
            assert!(matches!(err, ThyrocaseError::Config(_)));
        }
    }

    #[test]
    fn test_truthy_spellings() {
        for v in ["1", "true", "TRUE", "yes", "YES"] {
            assert!(is_truthy(v));
        }
        for v in ["0", "false", "True", "on", ""] {
            assert!(!is_truthy(v));
        }
    }
}
