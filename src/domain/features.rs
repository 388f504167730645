//! Canonical feature names, input normalization and modality detection.
//!
//! Incoming records use whatever keys the caller chose ("tsh", "Gender",
//! "TSHValue", ...). Everything downstream works on canonical names only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Demographics, symptoms and history. Always expected.
pub const BASE_FEATURES: [&str; 16] = [
    "Age",
    "Sex",
    "Sym_Fatigue",
    "Sym_WeightChange",
    "Sym_DrySkin",
    "Sym_HairLoss",
    "Sym_HeartRate",
    "Sym_Digestion",
    "Sym_IrregularPeriods",
    "Sym_NeckSwelling",
    "DepressionAnxiety",
    "AutoimmuneDiseases",
    "FH_Hypothyroidism",
    "FH_Hyperthyroidism",
    "FH_Goiter",
    "FH_ThyroidCancer",
];

/// Laboratory measurements. May be absent.
pub const LAB_FEATURES: [&str; 4] = ["TSH mIU/L", "T3 ng/dL", "T4 ng/dL", "FTI"];

/// Name of the ground-truth column in reference datasets.
pub const DIAGNOSIS_COLUMN: &str = "Diagnosis";

/// Lower-cased, trimmed input key -> canonical feature name.
const ALIASES: [(&str, &str); 25] = [
    ("age", "Age"),
    ("sex", "Sex"),
    ("gender", "Sex"),
    ("tsh", "TSH mIU/L"),
    ("tshvalue", "TSH mIU/L"),
    ("t3", "T3 ng/dL"),
    ("t3value", "T3 ng/dL"),
    ("t4", "T4 ng/dL"),
    ("t4value", "T4 ng/dL"),
    ("fti", "FTI"),
    ("ftivalue", "FTI"),
    ("sym_fatigue", "Sym_Fatigue"),
    ("sym_weightchange", "Sym_WeightChange"),
    ("sym_dryskin", "Sym_DrySkin"),
    ("sym_hairloss", "Sym_HairLoss"),
    ("sym_heartrate", "Sym_HeartRate"),
    ("sym_digestion", "Sym_Digestion"),
    ("sym_irregularperiods", "Sym_IrregularPeriods"),
    ("sym_neckswelling", "Sym_NeckSwelling"),
    ("depressionanxiety", "DepressionAnxiety"),
    ("autoimmunediseases", "AutoimmuneDiseases"),
    ("fh_hypothyroidism", "FH_Hypothyroidism"),
    ("fh_hyperthyroidism", "FH_Hyperthyroidism"),
    ("fh_goiter", "FH_Goiter"),
    ("fh_thyroidcancer", "FH_ThyroidCancer"),
];

/// Feature names active for a modality: base features, plus lab features
/// only when the record carries lab data.
#[must_use]
pub fn active_features(has_lab: bool) -> Vec<&'static str> {
    let mut cols: Vec<&'static str> = BASE_FEATURES.to_vec();
    if has_lab {
        cols.extend_from_slice(&LAB_FEATURES);
    }
    cols
}

/// A normalized record: canonical feature name -> numeric value.
///
/// Absent features read as 0 when vectorized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord {
    values: HashMap<String, f64>,
}

impl FeatureRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in sorted order.
    #[must_use]
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Project the record onto `columns`, reading absent features as 0.
    #[must_use]
    pub fn vectorize<S: AsRef<str>>(&self, columns: &[S]) -> Vec<f64> {
        columns
            .iter()
            .map(|c| self.get(c.as_ref()).unwrap_or(0.0))
            .collect()
    }
}

impl FromIterator<(String, f64)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Resolve an input key to its canonical name. Unknown keys pass through
/// unchanged under their original spelling.
#[must_use]
pub fn canonical_name(key: &str) -> String {
    let folded = key.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == folded)
        .map_or_else(|| key.to_string(), |(_, canonical)| (*canonical).to_string())
}

/// Coerce an arbitrary JSON value to a number. Never fails: anything that
/// cannot be read as a finite number contributes 0.
#[must_use]
pub fn coerce_numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()).unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => coerce_str(s),
        Value::Null | Value::Array(_) | Value::Object(_) => 0.0,
    }
}

fn coerce_str(raw: &str) -> f64 {
    let v = raw.trim();
    match v.to_lowercase().as_str() {
        "yes" | "true" | "male" => 1.0,
        "no" | "false" | "female" => 0.0,
        _ => v
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .unwrap_or(0.0),
    }
}

/// Normalize a raw input object into a [`FeatureRecord`].
///
/// Keys are matched case-insensitively against the alias table, values are
/// coerced to numbers. `Sex` is truncated to an integer code
/// (1 = male, 0 = female).
#[must_use]
pub fn normalize_input(raw: &Map<String, Value>) -> FeatureRecord {
    let mut record = FeatureRecord::new();
    for (key, value) in raw {
        record.insert(canonical_name(key), coerce_numeric(value));
    }

    if let Some(sex) = record.get("Sex") {
        let code = if sex.is_finite() { sex.trunc() } else { 0.0 };
        record.insert("Sex", code);
    }

    record
}

/// True when at least one lab feature is present with a value above 0.
///
/// Lab keys that were defaulted to 0 do not count; this separates a real
/// lab-assisted case from a symptom-only form that submits empty lab fields.
#[must_use]
pub fn detect_has_lab(record: &FeatureRecord) -> bool {
    LAB_FEATURES
        .iter()
        .any(|lab| record.get(lab).is_some_and(|v| v > 0.0))
}

/// Clean a column header: trim, collapse whitespace, unify unit spellings.
#[must_use]
pub fn clean_column_name(name: &str) -> String {
    let collapsed = name
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.replace("ug/dl", "ng/dL").replace("µg/dL", "ng/dL")
}

/// Columns that carry the target rather than a feature.
#[must_use]
pub fn is_target_column(name: &str) -> bool {
    name == DIAGNOSIS_COLUMN || name.eq_ignore_ascii_case("label")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object literal")
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        let record = normalize_input(&obj(json!({
            " TSH ": 4.2,
            "Gender": "female",
            "SYM_FATIGUE": "yes",
            "ftiValue": "110.5"
        })));

        assert_eq!(record.get("TSH mIU/L"), Some(4.2));
        assert_eq!(record.get("Sex"), Some(0.0));
        assert_eq!(record.get("Sym_Fatigue"), Some(1.0));
        assert_eq!(record.get("FTI"), Some(110.5));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let record = normalize_input(&obj(json!({ "BMI": "23.1", "notes": "n/a" })));
        assert_eq!(record.get("BMI"), Some(23.1));
        assert_eq!(record.get("notes"), Some(0.0));
    }

    #[test]
    fn test_value_coercion_never_fails() {
        assert_eq!(coerce_numeric(&json!("TRUE")), 1.0);
        assert_eq!(coerce_numeric(&json!("No")), 0.0);
        assert_eq!(coerce_numeric(&json!(" 7.5 ")), 7.5);
        assert_eq!(coerce_numeric(&json!("abc")), 0.0);
        assert_eq!(coerce_numeric(&json!("NaN")), 0.0);
        assert_eq!(coerce_numeric(&json!(null)), 0.0);
        assert_eq!(coerce_numeric(&json!([1, 2])), 0.0);
        assert_eq!(coerce_numeric(&json!(true)), 1.0);
    }

    #[test]
    fn test_non_finite_strings_read_as_zero() {
        assert_eq!(coerce_numeric(&json!("inf")), 0.0);
        assert_eq!(coerce_numeric(&json!("-Infinity")), 0.0);
        assert_eq!(coerce_numeric(&json!("1e999")), 0.0);

        let record = normalize_input(&obj(json!({ "tsh": "inf", "Age": "1e999" })));
        assert_eq!(record.get("TSH mIU/L"), Some(0.0));
        assert_eq!(record.get("Age"), Some(0.0));
        assert!(!detect_has_lab(&record));
    }

    #[test]
    fn test_sex_truncated_to_integer_code() {
        let record = normalize_input(&obj(json!({ "sex": "1.7", "age": "42" })));
        assert_eq!(record.get("Sex"), Some(1.0));
        assert_eq!(record.get("Age"), Some(42.0));

        let record = normalize_input(&obj(json!({ "sex": "unknown" })));
        assert_eq!(record.get("Sex"), Some(0.0));
    }

    #[test]
    fn test_zero_lab_values_are_symptom_only() {
        let record = normalize_input(&obj(json!({
            "TSH mIU/L": 0,
            "T3 ng/dL": 0,
            "T4 ng/dL": 0,
            "FTI": 0,
            "Sym_Fatigue": 1
        })));
        assert!(!detect_has_lab(&record));
    }

    #[test]
    fn test_single_positive_lab_value_is_lab_assisted() {
        let record = normalize_input(&obj(json!({ "t4": "8.1" })));
        assert!(detect_has_lab(&record));

        let record = normalize_input(&obj(json!({ "tsh": -1.0 })));
        assert!(!detect_has_lab(&record));
    }

    #[test]
    fn test_active_features() {
        assert_eq!(active_features(false).len(), BASE_FEATURES.len());
        let with_lab = active_features(true);
        assert_eq!(with_lab.len(), BASE_FEATURES.len() + LAB_FEATURES.len());
        assert!(with_lab.contains(&"FTI"));
    }

    #[test]
    fn test_vectorize_defaults_missing_to_zero() {
        let mut record = FeatureRecord::new();
        record.insert("Age", 30.0);
        assert_eq!(record.vectorize(&["Age", "Sex"]), vec![30.0, 0.0]);
    }

    #[test]
    fn test_clean_column_name() {
        assert_eq!(clean_column_name("\u{feff} T4   ug/dl "), "T4 ng/dL");
        assert_eq!(clean_column_name("T3 µg/dL"), "T3 ng/dL");
        assert_eq!(clean_column_name("TSH mIU/L"), "TSH mIU/L");
    }

    #[test]
    fn test_target_columns() {
        assert!(is_target_column("Diagnosis"));
        assert!(is_target_column("LABEL"));
        assert!(!is_target_column("Age"));
    }
}
