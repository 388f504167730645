//! Rescaling of explainer attributions into signed percentage impacts.

use serde::{Deserialize, Serialize};

use super::diagnosis::round2;

/// Clinically salient features, always flagged for display.
pub const KEY_FEATURES: [&str; 6] = ["TSH mIU/L", "T3 ng/dL", "T4 ng/dL", "FTI", "Age", "Sym_Fatigue"];

/// One feature's share of the explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImpact {
    pub name: String,
    /// Signed percentage; absolute values sum to ~100 across a response.
    pub impact: f64,
    pub highlight: bool,
}

/// Normalize raw attributions against their absolute sum.
///
/// `names[i]` pairs with `raw[i]`. Names without a value get impact 0 and
/// values without a name are dropped. A zero absolute sum is treated as 1.
#[must_use]
pub fn normalize_attributions<S: AsRef<str>>(raw: &[f64], names: &[S]) -> Vec<FeatureImpact> {
    let abs_sum: f64 = raw.iter().map(|v| v.abs()).sum();
    let denom = if abs_sum == 0.0 || !abs_sum.is_finite() { 1.0 } else { abs_sum };

    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.as_ref();
            let value = raw.get(i).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
            FeatureImpact {
                name: name.to_string(),
                impact: round2(value / denom * 100.0),
                highlight: KEY_FEATURES.contains(&name),
            }
        })
        .collect()
}

/// Best-effort explanation: any explainer failure yields an empty list.
#[must_use]
pub fn explain_or_empty<S, E>(raw: Result<Vec<f64>, E>, names: &[S]) -> Vec<FeatureImpact>
where
    S: AsRef<str>,
    E: std::fmt::Display,
{
    match raw {
        Ok(values) => normalize_attributions(&values, names),
        Err(e) => {
            tracing::warn!("Explanation unavailable: {}", e);
            Vec::new()
        }
    }
}

/// A named raw attribution value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub value: f64,
}

/// Ranked view of the raw attributions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplanationSummary {
    /// Top 5 by absolute value, rounded to 4 decimals.
    pub key_factors: Vec<Factor>,
    /// Top 3 positive attributions, largest first.
    pub top_contributing: Vec<Factor>,
    /// Top 3 negative attributions, most negative first.
    pub top_suppressing: Vec<Factor>,
}

impl ExplanationSummary {
    #[must_use]
    pub fn from_raw<S: AsRef<str>>(raw: &[f64], names: &[S]) -> Self {
        let pairs: Vec<Factor> = names
            .iter()
            .zip(raw.iter())
            .filter(|(_, v)| v.is_finite())
            .map(|(n, v)| Factor {
                name: n.as_ref().to_string(),
                value: *v,
            })
            .collect();

        let mut by_magnitude = pairs.clone();
        by_magnitude.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
        let key_factors = by_magnitude
            .into_iter()
            .take(5)
            .map(|f| Factor {
                value: (f.value * 10_000.0).round() / 10_000.0,
                ..f
            })
            .collect();

        let mut positive: Vec<Factor> = pairs.iter().filter(|f| f.value > 0.0).cloned().collect();
        positive.sort_by(|a, b| b.value.total_cmp(&a.value));
        positive.truncate(3);

        let mut negative: Vec<Factor> = pairs.into_iter().filter(|f| f.value < 0.0).collect();
        negative.sort_by(|a, b| a.value.total_cmp(&b.value));
        negative.truncate(3);

        Self {
            key_factors,
            top_contributing: positive,
            top_suppressing: negative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impacts_sum_to_one_hundred() {
        let names = ["TSH mIU/L", "Age", "Sym_DrySkin", "FH_Goiter"];
        let impacts = normalize_attributions(&[0.3, -0.1, 0.05, -0.05], &names);

        let total: f64 = impacts.iter().map(|i| i.impact.abs()).sum();
        assert!((total - 100.0).abs() < 0.05);
        assert!((impacts[0].impact - 60.0).abs() < 1e-9);
        assert!((impacts[1].impact + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_highlight_allow_list() {
        let impacts = normalize_attributions(&[0.0, 1.0], &["FTI", "Sym_DrySkin"]);
        assert!(impacts[0].highlight);
        assert!(!impacts[1].highlight);
    }

    #[test]
    fn test_zero_attributions_do_not_divide_by_zero() {
        let impacts = normalize_attributions(&[0.0, 0.0], &["Age", "Sex"]);
        assert!(impacts.iter().all(|i| i.impact == 0.0));
    }

    #[test]
    fn test_length_mismatch() {
        let impacts = normalize_attributions(&[1.0], &["Age", "Sex"]);
        assert_eq!(impacts.len(), 2);
        assert_eq!(impacts[1].impact, 0.0);

        let impacts = normalize_attributions(&[1.0, 1.0, 2.0], &["Age"]);
        assert_eq!(impacts.len(), 1);
        assert!((impacts[0].impact - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_yields_empty_list() {
        let impacts = explain_or_empty::<_, String>(Err("explainer crashed".into()), &["Age"]);
        assert!(impacts.is_empty());
    }

    #[test]
    fn test_summary_rankings() {
        let names = ["A", "B", "C", "D", "E", "F"];
        let raw = [0.5, -0.7, 0.1, -0.2, 0.3, 0.000_05];
        let summary = ExplanationSummary::from_raw(&raw, &names);

        let keys: Vec<&str> = summary.key_factors.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(keys, vec!["B", "A", "E", "D", "C"]);

        let up: Vec<&str> = summary.top_contributing.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(up, vec!["A", "E", "C"]);

        let down: Vec<&str> = summary.top_suppressing.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(down, vec!["B", "D"]);
    }
}
