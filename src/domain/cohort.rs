//! Reference cohorts: the labeled population cases are matched against.
//!
//! A [`CohortStore`] is built once per process from a static reference
//! table and is read-only afterwards.

use std::collections::BTreeMap;

use serde::Serialize;

use super::diagnosis::DiagnosisClass;
use super::features::is_target_column;

/// Default number of rows kept per class.
pub const DEFAULT_COHORT_SIZE: usize = 200;

/// One row of a reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    /// Raw value of the diagnosis column, if the table has one.
    pub diagnosis: Option<String>,
    /// One entry per feature column; `None` for empty or non-numeric cells.
    pub values: Vec<Option<f64>>,
}

/// A labeled reference table as read from the dataset collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTable {
    /// Feature column names (target columns excluded).
    pub columns: Vec<String>,
    pub rows: Vec<ReferenceRow>,
    /// Whether the source had a diagnosis column at all.
    pub has_diagnosis: bool,
}

impl ReferenceTable {
    /// An empty table (missing or unreadable dataset).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reference cases for a single diagnosis class.
///
/// Missing cells are stored as 0, which is how they are read at
/// vectorization time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cohort {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Cohort {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Of `wanted`, the columns this cohort actually has, in `wanted` order.
    #[must_use]
    pub fn shared_columns<'a>(&self, wanted: &[&'a str]) -> Vec<&'a str> {
        wanted
            .iter()
            .copied()
            .filter(|c| self.has_column(c))
            .collect()
    }

    /// Every row projected onto `columns`. Unknown columns read as 0.
    #[must_use]
    pub fn project(&self, columns: &[&str]) -> Vec<Vec<f64>> {
        let indices: Vec<Option<usize>> = columns
            .iter()
            .map(|c| self.columns.iter().position(|own| own == c))
            .collect();

        self.rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| idx.and_then(|i| row.get(i).copied()).unwrap_or(0.0))
                    .collect()
            })
            .collect()
    }
}

/// Row counts per class, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CohortSummary {
    pub rows: BTreeMap<DiagnosisClass, usize>,
    pub columns: usize,
}

/// Class-partitioned reference cohorts.
#[derive(Debug, Clone, Default)]
pub struct CohortStore {
    cohorts: BTreeMap<DiagnosisClass, Cohort>,
}

impl CohortStore {
    /// A store where every cohort is empty.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            cohorts: DiagnosisClass::ALL
                .into_iter()
                .map(|c| (c, Cohort::default()))
                .collect(),
        }
    }

    /// Partition `table` into one cohort per class, keeping the first
    /// `per_class` matching rows in source order.
    ///
    /// A table without rows or without a diagnosis column yields three
    /// empty cohorts.
    #[must_use]
    pub fn build(table: &ReferenceTable, per_class: usize) -> Self {
        if table.is_empty() || !table.has_diagnosis {
            tracing::warn!("Reference table is empty or has no diagnosis column; cohorts left empty");
            return Self::empty();
        }

        let feature_idx: Vec<usize> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !is_target_column(name))
            .map(|(i, _)| i)
            .collect();
        let columns: Vec<String> = feature_idx
            .iter()
            .map(|&i| table.columns[i].clone())
            .collect();

        let cohorts = DiagnosisClass::ALL
            .into_iter()
            .map(|class| {
                let rows: Vec<Vec<f64>> = table
                    .rows
                    .iter()
                    .filter(|row| row.diagnosis.as_deref() == Some(class.as_str()))
                    .take(per_class)
                    .map(|row| {
                        feature_idx
                            .iter()
                            .map(|&i| row.values.get(i).copied().flatten().unwrap_or(0.0))
                            .collect()
                    })
                    .collect();
                (class, Cohort::new(columns.clone(), rows))
            })
            .collect();

        let store = Self { cohorts };
        tracing::info!(
            "Built reference cohorts: Normal={}, Hypothyroid={}, Hyperthyroid={} (cap {})",
            store.cohort(DiagnosisClass::Normal).map_or(0, Cohort::len),
            store.cohort(DiagnosisClass::Hypothyroid).map_or(0, Cohort::len),
            store.cohort(DiagnosisClass::Hyperthyroid).map_or(0, Cohort::len),
            per_class
        );
        store
    }

    /// Build a store directly from per-class cohorts.
    #[must_use]
    pub fn from_cohorts(cohorts: impl IntoIterator<Item = (DiagnosisClass, Cohort)>) -> Self {
        let mut store = Self::empty();
        for (class, cohort) in cohorts {
            store.cohorts.insert(class, cohort);
        }
        store
    }

    #[must_use]
    pub fn cohort(&self, class: DiagnosisClass) -> Option<&Cohort> {
        self.cohorts.get(&class)
    }

    /// Cohorts in priority order (Normal, Hypothyroid, Hyperthyroid).
    pub fn iter(&self) -> impl Iterator<Item = (DiagnosisClass, &Cohort)> {
        self.cohorts.iter().map(|(c, cohort)| (*c, cohort))
    }

    /// Columns of the Normal cohort when it has rows, else of the first
    /// non-empty cohort.
    #[must_use]
    pub fn reference_columns(&self) -> Option<&[String]> {
        self.iter()
            .find(|(_, cohort)| !cohort.is_empty())
            .map(|(_, cohort)| cohort.columns())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cohorts.values().all(Cohort::is_empty)
    }

    #[must_use]
    pub fn summary(&self) -> CohortSummary {
        CohortSummary {
            rows: self.iter().map(|(c, cohort)| (c, cohort.len())).collect(),
            columns: self.reference_columns().map_or(0, <[String]>::len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(diagnosis: &str, values: &[f64]) -> ReferenceRow {
        ReferenceRow {
            diagnosis: Some(diagnosis.to_string()),
            values: values.iter().map(|v| Some(*v)).collect(),
        }
    }

    fn table(rows: Vec<ReferenceRow>) -> ReferenceTable {
        ReferenceTable {
            columns: vec!["Age".into(), "Sex".into(), "Label".into()],
            rows,
            has_diagnosis: true,
        }
    }

    #[test]
    fn test_partition_keeps_first_n_in_source_order() {
        let rows = (0..5)
            .map(|i| row("Normal", &[f64::from(i), 1.0, 0.0]))
            .chain(std::iter::once(row("Hyperthyroid", &[50.0, 0.0, 2.0])))
            .collect();
        let store = CohortStore::build(&table(rows), 3);

        let normal = store.cohort(DiagnosisClass::Normal).expect("normal cohort");
        assert_eq!(normal.len(), 3);
        assert_eq!(normal.project(&["Age"]), vec![vec![0.0], vec![1.0], vec![2.0]]);

        assert_eq!(store.cohort(DiagnosisClass::Hyperthyroid).map(Cohort::len), Some(1));
        assert!(store
            .cohort(DiagnosisClass::Hypothyroid)
            .expect("hypo cohort")
            .is_empty());
    }

    #[test]
    fn test_label_column_excluded_from_features() {
        let store = CohortStore::build(&table(vec![row("Normal", &[30.0, 1.0, 0.0])]), 10);
        let normal = store.cohort(DiagnosisClass::Normal).expect("normal cohort");
        assert_eq!(normal.columns(), &["Age".to_string(), "Sex".to_string()]);
    }

    #[test]
    fn test_missing_diagnosis_column_yields_empty_cohorts() {
        let mut t = table(vec![row("Normal", &[30.0, 1.0, 0.0])]);
        t.has_diagnosis = false;
        let store = CohortStore::build(&t, 10);
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 3);
    }

    #[test]
    fn test_missing_cells_read_as_zero() {
        let t = ReferenceTable {
            columns: vec!["Age".into(), "FTI".into()],
            rows: vec![ReferenceRow {
                diagnosis: Some("Hypothyroid".into()),
                values: vec![Some(40.0), None],
            }],
            has_diagnosis: true,
        };
        let store = CohortStore::build(&t, 10);
        let hypo = store.cohort(DiagnosisClass::Hypothyroid).expect("hypo cohort");
        assert_eq!(hypo.project(&["Age", "FTI", "TSH mIU/L"]), vec![vec![40.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_shared_columns_preserve_requested_order() {
        let cohort = Cohort::new(vec!["Sex".into(), "Age".into()], vec![vec![1.0, 30.0]]);
        assert_eq!(cohort.shared_columns(&["Age", "FTI", "Sex"]), vec!["Age", "Sex"]);
    }

    #[test]
    fn test_reference_columns_prefers_first_non_empty() {
        let store = CohortStore::from_cohorts([(
            DiagnosisClass::Hypothyroid,
            Cohort::new(vec!["Age".into()], vec![vec![1.0]]),
        )]);
        assert_eq!(store.reference_columns(), Some(&["Age".to_string()][..]));
        assert!(CohortStore::empty().reference_columns().is_none());
    }
}
