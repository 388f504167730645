//! CSV adapter: Implementation of ReferenceSource.
//!
//! Reads the static reference population generated offline. Malformed or
//! missing files are reported as collaborator errors so the caller can fall
//! back to empty cohorts instead of failing startup.

use std::path::{Path, PathBuf};

use crate::domain::features::{clean_column_name, DIAGNOSIS_COLUMN};
use crate::domain::{CohortStore, ReferenceRow, ReferenceTable};
use crate::ports::{Collaborator, CollaboratorError, ReferenceSource};

/// Reference dataset stored as a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvReferenceSource {
    path: PathBuf,
}

impl CsvReferenceSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse CSV text into a reference table.
    ///
    /// # Errors
    /// Returns `CallFailed` if the header or a record cannot be read.
    pub fn parse(content: &str) -> Result<ReferenceTable, CollaboratorError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| read_error(&e))?
            .iter()
            .map(clean_column_name)
            .collect();

        let diagnosis_idx = headers.iter().position(|h| h == DIAGNOSIS_COLUMN);
        let feature_idx: Vec<usize> = (0..headers.len())
            .filter(|i| Some(*i) != diagnosis_idx)
            .collect();
        let columns = feature_idx.iter().map(|&i| headers[i].clone()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| read_error(&e))?;
            let diagnosis = diagnosis_idx
                .and_then(|i| record.get(i))
                .map(str::to_string);
            let values = feature_idx
                .iter()
                .map(|&i| record.get(i).and_then(parse_cell))
                .collect();
            rows.push(ReferenceRow { diagnosis, values });
        }

        Ok(ReferenceTable {
            columns,
            rows,
            has_diagnosis: diagnosis_idx.is_some(),
        })
    }
}

fn read_error(e: &csv::Error) -> CollaboratorError {
    CollaboratorError::call_failed(Collaborator::ReferenceData, format!("Malformed CSV: {e}"))
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl ReferenceSource for CsvReferenceSource {
    fn load(&self) -> Result<ReferenceTable, CollaboratorError> {
        if !self.path.exists() {
            return Err(CollaboratorError::unavailable(
                Collaborator::ReferenceData,
                format!("{} not found", self.path.display()),
            ));
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            CollaboratorError::unavailable(
                Collaborator::ReferenceData,
                format!("Failed to read {}: {e}", self.path.display()),
            )
        })?;
        let table = Self::parse(&content)?;
        tracing::info!(
            "Loaded reference dataset {} ({} rows, {} columns)",
            self.path.display(),
            table.rows.len(),
            table.columns.len()
        );
        Ok(table)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Build cohorts from any reference source, degrading to empty cohorts on
/// failure.
#[must_use]
pub fn load_cohorts(source: &dyn ReferenceSource, per_class: usize) -> CohortStore {
    match source.load() {
        Ok(table) => CohortStore::build(&table, per_class),
        Err(e) => {
            tracing::warn!(
                "Reference data {} unusable ({}); case matching disabled for this pipeline",
                source.describe(),
                e
            );
            CohortStore::empty()
        }
    }
}
