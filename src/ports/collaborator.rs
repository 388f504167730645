//! Shared vocabulary for collaborator ports: the tagged failure type, the
//! feature-name capability and the frame exchanged with model artifacts.

/// Which external collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Classifier,
    Scaler,
    Explainer,
    ReferenceData,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classifier => write!(f, "classifier"),
            Self::Scaler => write!(f, "scaler"),
            Self::Explainer => write!(f, "explainer"),
            Self::ReferenceData => write!(f, "reference dataset"),
        }
    }
}

/// How it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Could not be loaded at all
    Unavailable,
    /// Loaded, but the call itself failed
    CallFailed,
    /// Input columns do not match what the collaborator expects
    SchemaMismatch,
}

/// Tagged failure outcome of a collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{collaborator} {}: {detail}", failure_text(.failure))]
pub struct CollaboratorError {
    pub collaborator: Collaborator,
    pub failure: Failure,
    pub detail: String,
}

fn failure_text(failure: &Failure) -> &'static str {
    match failure {
        Failure::Unavailable => "unavailable",
        Failure::CallFailed => "call failed",
        Failure::SchemaMismatch => "schema mismatch",
    }
}

impl CollaboratorError {
    pub fn unavailable(collaborator: Collaborator, detail: impl Into<String>) -> Self {
        Self {
            collaborator,
            failure: Failure::Unavailable,
            detail: detail.into(),
        }
    }

    pub fn call_failed(collaborator: Collaborator, detail: impl Into<String>) -> Self {
        Self {
            collaborator,
            failure: Failure::CallFailed,
            detail: detail.into(),
        }
    }

    pub fn schema_mismatch(collaborator: Collaborator, detail: impl Into<String>) -> Self {
        Self {
            collaborator,
            failure: Failure::SchemaMismatch,
            detail: detail.into(),
        }
    }
}

/// Capability: the collaborator knows the exact column order it was fit on.
///
/// Collaborators that carry no such metadata simply do not expose it
/// (see `as_feature_named` on the model ports).
pub trait FeatureNamed {
    fn feature_names(&self) -> &[String];
}

/// Malformed frame construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Row {row} has {len} values, expected {expected}")]
    RaggedRow { row: usize, len: usize, expected: usize },
}

/// A small named numeric table (usually a single row).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureFrame {
    /// Build a frame. Every row must have one value per column.
    ///
    /// # Errors
    /// Returns [`FrameError::RaggedRow`] for the first ragged row.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, FrameError> {
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(FrameError::RaggedRow {
                row,
                len: r.len(),
                expected: columns.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// A one-row frame.
    #[must_use]
    pub fn single(columns: Vec<String>, values: Vec<f64>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            columns,
            rows: vec![values],
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn first_row(&self) -> Option<&[f64]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Reorder to `order`, dropping extra columns and filling absent ones
    /// with 0. Returns the reindexed frame and the names that were filled.
    #[must_use]
    pub fn reindex(&self, order: &[String]) -> (Self, Vec<String>) {
        let mut missing = Vec::new();
        let indices: Vec<Option<usize>> = order
            .iter()
            .map(|name| {
                let idx = self.columns.iter().position(|c| c == name);
                if idx.is_none() {
                    missing.push(name.clone());
                }
                idx
            })
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| idx.map_or(0.0, |i| row[i]))
                    .collect()
            })
            .collect();

        (
            Self {
                columns: order.to_vec(),
                rows,
            },
            missing,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reindex_fills_and_drops() {
        let frame = FeatureFrame::single(
            vec!["Age".into(), "Extra".into(), "Sex".into()],
            vec![40.0, 9.0, 1.0],
        );
        let (aligned, missing) =
            frame.reindex(&["Sex".to_string(), "FTI".to_string(), "Age".to_string()]);

        assert_eq!(aligned.columns(), &["Sex", "FTI", "Age"]);
        assert_eq!(aligned.first_row(), Some(&[1.0, 0.0, 40.0][..]));
        assert_eq!(missing, vec!["FTI".to_string()]);
    }

    #[test]
    fn test_ragged_frame_rejected() {
        let err = FeatureFrame::new(vec!["a".into()], vec![vec![1.0], vec![1.0, 2.0]]).expect_err("ragged");
        assert_eq!(
            err,
            FrameError::RaggedRow {
                row: 1,
                len: 2,
                expected: 1
            }
        );
        assert_eq!(err.to_string(), "Row 1 has 2 values, expected 1");
    }

    #[test]
    fn test_error_display() {
        let err = CollaboratorError::unavailable(Collaborator::Scaler, "scaler.json missing");
        assert_eq!(err.to_string(), "scaler unavailable: scaler.json missing");
    }
}
