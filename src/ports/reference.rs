//! Reference dataset port.

use super::collaborator::CollaboratorError;
use crate::domain::ReferenceTable;

/// Source of the labeled reference population.
pub trait ReferenceSource: Send + Sync {
    /// Read the full table.
    ///
    /// # Errors
    /// Returns an error if the source is missing or malformed. Callers
    /// degrade to empty cohorts.
    fn load(&self) -> Result<ReferenceTable, CollaboratorError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}
