// ⚠️ Error taxonomy - everything the operator can be told about
//
// Reference problems degrade to "no normalization possible". A bad upload
// abandons only its own file. A failed roster write leaves memory untouched.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reference sheet missing or unreadable
    #[error("reference table unavailable at {}: {reason}", .path.display())]
    ReferenceUnavailable { path: PathBuf, reason: String },

    /// A required column is absent from an input file
    #[error("{source_name}: missing required column '{column}'")]
    MissingColumn { source_name: String, column: String },

    /// The header row could not be located
    #[error("{source_name}: no header row found")]
    MissingHeader { source_name: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("report export failed: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error("configuration error: {0}")]
    Config(String),

    /// Merge requested with no staged batch
    #[error("nothing staged to merge")]
    NothingStaged,
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    pub fn missing_column(source_name: &str, column: &str) -> Self {
        ReconcileError::MissingColumn {
            source_name: source_name.to_string(),
            column: column.to_string(),
        }
    }

    /// True when the error only affects the file it came from
    pub fn is_file_local(&self) -> bool {
        matches!(
            self,
            ReconcileError::MissingColumn { .. }
                | ReconcileError::MissingHeader { .. }
                | ReconcileError::Csv(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_names_the_field() {
        let err = ReconcileError::missing_column("RFA-0101.csv", "連絡電話");
        let message = err.to_string();

        assert!(message.contains("RFA-0101.csv"));
        assert!(message.contains("連絡電話"));
        assert!(err.is_file_local());
    }

    #[test]
    fn test_reference_error_is_not_file_local() {
        let err = ReconcileError::ReferenceUnavailable {
            path: PathBuf::from("ref.xlsx"),
            reason: "not found".to_string(),
        };

        assert!(!err.is_file_local());
        assert!(err.to_string().contains("ref.xlsx"));
    }
}
