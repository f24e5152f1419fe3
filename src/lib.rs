// Registration Reconciler - Core Library
// Exposes all modules for use in CLI, TUI, web server, and tests

pub mod error;
pub mod config;
pub mod reference;      // Reference sheet → ordered list + lookup table
pub mod sheet;          // CSV / xlsx grids, header location
pub mod normalizer;     // Unit string → canonical "<CODE><NAME>"
pub mod cache;          // Memoized reference table
pub mod batch;          // One registration export → records
pub mod roster;         // Deduplicated master roster + its CSV file
pub mod reconciliation; // Reference-ordered signup counts
pub mod data_quality;   // Normalization misses, reference checks
pub mod export;         // xlsx report
pub mod session;        // Operator workflow

// Re-export commonly used types
pub use error::{ReconcileError, Result};
pub use config::{Config, CONFIG_FILE};
pub use reference::{
    LookupTable, ReferenceEntry, ReferenceRow, ReferenceTable, ReferenceTableBuilder,
};
pub use normalizer::{normalize, NormalizeOutcome, Normalized, UnitNormalizer};
pub use cache::ReferenceCache;
pub use batch::{BatchProcessor, BatchResult, BatchStats, RegistrationRecord};
pub use roster::{MasterRoster, MergeOutcome, RosterStore};
pub use reconciliation::{ReconciliationReport, ReconciliationReporter, SummaryRow};
pub use data_quality::{
    OutcomeTally, QualityIssue, ReferenceReport, Severity, UnmatchedUnit,
};
pub use export::{build_report, ReportArtifact};
pub use session::{FileOutcome, Session, SessionStatus};
