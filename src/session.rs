// 🧭 Operator Session - upload, preview, merge, report
//
// Everything an operator surface (CLI, TUI, web page) needs, behind one
// struct. Staged batches live only in memory until `commit`.

use crate::batch::{BatchProcessor, BatchStats, RegistrationRecord};
use crate::cache;
use crate::config::Config;
use crate::data_quality::{
    unmatched_units, validate_reference, ReferenceReport, Severity, UnmatchedUnit,
};
use crate::error::{ReconcileError, Result};
use crate::export::{build_report, ReportArtifact};
use crate::reconciliation::{ReconciliationReport, ReconciliationReporter, SummaryRow};
use crate::reference::ReferenceTable;
use crate::roster::{MasterRoster, MergeOutcome, RosterStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of staging one uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file_name: String,
    pub records: usize,
    pub stats: Option<BatchStats>,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn summary(&self) -> String {
        match &self.error {
            None => format!("{}: {} records", self.file_name, self.records),
            Some(err) => format!("{}: skipped ({})", self.file_name, err),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub roster_size: usize,
    pub reference_entries: usize,
    pub reference_units: usize,
    pub reference_fingerprint: Option<String>,
    pub reference_error: Option<String>,
    pub reference_issues: usize,
    pub reference_critical_issues: usize,
    pub pending: usize,
}

pub struct Session {
    config: Config,
    reference: Arc<ReferenceTable>,
    reference_report: ReferenceReport,
    store: RosterStore,
    roster: MasterRoster,
    pending: Vec<RegistrationRecord>,
    processor: BatchProcessor,
}

impl Session {
    /// Load the reference table (cached) and the roster file
    pub fn open(config: Config) -> Result<Self> {
        let reference = cache::global().get_or_load(&config.reference_path);
        let store = RosterStore::new(config.master_roster_path.clone());
        let roster = store.load()?;
        let processor = BatchProcessor::from_config(&config);

        if let Some(err) = &reference.load_error {
            tracing::warn!(error = %err, "session opened without a reference table");
        }
        let reference_report = validate_reference(&reference);

        Ok(Session {
            config,
            reference,
            reference_report,
            store,
            roster,
            pending: Vec::new(),
            processor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceTable {
        &self.reference
    }

    pub fn roster(&self) -> &MasterRoster {
        &self.roster
    }

    pub fn pending(&self) -> &[RegistrationRecord] {
        &self.pending
    }

    /// Extract every file independently; successful batches replace the
    /// pending batch, failures are reported per file
    pub fn stage_files(&mut self, files: &[(String, Vec<u8>)]) -> Vec<FileOutcome> {
        let mut staged = Vec::new();
        let mut outcomes = Vec::with_capacity(files.len());

        for (file_name, bytes) in files {
            match self.processor.extract(bytes, file_name, &self.reference.lookup) {
                Ok(batch) => {
                    outcomes.push(FileOutcome {
                        file_name: file_name.clone(),
                        records: batch.records.len(),
                        stats: Some(batch.stats),
                        error: None,
                    });
                    staged.extend(batch.records);
                }
                Err(err) => {
                    tracing::warn!(file = %file_name, error = %err, "file skipped");
                    outcomes.push(FileOutcome {
                        file_name: file_name.clone(),
                        records: 0,
                        stats: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        tracing::info!(files = files.len(), staged = staged.len(), "batch staged");
        self.pending = staged;
        outcomes
    }

    /// Stage every import file in the data directory, in file-name order
    pub fn import_directory(&mut self) -> Result<Vec<FileOutcome>> {
        let dir = self.config.data_directory.clone();
        let mut names: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| self.config.is_import_file(name))
            .collect();
        names.sort();

        let mut files = Vec::with_capacity(names.len());
        let mut unreadable = Vec::new();
        for name in names {
            match std::fs::read(dir.join(&name)) {
                Ok(bytes) => files.push((name, bytes)),
                Err(err) => unreadable.push(FileOutcome {
                    file_name: name,
                    records: 0,
                    stats: None,
                    error: Some(ReconcileError::Io(err).to_string()),
                }),
            }
        }

        let mut outcomes = self.stage_files(&files);
        outcomes.extend(unreadable);
        Ok(outcomes)
    }

    pub fn preview(&self, n: usize) -> &[RegistrationRecord] {
        &self.pending[..n.min(self.pending.len())]
    }

    /// Merge the pending batch into the roster file. The in-memory roster
    /// only changes once the file has been written.
    pub fn commit(&mut self) -> Result<MergeOutcome> {
        if self.pending.is_empty() {
            return Err(ReconcileError::NothingStaged);
        }

        let outcome = self.store.merge_and_save(&self.pending)?;
        self.roster = outcome.roster.clone();
        self.pending.clear();
        Ok(outcome)
    }

    pub fn summary(&self) -> Vec<SummaryRow> {
        ReconciliationReporter::new().summarize(self.roster.records(), &self.reference.entries)
    }

    pub fn report(&self) -> ReconciliationReport {
        ReconciliationReporter::new().reconcile(self.roster.records(), &self.reference.entries)
    }

    /// `None` when unmatched reporting is switched off
    pub fn unmatched(&self) -> Option<Vec<UnmatchedUnit>> {
        self.config
            .report_unmatched
            .then(|| unmatched_units(self.roster.records(), &self.reference.entries))
    }

    /// Issues found in the reference sheet when it was last (re)loaded
    pub fn reference_report(&self) -> &ReferenceReport {
        &self.reference_report
    }

    pub fn export_report(&self) -> Result<ReportArtifact> {
        let unmatched = self.unmatched();
        build_report(&self.summary(), self.roster.records(), unmatched.as_deref())
    }

    /// Drop the cached table and rebuild it from disk
    pub fn reload_reference(&mut self) -> &ReferenceTable {
        self.reference = cache::global().reload(&self.config.reference_path);
        self.reference_report = validate_reference(&self.reference);
        &self.reference
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            roster_size: self.roster.len(),
            reference_entries: self.reference.entries.len(),
            reference_units: self.reference.unit_count(),
            reference_fingerprint: self.reference.fingerprint.clone(),
            reference_error: self.reference.load_error.clone(),
            reference_issues: self.reference_report.issues.len(),
            reference_critical_issues: self.reference_report.count(Severity::Critical),
            pending: self.pending.len(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
