// ⚖️ Reconciliation - signup counts aligned to the reference list
//
// Output order is the reference sheet's order, which mirrors the
// organizational hierarchy the operator reads it in. Units with no signups
// still appear with 0; section headings never get a number.

use crate::batch::RegistrationRecord;
use crate::reference::ReferenceEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// SUMMARY ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub display_text: String,

    /// `Some` for units (0 minimum), `None` for section headings
    pub count: Option<usize>,
}

impl SummaryRow {
    pub fn is_title(&self) -> bool {
        self.count.is_none()
    }

    /// Count as shown in tables: blank for headings
    pub fn count_text(&self) -> String {
        self.count.map(|c| c.to_string()).unwrap_or_default()
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub rows: Vec<SummaryRow>,

    /// Roster size
    pub total_registrants: usize,

    /// Registrants whose unit matched a reference unit
    pub matched_registrants: usize,

    pub units_with_signups: usize,
    pub units_without_signups: usize,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    pub fn unmatched_registrants(&self) -> usize {
        self.total_registrants - self.matched_registrants
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} registrants, {} matched to {} units ({} units without signups), {} unmatched",
            self.total_registrants,
            self.matched_registrants,
            self.units_with_signups,
            self.units_without_signups,
            self.unmatched_registrants()
        )
    }
}

// ============================================================================
// RECONCILIATION REPORTER
// ============================================================================

/// Registrant count per unit string
pub fn count_by_unit(roster: &[RegistrationRecord]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in roster {
        *counts.entry(record.unit.clone()).or_insert(0) += 1;
    }
    counts
}

/// One row per reference entry, in reference order
pub fn summarize(roster: &[RegistrationRecord], ordered_list: &[ReferenceEntry]) -> Vec<SummaryRow> {
    let counts = count_by_unit(roster);

    ordered_list
        .iter()
        .map(|entry| SummaryRow {
            display_text: entry.display_text.clone(),
            count: if entry.is_unit {
                Some(counts.get(&entry.display_text).copied().unwrap_or(0))
            } else {
                None
            },
        })
        .collect()
}

pub struct ReconciliationReporter;

impl ReconciliationReporter {
    pub fn new() -> Self {
        ReconciliationReporter
    }

    pub fn summarize(&self, roster: &[RegistrationRecord], ordered_list: &[ReferenceEntry]) -> Vec<SummaryRow> {
        summarize(roster, ordered_list)
    }

    /// Summary rows plus headline totals
    pub fn reconcile(&self, roster: &[RegistrationRecord], ordered_list: &[ReferenceEntry]) -> ReconciliationReport {
        let rows = summarize(roster, ordered_list);

        // A unit repeated in the reference list is still one unit
        let mut seen = std::collections::HashSet::new();
        let mut matched_registrants = 0;
        let mut units_with_signups = 0;
        let mut units_without_signups = 0;

        for row in &rows {
            let Some(count) = row.count else { continue };
            if !seen.insert(row.display_text.as_str()) {
                continue;
            }
            matched_registrants += count;
            if count > 0 {
                units_with_signups += 1;
            } else {
                units_without_signups += 1;
            }
        }

        let report = ReconciliationReport {
            total_registrants: roster.len(),
            matched_registrants,
            units_with_signups,
            units_without_signups,
            rows,
            reconciled_at: chrono::Utc::now(),
        };

        tracing::info!("{}", report.summary());
        report
    }
}

impl Default for ReconciliationReporter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
