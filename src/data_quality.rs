// ✅ Data Quality - normalization misses and reference-sheet sanity checks
//
// A normalization miss is not an error, but it should never disappear
// silently: misses are tallied per batch, and roster units that match no
// reference unit are listed for the operator.

use crate::batch::RegistrationRecord;
use crate::normalizer::NormalizeOutcome;
use crate::reference::{ReferenceEntry, ReferenceTable, CODE_LEN};
use crate::reconciliation::count_by_unit;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// OUTCOME TALLY
// ============================================================================

/// How many units each normalization rule handled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub empty: usize,
    pub already_canonical: usize,
    pub from_code: usize,
    pub from_name: usize,
    pub extracted: usize,
    pub unmatched: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: NormalizeOutcome) {
        match outcome {
            NormalizeOutcome::Empty => self.empty += 1,
            NormalizeOutcome::AlreadyCanonical => self.already_canonical += 1,
            NormalizeOutcome::FromCode => self.from_code += 1,
            NormalizeOutcome::FromName => self.from_name += 1,
            NormalizeOutcome::Extracted => self.extracted += 1,
            NormalizeOutcome::Unmatched => self.unmatched += 1,
        }
    }

    pub fn merge(&mut self, other: &OutcomeTally) {
        self.empty += other.empty;
        self.already_canonical += other.already_canonical;
        self.from_code += other.from_code;
        self.from_name += other.from_name;
        self.extracted += other.extracted;
        self.unmatched += other.unmatched;
    }

    pub fn total(&self) -> usize {
        self.empty
            + self.already_canonical
            + self.from_code
            + self.from_name
            + self.extracted
            + self.unmatched
    }

    /// Share of non-empty units that ended up canonical
    pub fn match_rate(&self) -> f64 {
        let considered = self.total() - self.empty;
        if considered == 0 {
            1.0
        } else {
            (considered - self.unmatched) as f64 / considered as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} units: {} canonical, {} by code, {} by name, {} extracted, {} unmatched, {} empty ({:.1}% matched)",
            self.total(),
            self.already_canonical,
            self.from_code,
            self.from_name,
            self.extracted,
            self.unmatched,
            self.empty,
            self.match_rate() * 100.0
        )
    }
}

// ============================================================================
// UNMATCHED UNITS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedUnit {
    pub unit: String,
    pub count: usize,
}

/// Roster units that equal no unit row of the reference list.
///
/// Sorted by count descending, then unit ascending.
pub fn unmatched_units(roster: &[RegistrationRecord], ordered_list: &[ReferenceEntry]) -> Vec<UnmatchedUnit> {
    let known: HashSet<&str> = ordered_list
        .iter()
        .filter(|e| e.is_unit)
        .map(|e| e.display_text.as_str())
        .collect();

    let mut unmatched: Vec<UnmatchedUnit> = count_by_unit(roster)
        .into_iter()
        .filter(|(unit, _)| !known.contains(unit.as_str()))
        .map(|(unit, count)| UnmatchedUnit { unit, count })
        .collect();

    unmatched.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.unit.cmp(&b.unit)));
    unmatched
}

// ============================================================================
// REFERENCE VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Lookup results will be wrong
    Warning,  // Lookup may surprise the operator
    Info,     // Cosmetic
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    /// 0-based row among the reference data rows
    pub row: usize,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceReport {
    pub issues: Vec<QualityIssue>,
}

impl ReferenceReport {
    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reference issues: {} ({} critical, {} warnings)",
            self.issues.len(),
            self.count(Severity::Critical),
            self.count(Severity::Warning)
        )
    }
}

fn is_code_shaped(value: &str) -> bool {
    value.chars().count() == CODE_LEN
        && value.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Check the unit rows for key-space problems in the lookup table
pub fn validate_reference(table: &ReferenceTable) -> ReferenceReport {
    let mut issues = Vec::new();
    let mut code_rows: HashMap<&str, usize> = HashMap::new();
    let mut name_rows: HashMap<&str, usize> = HashMap::new();

    for unit in &table.units {
        if !is_code_shaped(&unit.code) {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                row: unit.row,
                field: "code".to_string(),
                issue: format!("code '{}' is not 5 uppercase letters/digits", unit.code),
                recommendation: "Check whether this row is a heading typed into the code column"
                    .to_string(),
            });
        }

        if unit.name.is_empty() {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                row: unit.row,
                field: "name".to_string(),
                issue: format!("unit {} has no name after cleaning", unit.code),
                recommendation: "Fill in the unit name".to_string(),
            });
        } else if is_code_shaped(&unit.name) {
            issues.push(QualityIssue {
                severity: Severity::Critical,
                row: unit.row,
                field: "name".to_string(),
                issue: format!("name '{}' looks like a unit code", unit.name),
                recommendation: "Names shaped like codes collide in the lookup table".to_string(),
            });
        }

        if let Some(first) = code_rows.insert(unit.code.as_str(), unit.row) {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                row: unit.row,
                field: "code".to_string(),
                issue: format!("code {} already defined at row {}; this row wins", unit.code, first),
                recommendation: "Remove the stale duplicate".to_string(),
            });
        }

        if !unit.name.is_empty() {
            if let Some(first) = name_rows.insert(unit.name.as_str(), unit.row) {
                issues.push(QualityIssue {
                    severity: Severity::Info,
                    row: unit.row,
                    field: "name".to_string(),
                    issue: format!("name {} already used at row {}; this row wins", unit.name, first),
                    recommendation: "Names should be unique for name lookups".to_string(),
                });
            }
        }
    }

    let report = ReferenceReport { issues };
    if !report.issues.is_empty() {
        tracing::warn!("{}", report.summary());
    }
    report
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ReferenceRow, ReferenceTableBuilder};

    fn record(unit: &str, name: &str) -> RegistrationRecord {
        RegistrationRecord::new(unit, name)
    }

    #[test]
    fn test_outcome_tally() {
        let mut tally = OutcomeTally::default();
        tally.record(NormalizeOutcome::FromCode);
        tally.record(NormalizeOutcome::Extracted);
        tally.record(NormalizeOutcome::Unmatched);
        tally.record(NormalizeOutcome::Empty);

        assert_eq!(tally.total(), 4);
        assert!((tally.match_rate() - 2.0 / 3.0).abs() < 1e-9);

        let mut combined = OutcomeTally::default();
        combined.merge(&tally);
        combined.merge(&tally);
        assert_eq!(combined.unmatched, 2);

        println!("✅ {}", combined.summary());
    }

    #[test]
    fn test_empty_tally_match_rate() {
        assert_eq!(OutcomeTally::default().match_rate(), 1.0);
    }

    #[test]
    fn test_unmatched_units_sorted() {
        let list = vec![ReferenceEntry::unit("TP838", "富宅"), ReferenceEntry::title("資深處")];
        let roster = vec![
            record("TP838富宅", "甲"),
            record("神秘", "乙"),
            record("資深處", "丙"),
            record("資深處", "丁"),
            record("神秘", "戊"),
            record("另一個", "己"),
        ];

        let unmatched = unmatched_units(&roster, &list);

        // Title rows are not reconciliation targets
        assert_eq!(
            unmatched,
            vec![
                UnmatchedUnit { unit: "神秘".to_string(), count: 2 },
                UnmatchedUnit { unit: "資深處".to_string(), count: 2 },
                UnmatchedUnit { unit: "另一個".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_validate_clean_reference() {
        let table = ReferenceTableBuilder::new().build(&[
            ReferenceRow::new("TP838", "富宅"),
            ReferenceRow::new("", "資深處"),
            ReferenceRow::new("AB123", "信義"),
        ]);

        let report = validate_reference(&table);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_validate_flags_collisions_and_shapes() {
        let table = ReferenceTableBuilder::new().build(&[
            ReferenceRow::new("TP838", "富宅"),
            ReferenceRow::new("TP838", "豪宅"),
            ReferenceRow::new("AB123", "CD456"),
            ReferenceRow::new("北區業務部", "x"),
            ReferenceRow::new("EF789", "通訊處"),
        ]);

        let report = validate_reference(&table);
        println!("{}", report.summary());

        assert!(report.has_critical_issues());
        assert!(report.issues.iter().any(|i| i.issue.contains("already defined")));
        assert!(report.issues.iter().any(|i| i.issue.contains("looks like a unit code")));
        assert!(report.issues.iter().any(|i| i.issue.contains("北區業務部")));
        assert!(report.issues.iter().any(|i| i.issue.contains("no name")));
    }
}
