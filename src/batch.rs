// 📥 Batch Processor - one registration export → clean (unit, name) records
//
// Export layout: banner row, header row, then one attendee per row.
// Incomplete and cancelled rows are dropped here; deduplication is left to
// the roster merge.

use crate::config::Config;
use crate::data_quality::OutcomeTally;
use crate::error::Result;
use crate::normalizer::UnitNormalizer;
use crate::reference::LookupTable;
use crate::sheet::{cell, csv_grid, locate_columns};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

pub const SEQUENCE_COLUMN: &str = "序";
pub const PHONE_COLUMN: &str = "連絡電話";
pub const UNIT_COLUMN: &str = "單位";
pub const PERSON_COLUMN: &str = "姓名";

/// Removed from unit and name wherever they occur, in this order
pub const NOISE_TOKENS: [&str; 8] = ["-", "一分處", "ㄧ分處", "通訊處", "分處", "通訊", "一", "ㄧ"];

// ============================================================================
// REGISTRATION RECORD
// ============================================================================

/// One attendee; also the row shape of the persisted roster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationRecord {
    #[serde(rename = "單位")]
    pub unit: String,

    #[serde(rename = "姓名")]
    pub name: String,
}

impl RegistrationRecord {
    pub fn new(unit: &str, name: &str) -> Self {
        RegistrationRecord {
            unit: unit.to_string(),
            name: name.to_string(),
        }
    }

    /// Roster uniqueness key
    pub fn key(&self) -> (&str, &str) {
        (&self.unit, &self.name)
    }
}

// ============================================================================
// BATCH RESULT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Data rows below the header
    pub rows_read: usize,

    /// Missing sequence number or phone
    pub dropped_incomplete: usize,

    /// Sequence field carries a cancellation/transfer marker
    pub dropped_cancelled: usize,

    pub outcomes: OutcomeTally,

    /// Distinct unit strings the normalizer could not place, first-seen order
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub source_name: String,
    pub records: Vec<RegistrationRecord>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} records ({} rows read, {} incomplete, {} cancelled, {} unmatched units)",
            self.source_name,
            self.records.len(),
            self.stats.rows_read,
            self.stats.dropped_incomplete,
            self.stats.dropped_cancelled,
            self.stats.unmatched.len()
        )
    }
}

// ============================================================================
// BATCH PROCESSOR
// ============================================================================

pub struct BatchProcessor {
    cancel_markers: Vec<String>,
    noise_tokens: Vec<String>,
}

impl BatchProcessor {
    pub fn new(cancel_markers: Vec<String>) -> Self {
        BatchProcessor {
            cancel_markers,
            noise_tokens: NOISE_TOKENS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cancel_markers.clone())
    }

    /// Extract records from raw CSV bytes
    pub fn extract(&self, bytes: &[u8], source_name: &str, lookup: &LookupTable) -> Result<BatchResult> {
        let grid = csv_grid(bytes)?;
        let (header_row, cols) = locate_columns(
            &grid,
            &[SEQUENCE_COLUMN, PHONE_COLUMN, UNIT_COLUMN, PERSON_COLUMN],
            source_name,
        )?;
        let (seq_col, phone_col, unit_col, name_col) = (cols[0], cols[1], cols[2], cols[3]);

        let normalizer = UnitNormalizer::new(lookup);
        let mut stats = BatchStats::default();
        let mut records = Vec::new();

        for row in grid.iter().skip(header_row + 1) {
            stats.rows_read += 1;

            let (sequence, _phone) = match (cell(row, seq_col), cell(row, phone_col)) {
                (Some(seq), Some(phone)) => (seq, phone),
                _ => {
                    stats.dropped_incomplete += 1;
                    continue;
                }
            };

            if self.is_cancelled(sequence) {
                stats.dropped_cancelled += 1;
                continue;
            }

            let unit = self.clean_field(row.get(unit_col).map(String::as_str).unwrap_or(""));
            let name = self.clean_field(row.get(name_col).map(String::as_str).unwrap_or(""));

            let normalized = normalizer.normalize(&unit.to_uppercase());
            stats.outcomes.record(normalized.outcome);

            if normalized.outcome.is_miss() {
                tracing::debug!(source = source_name, unit = %normalized.value, "unit not normalized");
                if !stats.unmatched.contains(&normalized.value) {
                    stats.unmatched.push(normalized.value.clone());
                }
            }

            records.push(RegistrationRecord {
                unit: normalized.value,
                name,
            });
        }

        let result = BatchResult {
            source_name: source_name.to_string(),
            records,
            stats,
        };

        tracing::info!(
            source = source_name,
            records = result.records.len(),
            incomplete = result.stats.dropped_incomplete,
            cancelled = result.stats.dropped_cancelled,
            "batch extracted"
        );
        if !result.stats.unmatched.is_empty() {
            tracing::warn!(
                source = source_name,
                units = ?result.stats.unmatched,
                "units left unnormalized"
            );
        }

        Ok(result)
    }

    pub fn is_cancelled(&self, sequence: &str) -> bool {
        self.cancel_markers.iter().any(|m| sequence.contains(m.as_str()))
    }

    /// Remove all whitespace and every noise token
    pub fn clean_field(&self, value: &str) -> String {
        let compact: String = value.split_whitespace().collect();
        self.noise_tokens
            .iter()
            .fold(compact, |acc, token| acc.replace(token.as_str(), ""))
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::reference::{ReferenceRow, ReferenceTableBuilder};

    fn lookup() -> LookupTable {
        ReferenceTableBuilder::new()
            .build(&[
                ReferenceRow::new("TP838", "富宅分處"),
                ReferenceRow::new("", "資深處"),
                ReferenceRow::new("AB123", "信義通訊處"),
            ])
            .lookup
    }

    fn export(rows: &[&str]) -> Vec<u8> {
        let mut body = String::from("\u{feff}RFA 報名名單 2026\n序,姓名,單位,連絡電話,備註\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        body.into_bytes()
    }

    #[test]
    fn test_embedded_code_unit_normalized() {
        let processor = BatchProcessor::default();
        let result = processor
            .extract(&export(&["1,王小明,富宅 TP838,0912000000,"]), "RFA-1.csv", &lookup())
            .unwrap();

        assert_eq!(result.records, vec![RegistrationRecord::new("TP838富宅", "王小明")]);
        assert_eq!(result.stats.outcomes.extracted, 1);
    }

    #[test]
    fn test_cancelled_row_dropped() {
        let processor = BatchProcessor::default();
        let result = processor
            .extract(
                &export(&[
                    "1取消,陳大文,TP838,0912000000,",
                    "2(轉班),林美,AB123,0912000001,",
                    "3,張三,AB123,0912000002,",
                ]),
                "RFA-2.csv",
                &lookup(),
            )
            .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].unit, "AB123信義");
        assert_eq!(result.stats.dropped_cancelled, 2);
        println!("✅ {}", result.summary());
    }

    #[test]
    fn test_incomplete_rows_dropped() {
        let processor = BatchProcessor::default();
        let result = processor
            .extract(
                &export(&[",無序號,TP838,0912000000,", "4,無電話,TP838, ,", "5,有效,TP838,0912", "6"]),
                "RFA-3.csv",
                &lookup(),
            )
            .unwrap();

        assert_eq!(result.records, vec![RegistrationRecord::new("TP838富宅", "有效")]);
        assert_eq!(result.stats.rows_read, 4);
        assert_eq!(result.stats.dropped_incomplete, 3);
    }

    #[test]
    fn test_noise_tokens_removed_from_both_fields() {
        let processor = BatchProcessor::default();

        assert_eq!(processor.clean_field(" 富宅 一分處 "), "富宅");
        assert_eq!(processor.clean_field("信義-通訊處"), "信義");
        assert_eq!(processor.clean_field("王 一 明"), "王明");
        assert_eq!(processor.clean_field("ㄧ分處"), "");
    }

    #[test]
    fn test_name_lookup_through_cleaning() {
        let processor = BatchProcessor::default();
        let result = processor
            .extract(&export(&["7,李四,信義 通訊處,0912000003,"]), "RFA-4.csv", &lookup())
            .unwrap();

        assert_eq!(result.records[0].unit, "AB123信義");
        assert_eq!(result.stats.outcomes.from_name, 1);
    }

    #[test]
    fn test_unmatched_units_collected_once() {
        let processor = BatchProcessor::default();
        let result = processor
            .extract(
                &export(&["1,甲,神秘單位,0911,", "2,乙,神秘 單位,0912,", "3,丙,tp838,0913,"]),
                "RFA-5.csv",
                &lookup(),
            )
            .unwrap();

        assert_eq!(result.stats.unmatched, vec!["神秘單位".to_string()]);
        assert_eq!(result.stats.outcomes.unmatched, 2);
        assert_eq!(result.records[2].unit, "TP838富宅");
    }

    #[test]
    fn test_no_deduplication_in_batch() {
        let processor = BatchProcessor::default();
        let result = processor
            .extract(&export(&["1,甲,TP838,0911,", "2,甲,TP838,0911,"]), "RFA-6.csv", &lookup())
            .unwrap();

        assert_eq!(result.records.len(), 2);
    }

    #[test]
    fn test_missing_column_is_named() {
        let processor = BatchProcessor::default();
        let bytes = "banner\n序,姓名,單位\n1,甲,TP838\n".as_bytes();

        let err = processor.extract(bytes, "RFA-7.csv", &lookup()).unwrap_err();
        match err {
            ReconcileError::MissingColumn { column, .. } => assert_eq!(column, PHONE_COLUMN),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_lookup_passes_units_through() {
        let processor = BatchProcessor::default();
        let result = processor
            .extract(&export(&["1,甲,富宅TP838,0911,"]), "RFA-8.csv", &LookupTable::new())
            .unwrap();

        assert_eq!(result.records[0].unit, "富宅TP838");
        assert_eq!(result.stats.outcomes.unmatched, 1);
    }

    #[test]
    fn test_record_serializes_with_column_names() {
        let json = serde_json::to_value(RegistrationRecord::new("TP838富宅", "王小明")).unwrap();

        assert_eq!(json["單位"], "TP838富宅");
        assert_eq!(json["姓名"], "王小明");
    }

    #[test]
    fn test_custom_cancel_markers() {
        let processor = BatchProcessor::new(vec!["退費".to_string()]);

        assert!(processor.is_cancelled("12退費"));
        assert!(!processor.is_cancelled("12取消"));
    }
}
