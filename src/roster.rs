// 🗃️ Master Roster - deduplicated accumulation of every merged batch
//
// Uniqueness key is (unit, name). On conflict the most recently merged row
// wins and takes the later position, the way a "keep last" drop-duplicates
// does. Persistence is a flat CSV rewritten in full after each merge.
//
// Known limitation: the read-modify-write below assumes a single writer.
// Two processes merging into the same file at once can lose a batch.

use crate::batch::RegistrationRecord;
use crate::error::Result;
use crate::sheet::strip_bom;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// MASTER ROSTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRoster {
    records: Vec<RegistrationRecord>,
}

impl MasterRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows that may contain duplicates
    pub fn from_records(records: Vec<RegistrationRecord>) -> Self {
        MasterRoster {
            records: dedup_keep_last(records),
        }
    }

    pub fn records(&self) -> &[RegistrationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Union with a batch, last write wins. Leaves `self` untouched.
    pub fn merged_with(&self, batch: &[RegistrationRecord]) -> MasterRoster {
        let mut combined = Vec::with_capacity(self.records.len() + batch.len());
        combined.extend_from_slice(&self.records);
        combined.extend_from_slice(batch);
        MasterRoster::from_records(combined)
    }
}

/// Keep the last occurrence of each (unit, name), in the order those
/// last occurrences appear
fn dedup_keep_last(records: Vec<RegistrationRecord>) -> Vec<RegistrationRecord> {
    let keep: Vec<bool> = {
        let mut last_index: HashMap<(&str, &str), usize> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            last_index.insert(record.key(), i);
        }
        records
            .iter()
            .enumerate()
            .map(|(i, record)| last_index.get(&record.key()) == Some(&i))
            .collect()
    };

    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, keep)| keep.then_some(record))
        .collect()
}

// ============================================================================
// MERGE OUTCOME
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub roster: MasterRoster,
    pub before: usize,
    pub batch_size: usize,
    pub merged_at: chrono::DateTime<chrono::Utc>,
}

impl MergeOutcome {
    pub fn after(&self) -> usize {
        self.roster.len()
    }

    pub fn added(&self) -> usize {
        self.after() - self.before
    }

    /// Batch rows that replaced an existing entry (or each other)
    pub fn duplicates(&self) -> usize {
        self.before + self.batch_size - self.after()
    }

    pub fn summary(&self) -> String {
        format!(
            "Merged {} rows: {} → {} registrants ({} new, {} duplicates)",
            self.batch_size,
            self.before,
            self.after(),
            self.added(),
            self.duplicates()
        )
    }
}

// ============================================================================
// ROSTER STORE
// ============================================================================

/// The roster's flat file; the only writer of it
pub struct RosterStore {
    path: PathBuf,
}

impl RosterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RosterStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the roster; a missing file is an empty roster
    pub fn load(&self) -> Result<MasterRoster> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no roster file yet, starting empty");
            return Ok(MasterRoster::new());
        }

        let bytes = std::fs::read(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(strip_bom(&bytes));

        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: RegistrationRecord = result?;
            records.push(record);
        }

        let roster = MasterRoster::from_records(records);
        tracing::info!(path = %self.path.display(), registrants = roster.len(), "roster loaded");
        Ok(roster)
    }

    /// Overwrite the file with `roster`
    pub fn save(&self, roster: &MasterRoster) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(UTF8_BOM)?;

        let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
        for record in roster.records() {
            writer.serialize(record)?;
        }
        writer.flush()?;

        tracing::info!(path = %self.path.display(), registrants = roster.len(), "roster written");
        Ok(())
    }

    /// Read current file, union with the batch, dedupe, write back.
    ///
    /// On error nothing is returned, so the caller's view stays the old one.
    pub fn merge_and_save(&self, batch: &[RegistrationRecord]) -> Result<MergeOutcome> {
        let current = self.load()?;
        let merged = current.merged_with(batch);

        self.save(&merged).map_err(|err| {
            tracing::error!(path = %self.path.display(), error = %err, "roster write failed");
            err
        })?;

        let outcome = MergeOutcome {
            before: current.len(),
            batch_size: batch.len(),
            roster: merged,
            merged_at: chrono::Utc::now(),
        };
        tracing::info!("{}", outcome.summary());
        Ok(outcome)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(unit: &str, name: &str) -> RegistrationRecord {
        RegistrationRecord::new(unit, name)
    }

    #[test]
    fn test_merge_deduplicates_keep_last_position() {
        let roster = MasterRoster::from_records(vec![record("A", "甲"), record("B", "乙")]);
        let merged = roster.merged_with(&[record("A", "甲"), record("C", "丙")]);

        assert_eq!(
            merged.records(),
            &[record("B", "乙"), record("A", "甲"), record("C", "丙")]
        );
        // Original untouched
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_merging_same_batch_twice_is_idempotent() {
        let batch = vec![record("A", "甲"), record("B", "乙"), record("A", "甲")];
        let once = MasterRoster::new().merged_with(&batch);
        let twice = once.merged_with(&batch);

        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_same_name_different_unit_kept() {
        let roster = MasterRoster::new().merged_with(&[record("A", "甲"), record("B", "甲")]);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = RosterStore::new(dir.path().join("master_data.csv"));

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_store_round_trip_with_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master_data.csv");
        let store = RosterStore::new(&path);

        let roster = MasterRoster::from_records(vec![record("TP838富宅", "王小明"), record("神秘", "")]);
        store.save(&roster).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert!(text.starts_with("單位,姓名"));

        assert_eq!(store.load().unwrap(), roster);
    }

    #[test]
    fn test_merge_and_save_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let store = RosterStore::new(dir.path().join("master_data.csv"));

        let first = store.merge_and_save(&[record("A", "甲"), record("B", "乙")]).unwrap();
        assert_eq!(first.added(), 2);

        let second = store.merge_and_save(&[record("B", "乙"), record("C", "丙")]).unwrap();
        assert_eq!(second.before, 2);
        assert_eq!(second.after(), 3);
        assert_eq!(second.duplicates(), 1);

        assert_eq!(store.load().unwrap().len(), 3);
        println!("✅ {}", second.summary());
    }

    #[test]
    fn test_merge_and_save_write_failure_is_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the write fail
        let path = dir.path().join("roster_dir");
        std::fs::create_dir(&path).unwrap();
        let store = RosterStore::new(&path);

        assert!(store.merge_and_save(&[record("A", "甲")]).is_err());
    }
}
