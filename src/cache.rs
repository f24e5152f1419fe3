// 🗂️ Reference Cache - build once per session, rebuild only on request
//
// The reference sheet does not change while the operator works, so the
// table is memoized by path. A failed load is memoized as well (as an empty
// table carrying the error) until someone asks for a reload.

use crate::error::ReconcileError;
use crate::reference::{ReferenceTable, ReferenceTableBuilder};
use crate::sheet::read_reference_rows;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

static GLOBAL: Lazy<ReferenceCache> = Lazy::new(ReferenceCache::new);

/// Process-wide cache shared by the CLI, TUI and server
pub fn global() -> &'static ReferenceCache {
    &GLOBAL
}

pub struct ReferenceCache {
    slot: Mutex<Option<(PathBuf, Arc<ReferenceTable>)>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        ReferenceCache {
            slot: Mutex::new(None),
        }
    }

    /// Cached table for `path`, building it on first use or when the path changes
    pub fn get_or_load(&self, path: &Path) -> Arc<ReferenceTable> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((cached_path, table)) = slot.as_ref() {
            if cached_path == path {
                return Arc::clone(table);
            }
        }

        let table = Arc::new(load_reference(path));
        *slot = Some((path.to_path_buf(), Arc::clone(&table)));
        table
    }

    /// Drop whatever is cached
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.take().is_some() {
            tracing::info!("reference cache invalidated");
        }
    }

    pub fn reload(&self, path: &Path) -> Arc<ReferenceTable> {
        self.invalidate();
        self.get_or_load(path)
    }
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and build, degrading to an empty table on any failure
pub fn load_reference(path: &Path) -> ReferenceTable {
    match try_load_reference(path) {
        Ok(table) => {
            tracing::info!(
                path = %path.display(),
                units = table.unit_count(),
                titles = table.title_count(),
                "reference table loaded"
            );
            table
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "reference table unavailable");
            ReferenceTable::unavailable(err.to_string())
        }
    }
}

fn try_load_reference(path: &Path) -> Result<ReferenceTable, ReconcileError> {
    let bytes = std::fs::read(path).map_err(|e| ReconcileError::ReferenceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let rows = read_reference_rows(path).map_err(|e| ReconcileError::ReferenceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut table = ReferenceTableBuilder::new().build(&rows);
    table.fingerprint = Some(fingerprint(&bytes));
    Ok(table)
}

/// Hex SHA-256 of the reference file contents
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_reference(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("ref.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_reference_from_csv() {
        let dir = TempDir::new().unwrap();
        let path = write_reference(&dir, "banner\n代碼,單位名稱\nTP838,富宅分處\n,資深處\n");

        let table = load_reference(&path);

        assert!(table.is_available());
        assert_eq!(table.entries.len(), 2);
        assert_eq!(table.lookup.get("TP838"), Some("富宅"));
        assert_eq!(table.fingerprint.as_ref().map(|f| f.len()), Some(64));
    }

    #[test]
    fn test_missing_reference_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let table = load_reference(&dir.path().join("nope.xlsx"));

        assert!(!table.is_available());
        assert!(table.entries.is_empty());
        assert!(table.lookup.is_empty());
        assert!(table.load_error.unwrap().contains("nope.xlsx"));
    }

    #[test]
    fn test_cache_memoizes_until_invalidated() {
        let dir = TempDir::new().unwrap();
        let path = write_reference(&dir, "代碼,單位名稱\nTP838,富宅\n");
        let cache = ReferenceCache::new();

        let first = cache.get_or_load(&path);

        // File edits are not picked up until an explicit reload
        std::fs::write(&path, "代碼,單位名稱\nTP838,富宅\nAB123,信義\n").unwrap();
        let second = cache.get_or_load(&path);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.unit_count(), 1);

        let reloaded = cache.reload(&path);
        assert_eq!(reloaded.unit_count(), 2);
        assert_ne!(first.fingerprint, reloaded.fingerprint);
    }

    #[test]
    fn test_failed_load_is_memoized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.csv");
        let cache = ReferenceCache::new();

        assert!(!cache.get_or_load(&path).is_available());

        std::fs::write(&path, "代碼,單位名稱\nTP838,富宅\n").unwrap();
        assert!(!cache.get_or_load(&path).is_available());
        assert!(cache.reload(&path).is_available());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }
}
