// ⚙️ Configuration - fixed defaults, optional TOML override
//
// Every path is a constant; the only override is a TOML file at a fixed
// location. No CLI flags, no environment variables.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the optional override file lives
pub const CONFIG_FILE: &str = "reconciler.toml";

pub const DEFAULT_REFERENCE_PATH: &str = "FB11407F通訊處20260101.xlsx";
pub const DEFAULT_MASTER_ROSTER_PATH: &str = "master_data.csv";
pub const DEFAULT_DATA_DIRECTORY: &str = "data";
pub const DEFAULT_IMPORT_PREFIX: &str = "RFA-";
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "output";
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:3000";

/// Sequence-field markers for cancelled / transferred registrations
pub const DEFAULT_CANCEL_MARKERS: [&str; 3] = ["取消", "轉班", "轉席"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reference sheet (.xlsx, or .csv with the same columns)
    pub reference_path: PathBuf,

    /// Persisted master roster (flat CSV)
    pub master_roster_path: PathBuf,

    /// Folder scanned by `import`
    pub data_directory: PathBuf,

    /// File-name prefix for `import` (files must also end in .csv)
    pub import_prefix: String,

    /// Where `import` writes the report workbook
    pub output_directory: PathBuf,

    pub cancel_markers: Vec<String>,

    /// Surface units that matched nothing in the reference list
    pub report_unmatched: bool,

    pub server_addr: String,

    /// tracing filter directive, e.g. "info" or "registration_reconciler=debug"
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from(DEFAULT_REFERENCE_PATH),
            master_roster_path: PathBuf::from(DEFAULT_MASTER_ROSTER_PATH),
            data_directory: PathBuf::from(DEFAULT_DATA_DIRECTORY),
            import_prefix: DEFAULT_IMPORT_PREFIX.to_string(),
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            cancel_markers: DEFAULT_CANCEL_MARKERS.iter().map(|m| m.to_string()).collect(),
            report_unmatched: true,
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        toml::from_str(&content)
            .map_err(|e| ReconcileError::Config(format!("{}: {}", file_path.display(), e)))
    }

    /// Defaults when the file is absent; a malformed file is still an error
    pub fn load_or_default(file_path: &Path) -> Result<Self> {
        if file_path.exists() {
            Self::load_from_file(file_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, file_path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ReconcileError::Config(e.to_string()))?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Does this file name belong to a batch import?
    pub fn is_import_file(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.import_prefix) && file_name.to_lowercase().ends_with(".csv")
    }
}
