// 📚 Reference Table - canonical unit list + bidirectional code↔name lookup
//
// The reference sheet mixes two kinds of rows in the same two columns:
// real units (5-character code + name) and section headings kept only to
// preserve the organizational display order. Both land in the ordered
// list; only units feed the lookup table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Column holding the unit code
pub const CODE_COLUMN: &str = "代碼";

/// Column holding the unit name
pub const NAME_COLUMN: &str = "單位名稱";

/// Unit codes are exactly this many characters
pub const CODE_LEN: usize = 5;

/// Section headings are cut to this many characters for display
pub const TITLE_WIDTH: usize = 4;

/// Cell values that mean "nothing here" (compared uppercased)
const PLACEHOLDERS: [&str; 5] = ["", "NAN", "NONE", CODE_COLUMN, NAME_COLUMN];

/// Office boilerplate stripped from unit names, applied in order
const NAME_BOILERPLATE: [&str; 5] = ["通訊處", "通訊", "一分處", "ㄧ分處", "分處"];

// ============================================================================
// LOOKUP TABLE
// ============================================================================

/// Code → name and name → code in one map.
///
/// Codes are 5-character uppercase keys, names never have that shape in
/// practice; `data_quality::validate_reference` flags the cases where they do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    entries: HashMap<String, String>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert both directions. Later pairs overwrite earlier keys.
    pub fn insert_pair(&mut self, code: &str, name: &str) {
        self.entries.insert(code.to_string(), name.to_string());
        if !name.is_empty() {
            self.entries.insert(name.to_string(), code.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LookupTable {
    /// Builds from code/name pairs, inserting each symmetrically
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = LookupTable::new();
        for (code, name) in iter {
            table.insert_pair(&code.into(), &name.into());
        }
        table
    }
}

// ============================================================================
// REFERENCE ENTRY
// ============================================================================

/// One row of the canonical ordered list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// "CODE+NAME" for units, the truncated heading for titles
    pub display_text: String,

    /// false for section headings, which never get a count
    pub is_unit: bool,
}

impl ReferenceEntry {
    pub fn unit(code: &str, name: &str) -> Self {
        ReferenceEntry {
            display_text: format!("{}{}", code, name),
            is_unit: true,
        }
    }

    pub fn title(text: &str) -> Self {
        ReferenceEntry {
            display_text: text.chars().take(TITLE_WIDTH).collect(),
            is_unit: false,
        }
    }
}

/// A unit row as registered, kept for auditing the reference sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRow {
    /// 0-based index into the raw rows handed to the builder
    pub row: usize,
    pub code: String,
    pub name: String,
}

/// A raw reference row; `None` is an empty cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub code: Option<String>,
    pub name: Option<String>,
}

impl ReferenceRow {
    pub fn new(code: &str, name: &str) -> Self {
        ReferenceRow {
            code: Some(code.to_string()),
            name: Some(name.to_string()),
        }
    }
}

// ============================================================================
// REFERENCE TABLE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceTable {
    /// Reference order, verbatim
    pub entries: Vec<ReferenceEntry>,
    pub lookup: LookupTable,
    pub units: Vec<UnitRow>,

    /// SHA-256 of the file the table was built from
    pub fingerprint: Option<String>,

    /// Set when the sheet could not be read; the table is then empty
    pub load_error: Option<String>,
}

impl ReferenceTable {
    /// Empty table standing in for an unreadable reference sheet
    pub fn unavailable(reason: String) -> Self {
        ReferenceTable {
            load_error: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_available(&self) -> bool {
        self.load_error.is_none()
    }

    pub fn unit_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_unit).count()
    }

    pub fn title_count(&self) -> usize {
        self.entries.len() - self.unit_count()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct ReferenceTableBuilder {
    boilerplate: Vec<String>,
}

impl ReferenceTableBuilder {
    pub fn new() -> Self {
        ReferenceTableBuilder {
            boilerplate: NAME_BOILERPLATE.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Walk the rows in order, classifying each as unit, title, or noise
    pub fn build(&self, rows: &[ReferenceRow]) -> ReferenceTable {
        let mut table = ReferenceTable::default();

        for (index, row) in rows.iter().enumerate() {
            let code = strip_all_whitespace(row.code.as_deref().unwrap_or("")).to_uppercase();
            let name = strip_all_whitespace(row.name.as_deref().unwrap_or(""));

            if is_placeholder(&code) && is_placeholder(&name) {
                continue;
            }

            if code.chars().count() == CODE_LEN && !is_placeholder(&code) {
                let clean_name = if is_placeholder(&name) {
                    String::new()
                } else {
                    self.strip_boilerplate(&name)
                };

                table.lookup.insert_pair(&code, &clean_name);
                table.entries.push(ReferenceEntry::unit(&code, &clean_name));
                table.units.push(UnitRow {
                    row: index,
                    code,
                    name: clean_name,
                });
            } else {
                let title_text = if !is_placeholder(&name) { &name } else { &code };
                table.entries.push(ReferenceEntry::title(title_text));
            }
        }

        tracing::debug!(
            entries = table.entries.len(),
            units = table.units.len(),
            keys = table.lookup.len(),
            "reference table built"
        );

        table
    }

    fn strip_boilerplate(&self, name: &str) -> String {
        self.boilerplate
            .iter()
            .fold(name.to_string(), |acc, word| acc.replace(word.as_str(), ""))
    }
}

impl Default for ReferenceTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_placeholder(value: &str) -> bool {
    let upper = value.to_uppercase();
    PLACEHOLDERS.contains(&upper.as_str())
}

/// Removes every whitespace character, not just the ends
pub fn strip_all_whitespace(value: &str) -> String {
    value.split_whitespace().collect()
}

// ============================================================================
// TESTS
// ============================================================================
