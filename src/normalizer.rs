// 🔤 Unit Normalizer - free text → canonical "CODE+NAME"
//
// Registration data spells the same unit many ways: bare code, bare name,
// name with the code glued on, stray spaces everywhere. First matching rule
// wins; when nothing matches the compacted input is returned as-is.

use crate::reference::{strip_all_whitespace, LookupTable};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 5-character code followed by anything: already canonical
static CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{5}.+").expect("static pattern"));

/// Exactly a 5-character code
static BARE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{5}$").expect("static pattern"));

/// A 5-character code anywhere in the string
static EMBEDDED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z0-9]{5}").expect("static pattern"));

/// Which rule produced the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormalizeOutcome {
    /// Nothing to normalize
    Empty,
    /// Already "CODE+suffix"
    AlreadyCanonical,
    /// Bare code, name appended
    FromCode,
    /// Bare name, code prepended
    FromName,
    /// Known code found inside the string
    Extracted,
    /// No rule applied
    Unmatched,
}

impl NormalizeOutcome {
    pub fn is_miss(&self) -> bool {
        *self == NormalizeOutcome::Unmatched
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub value: String,
    pub outcome: NormalizeOutcome,
}

/// Normalize one raw unit string. Never fails.
pub fn normalize(raw: &str, lookup: &LookupTable) -> String {
    normalize_with_outcome(raw, lookup).value
}

pub fn normalize_with_outcome(raw: &str, lookup: &LookupTable) -> Normalized {
    let compact = strip_all_whitespace(raw).to_uppercase();

    if compact.is_empty() {
        return Normalized {
            value: compact,
            outcome: NormalizeOutcome::Empty,
        };
    }

    if CANONICAL.is_match(&compact) {
        return Normalized {
            value: compact,
            outcome: NormalizeOutcome::AlreadyCanonical,
        };
    }

    if let Some(target) = lookup.get(&compact) {
        return if BARE_CODE.is_match(&compact) {
            Normalized {
                value: format!("{}{}", compact, target),
                outcome: NormalizeOutcome::FromCode,
            }
        } else {
            Normalized {
                value: format!("{}{}", target, compact),
                outcome: NormalizeOutcome::FromName,
            }
        };
    }

    if let Some(found) = EMBEDDED_CODE.find(&compact) {
        let code = found.as_str();
        if let Some(name) = lookup.get(code) {
            return Normalized {
                value: format!("{}{}", code, name),
                outcome: NormalizeOutcome::Extracted,
            };
        }
    }

    Normalized {
        value: compact,
        outcome: NormalizeOutcome::Unmatched,
    }
}

/// Normalizer bound to one lookup table
pub struct UnitNormalizer<'a> {
    lookup: &'a LookupTable,
}

impl<'a> UnitNormalizer<'a> {
    pub fn new(lookup: &'a LookupTable) -> Self {
        Self { lookup }
    }

    pub fn normalize(&self, raw: &str) -> Normalized {
        normalize_with_outcome(raw, self.lookup)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> LookupTable {
        vec![("TP838", "富宅"), ("AB123", "信義"), ("CD456", "高雄")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_empty_input_unchanged() {
        let result = normalize_with_outcome("", &lookup());
        assert_eq!(result.value, "");
        assert_eq!(result.outcome, NormalizeOutcome::Empty);

        assert_eq!(normalize(" \t ", &lookup()), "");
    }

    #[test]
    fn test_strips_inner_whitespace_and_uppercases() {
        let result = normalize_with_outcome(" tp 83 8 ", &lookup());

        assert_eq!(result.value, "TP838富宅");
        assert_eq!(result.outcome, NormalizeOutcome::FromCode);
    }

    #[test]
    fn test_already_canonical_passes_through() {
        let result = normalize_with_outcome("ZZ999隨便", &lookup());

        // No lookup is attempted once the shape matches
        assert_eq!(result.value, "ZZ999隨便");
        assert_eq!(result.outcome, NormalizeOutcome::AlreadyCanonical);
    }

    #[test]
    fn test_bare_code_gets_name_appended() {
        let lookup = lookup();
        assert_eq!(normalize("TP838", &lookup), "TP838富宅");
        assert_eq!(normalize("ab123", &lookup), "AB123信義");
    }

    #[test]
    fn test_bare_name_gets_code_prepended() {
        let result = normalize_with_outcome("富宅", &lookup());

        assert_eq!(result.value, "TP838富宅");
        assert_eq!(result.outcome, NormalizeOutcome::FromName);
    }

    #[test]
    fn test_embedded_code_extracted() {
        let result = normalize_with_outcome("富宅TP838", &lookup());

        assert_eq!(result.value, "TP838富宅");
        assert_eq!(result.outcome, NormalizeOutcome::Extracted);
    }

    #[test]
    fn test_prefix_plus_code_for_any_prefix() {
        let lookup = lookup();
        for prefix in ["北區", "第三", "資深處-", "ab-"] {
            let raw = format!("{}CD456", prefix);
            assert_eq!(normalize(&raw, &lookup), "CD456高雄", "prefix {}", prefix);
        }
    }

    #[test]
    fn test_unknown_embedded_code_is_a_miss() {
        let result = normalize_with_outcome("北區QQ111", &lookup());

        assert_eq!(result.value, "北區QQ111");
        assert!(result.outcome.is_miss());
    }

    #[test]
    fn test_unknown_name_is_a_miss() {
        let result = normalize_with_outcome("不存在 單位", &lookup());

        assert_eq!(result.value, "不存在單位");
        assert_eq!(result.outcome, NormalizeOutcome::Unmatched);
    }

    #[test]
    fn test_idempotent_on_canonical_output() {
        let lookup = lookup();
        for raw in ["TP838", "富宅", "富宅TP838", "ab123", "ZZ999隨便"] {
            let once = normalize(raw, &lookup);
            let twice = normalize(&once, &lookup);
            assert_eq!(once, twice, "input {}", raw);
        }
    }

    #[test]
    fn test_pairs_round_trip_through_lookup() {
        let pairs = [("TP838", "富宅"), ("AB123", "信義"), ("CD456", "高雄")];
        let lookup = lookup();

        for (code, name) in pairs {
            let canonical = format!("{}{}", code, name);
            assert_eq!(normalize(code, &lookup), canonical);
            assert_eq!(normalize(name, &lookup), canonical);
        }
    }

    #[test]
    fn test_bound_normalizer() {
        let lookup = lookup();
        let normalizer = UnitNormalizer::new(&lookup);

        assert_eq!(normalizer.normalize("信義").value, "AB123信義");
    }
}
