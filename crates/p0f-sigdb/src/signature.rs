//! Fingerprint signature types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Constraint on one fingerprint metadata field.
///
/// Deserialized from the shape of the JSON value:
///
/// | JSON | Constraint |
/// |------|------------|
/// | `64` | exact |
/// | `{"value": 64, "mask": 255}` | ternary |
/// | `{"value": 167772160, "prefix_len": 8}` | prefix |
/// | `{"low": 1, "high": 1460}` | range |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldConstraint {
    Ternary { value: u64, mask: u64 },
    Prefix { value: u64, prefix_len: u32 },
    Range { low: u64, high: u64 },
    Exact(u64),
}

impl fmt::Display for FieldConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldConstraint::Exact(v) => write!(f, "{}", v),
            FieldConstraint::Ternary { value, mask } => write!(f, "{:#x}&&&{:#x}", value, mask),
            FieldConstraint::Prefix { value, prefix_len } => write!(f, "{:#x}/{}", value, prefix_len),
            FieldConstraint::Range { low, high } => write!(f, "{}..{}", low, high),
        }
    }
}

/// One fingerprinting rule.
///
/// Its position in the source list is not stored here: sources hand out
/// signatures in order and the position determines the installed priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Classification result written by the action; unique within a source.
    pub label_id: u32,
    /// Structured label, e.g. `s:unix:Linux:3.11 and newer`.
    pub label: String,
    /// Action invoked on match.
    pub action: String,
    #[serde(default)]
    pub is_generic: bool,
    #[serde(default)]
    pub is_fuzzy: bool,
    /// Metadata field name (without namespace) to constraint.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldConstraint>,
    /// Action parameters beyond the classification result.
    #[serde(default)]
    pub extra_params: BTreeMap<String, u64>,
}

impl Signature {
    /// Returns true if the classification is intentionally broad or approximate.
    pub fn is_generic_or_fuzzy(&self) -> bool {
        self.is_generic || self.is_fuzzy
    }

    /// Short description used in install logs, e.g. `generic non-fuzzy`.
    pub fn kind_description(&self) -> String {
        format!(
            "{} {}",
            if self.is_generic { "generic" } else { "specific" },
            if self.is_fuzzy { "fuzzy" } else { "non-fuzzy" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constraint_shapes() {
        let parsed: BTreeMap<String, FieldConstraint> = serde_json::from_str(
            r#"{"a": 4, "b": {"value": 64, "mask": 255},
                "c": {"value": 10, "prefix_len": 8}, "d": {"low": 1, "high": 9}}"#,
        )
        .unwrap();
        assert_eq!(parsed["a"], FieldConstraint::Exact(4));
        assert_eq!(parsed["b"], FieldConstraint::Ternary { value: 64, mask: 255 });
        assert_eq!(parsed["c"], FieldConstraint::Prefix { value: 10, prefix_len: 8 });
        assert_eq!(parsed["d"], FieldConstraint::Range { low: 1, high: 9 });
    }

    #[test]
    fn test_kind_description() {
        let sig: Signature = serde_json::from_str(
            r#"{"label_id": 1, "label": "s:unix:Linux:3.x", "action": "a", "is_fuzzy": true}"#,
        )
        .unwrap();
        assert!(sig.is_generic_or_fuzzy());
        assert_eq!(sig.kind_description(), "specific fuzzy");
        assert!(sig.fields.is_empty());
    }
}
