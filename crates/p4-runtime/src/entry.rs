//! Resolved, wire-ready table entries.
//!
//! This is the shape written to and read back from a device: every name has
//! been replaced by its P4Info id.

use crate::descriptor::FieldMatch;
use crate::ids::{ActionId, ActionParamId, MatchFieldId, TableId};
use crate::value::FieldValue;

/// One match field of a resolved entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldMatchEntry {
    pub field_id: MatchFieldId,
    pub value: FieldMatch,
}

/// One action parameter of a resolved entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionParamEntry {
    pub param_id: ActionParamId,
    pub value: FieldValue,
}

/// The action invoked by a resolved entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionEntry {
    pub action_id: ActionId,
    pub params: Vec<ActionParamEntry>,
}

/// A table entry as exchanged with the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableEntry {
    pub table_id: TableId,
    /// Sorted by field id.
    pub matches: Vec<FieldMatchEntry>,
    pub action: ActionEntry,
    /// 0 means "no priority" (exact/LPM tables).
    pub priority: i32,
}

/// Identity of an entry within a device: two entries with the same key
/// cannot coexist in one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub table_id: TableId,
    pub matches: Vec<FieldMatchEntry>,
    pub priority: i32,
}

impl TableEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            table_id: self.table_id,
            matches: self.matches.clone(),
            priority: self.priority,
        }
    }

    /// Looks up a match by field id.
    pub fn field(&self, field_id: MatchFieldId) -> Option<&FieldMatch> {
        self.matches
            .iter()
            .find(|m| m.field_id == field_id)
            .map(|m| &m.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(priority: i32, param: u64) -> TableEntry {
        TableEntry {
            table_id: TableId::new(1),
            matches: vec![FieldMatchEntry {
                field_id: MatchFieldId::new(1),
                value: FieldMatch::Exact {
                    value: FieldValue::from_u64(64),
                },
            }],
            action: ActionEntry {
                action_id: ActionId::new(2),
                params: vec![ActionParamEntry {
                    param_id: ActionParamId::new(1),
                    value: FieldValue::from_u64(param),
                }],
            },
            priority,
        }
    }

    #[test]
    fn test_key_ignores_action() {
        assert_eq!(entry(5, 1).key(), entry(5, 2).key());
        assert_ne!(entry(5, 1).key(), entry(4, 1).key());
    }

    #[test]
    fn test_field_lookup() {
        let e = entry(1, 1);
        assert!(e.field(MatchFieldId::new(1)).is_some());
        assert!(e.field(MatchFieldId::new(9)).is_none());
    }
}
