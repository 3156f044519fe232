//! Transport-agnostic table entry descriptors.
//!
//! A [`TableEntryDescriptor`] names its table, fields, action and params
//! symbolically. It becomes a wire-ready [`TableEntry`](crate::TableEntry)
//! only after [`P4Info::build_table_entry`](crate::P4Info::build_table_entry)
//! resolves and validates it.

use crate::value::FieldValue;
use std::fmt;
use std::str::FromStr;

/// Match kind declared by P4Info for a match field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Exact,
    Lpm,
    Ternary,
    Range,
    Optional,
}

impl MatchKind {
    /// Returns true if tables with a field of this kind need an entry priority.
    pub fn requires_priority(&self) -> bool {
        matches!(self, MatchKind::Ternary | MatchKind::Range | MatchKind::Optional)
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchKind::Exact => "exact",
            MatchKind::Lpm => "lpm",
            MatchKind::Ternary => "ternary",
            MatchKind::Range => "range",
            MatchKind::Optional => "optional",
        };
        f.write_str(s)
    }
}

impl FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "EXACT" => Ok(MatchKind::Exact),
            "LPM" => Ok(MatchKind::Lpm),
            "TERNARY" => Ok(MatchKind::Ternary),
            "RANGE" => Ok(MatchKind::Range),
            "OPTIONAL" => Ok(MatchKind::Optional),
            _ => Err(format!("Unknown match kind: {}", s)),
        }
    }
}

/// Match value, tagged by match kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldMatch {
    Exact { value: FieldValue },
    Lpm { value: FieldValue, prefix_len: u32 },
    Ternary { value: FieldValue, mask: FieldValue },
    Range { low: FieldValue, high: FieldValue },
    Optional { value: FieldValue },
}

impl FieldMatch {
    pub fn kind(&self) -> MatchKind {
        match self {
            FieldMatch::Exact { .. } => MatchKind::Exact,
            FieldMatch::Lpm { .. } => MatchKind::Lpm,
            FieldMatch::Ternary { .. } => MatchKind::Ternary,
            FieldMatch::Range { .. } => MatchKind::Range,
            FieldMatch::Optional { .. } => MatchKind::Optional,
        }
    }
}

impl fmt::Display for FieldMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMatch::Exact { value } | FieldMatch::Optional { value } => write!(f, "{}", value),
            FieldMatch::Lpm { value, prefix_len } => write!(f, "{}/{}", value, prefix_len),
            FieldMatch::Ternary { value, mask } => write!(f, "{} &&& {}", value, mask),
            FieldMatch::Range { low, high } => write!(f, "{}..{}", low, high),
        }
    }
}

/// One named match clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchClause {
    pub field: String,
    pub value: FieldMatch,
}

impl MatchClause {
    pub fn new(field: impl Into<String>, value: FieldMatch) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// A named action with its parameters, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub name: String,
    pub params: Vec<(String, FieldValue)>,
}

impl ActionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Looks up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&FieldValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// The compiled, symbolic shape of a rule ready to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntryDescriptor {
    pub table: String,
    pub matches: Vec<MatchClause>,
    pub action: ActionCall,
    /// Required for ternary/range/optional tables, absent for exact/LPM tables.
    pub priority: Option<i32>,
}

impl TableEntryDescriptor {
    pub fn new(table: impl Into<String>, action: ActionCall) -> Self {
        Self {
            table: table.into(),
            matches: Vec::new(),
            action,
            priority: None,
        }
    }

    pub fn with_match(mut self, field: impl Into<String>, value: FieldMatch) -> Self {
        self.matches.push(MatchClause::new(field, value));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

impl fmt::Display for TableEntryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.table)?;
        for (i, clause) in self.matches.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", clause.field, clause.value)?;
        }
        write!(f, "] -> {}(", self.action.name)?;
        for (i, (name, value)) in self.action.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str(")")?;
        if let Some(priority) = self.priority {
            write!(f, " priority {}", priority)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_kind_parse() {
        assert_eq!("LPM".parse::<MatchKind>().unwrap(), MatchKind::Lpm);
        assert_eq!("ternary".parse::<MatchKind>().unwrap(), MatchKind::Ternary);
        assert!("UNSPECIFIED".parse::<MatchKind>().is_err());
        assert!(MatchKind::Range.requires_priority());
        assert!(!MatchKind::Lpm.requires_priority());
    }

    #[test]
    fn test_descriptor_display() {
        let desc = TableEntryDescriptor::new(
            "MyIngress.ipv4_lpm",
            ActionCall::new("MyIngress.ipv4_forward").with_param("port", 3u64),
        )
        .with_match(
            "hdr.ipv4.dstAddr",
            FieldMatch::Lpm {
                value: FieldValue::from_u64(0x0a00_0303),
                prefix_len: 32,
            },
        );
        assert_eq!(
            desc.to_string(),
            "MyIngress.ipv4_lpm [hdr.ipv4.dstAddr=0x0a000303/32] -> MyIngress.ipv4_forward(port=0x03)"
        );
    }

    #[test]
    fn test_action_param_lookup() {
        let action = ActionCall::new("a").with_param("result", 7u64);
        assert_eq!(action.param("result").and_then(|v| v.to_u64()), Some(7));
        assert!(action.param("missing").is_none());
    }
}
