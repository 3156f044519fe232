//! Rule compiler.
//!
//! Pure translation between domain objects and table entries:
//!
//! - [`compile_route`]: a static route becomes an LPM entry on the
//!   destination address
//! - [`compile_signature`]: a fingerprint signature becomes a prioritized
//!   entry on the fingerprint metadata fields
//! - [`decode_entry`]: an entry read back from a device becomes a printable
//!   [`DisplayRecord`]
//!
//! Signature priority is `total - ordinal` for a 0-based ordinal, so the
//! first of `n` signatures gets `n` and the last gets `1`. Earlier signatures
//! always win when several entries match the same packet.

use crate::config::{RouteRule, TablesConfig};
use crate::error::{ControllerError, Result};
use p0f_sigdb::{FieldConstraint, Signature};
use p4_runtime::{
    ActionCall, FieldMatch, FieldValue, MatchKind, P4Info, P4rtResult, TableEntry,
    TableEntryDescriptor,
};
use p4_types::{Ipv4Prefix, MacAddress};
use std::fmt;

/// Action parameter carrying the signature's label id.
pub const RESULT_PARAM: &str = "result";

/// Action parameter flagging a generic or fuzzy signature.
pub const GENERIC_FUZZY_PARAM: &str = "is_generic_fuzzy";

/// Compiles one side of a host route.
///
/// A bare destination address is a /32 host route.
pub fn compile_route(rule: &RouteRule, tables: &TablesConfig) -> Result<TableEntryDescriptor> {
    let context = format!("{} route on {}", rule.side, rule.device);
    let dst: Ipv4Prefix = rule
        .dst_ip
        .parse()
        .map_err(|e| ControllerError::validation(&context, format!("{}", e)))?;
    let dst_mac: MacAddress = rule
        .dst_mac
        .parse()
        .map_err(|e| ControllerError::validation(&context, format!("{}", e)))?;

    let action = ActionCall::new(&tables.route_action)
        .with_param(&tables.route_mac_param, dst_mac)
        .with_param(&tables.route_port_param, u64::from(rule.port));

    Ok(TableEntryDescriptor::new(&tables.route_table, action).with_match(
        &tables.route_match_field,
        FieldMatch::Lpm {
            value: FieldValue::from(dst.network()),
            prefix_len: u32::from(dst.prefix_len()),
        },
    ))
}

/// Priority of the signature at `ordinal` (0-based) among `total`.
pub fn signature_priority(ordinal: usize, total: usize) -> Result<i32> {
    if ordinal >= total {
        return Err(ControllerError::validation(
            "signature ordinal",
            format!("{} is out of range for {} signatures", ordinal, total),
        ));
    }
    i32::try_from(total - ordinal).map_err(|_| {
        ControllerError::validation(
            "signature list",
            format!("{} signatures exceed the priority range", total),
        )
    })
}

fn constraint_to_match(constraint: &FieldConstraint) -> FieldMatch {
    match *constraint {
        FieldConstraint::Exact(value) => FieldMatch::Exact {
            value: FieldValue::from_u64(value),
        },
        FieldConstraint::Ternary { value, mask } => FieldMatch::Ternary {
            value: FieldValue::from_u64(value),
            mask: FieldValue::from_u64(mask),
        },
        FieldConstraint::Prefix { value, prefix_len } => FieldMatch::Lpm {
            value: FieldValue::from_u64(value),
            prefix_len,
        },
        FieldConstraint::Range { low, high } => FieldMatch::Range {
            low: FieldValue::from_u64(low),
            high: FieldValue::from_u64(high),
        },
    }
}

/// Compiles the signature at `ordinal` (0-based) of `total`.
pub fn compile_signature(
    signature: &Signature,
    ordinal: usize,
    total: usize,
    tables: &TablesConfig,
) -> Result<TableEntryDescriptor> {
    let priority = signature_priority(ordinal, total)?;

    let mut action = ActionCall::new(&signature.action)
        .with_param(RESULT_PARAM, u64::from(signature.label_id))
        .with_param(
            GENERIC_FUZZY_PARAM,
            FieldValue::from_bool(signature.is_generic_or_fuzzy()),
        );
    for (name, value) in &signature.extra_params {
        if name == RESULT_PARAM || name == GENERIC_FUZZY_PARAM {
            return Err(ControllerError::validation(
                format!("signature {} ({})", signature.label_id, signature.label),
                format!("extra parameter '{}' collides with a fixed parameter", name),
            ));
        }
        action = action.with_param(name, *value);
    }

    let mut desc = TableEntryDescriptor::new(&tables.signature_table, action).with_priority(priority);
    for (name, constraint) in &signature.fields {
        desc = desc.with_match(
            format!("{}{}", tables.signature_field_prefix, name),
            constraint_to_match(constraint),
        );
    }
    Ok(desc)
}

/// One match clause of a decoded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMatch {
    pub field: String,
    pub kind: MatchKind,
    pub value: FieldMatch,
}

/// Human-readable form of an installed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRecord {
    pub table: String,
    pub matches: Vec<DisplayMatch>,
    pub action: String,
    pub params: Vec<(String, FieldValue)>,
    pub priority: Option<i32>,
}

impl DisplayRecord {
    pub fn param(&self, name: &str) -> Option<&FieldValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn field(&self, name: &str) -> Option<&FieldMatch> {
        self.matches.iter().find(|m| m.field == name).map(|m| &m.value)
    }
}

impl fmt::Display for DisplayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "table_name: {}", self.table)?;
        if let Some(priority) = self.priority {
            writeln!(f, "priority: {}", priority)?;
        }
        writeln!(f, "match {{")?;
        for m in &self.matches {
            writeln!(f, "  field_name: {}", m.field)?;
            writeln!(f, "  {} {{", m.kind)?;
            writeln!(f, "    value: {}", m.value)?;
            writeln!(f, "  }}")?;
        }
        writeln!(f, "}}")?;
        writeln!(f, "action {{")?;
        writeln!(f, "  action_name: {}", self.action)?;
        for (name, value) in &self.params {
            writeln!(f, "  params {{")?;
            writeln!(f, "    param_name: {}", name)?;
            writeln!(f, "    value: {}", value)?;
            writeln!(f, "  }}")?;
        }
        write!(f, "}}")
    }
}

/// Resolves an entry's ids back to names.
pub fn decode_entry(entry: &TableEntry, schema: &P4Info) -> P4rtResult<DisplayRecord> {
    let table = schema.table_name(entry.table_id)?;
    let matches = entry
        .matches
        .iter()
        .map(|m| {
            Ok(DisplayMatch {
                field: schema.match_field_name(table, m.field_id)?.to_string(),
                kind: m.value.kind(),
                value: m.value.clone(),
            })
        })
        .collect::<P4rtResult<Vec<_>>>()?;

    let action = schema.action_name(entry.action.action_id)?;
    let params = entry
        .action
        .params
        .iter()
        .map(|p| {
            Ok((
                schema.action_param_name(action, p.param_id)?.to_string(),
                p.value.clone(),
            ))
        })
        .collect::<P4rtResult<Vec<_>>>()?;

    Ok(DisplayRecord {
        table: table.to_string(),
        matches,
        action: action.to_string(),
        params,
        priority: (entry.priority != 0).then_some(entry.priority),
    })
}
