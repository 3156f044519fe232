//! P4Info schema resolver.
//!
//! Loads the JSON rendering of a compiled program's P4Info and provides the
//! two directions the controller needs:
//!
//! - names to ids, with validation, when building entries to write
//!   ([`P4Info::build_table_entry`]);
//! - ids to names when rendering entries read back from a device
//!   ([`P4Info::table_name`], [`P4Info::match_field_name`], ...).

use crate::descriptor::{FieldMatch, MatchKind, TableEntryDescriptor};
use crate::entry::{ActionEntry, ActionParamEntry, FieldMatchEntry, TableEntry};
use crate::error::{P4rtError, P4rtResult};
use crate::ids::{
    ActionId, ActionParamId, MatchFieldId, P4Id, P4ObjectKind, TableId,
};
use crate::value::FieldValue;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Common header of P4Info objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "")]
pub struct Preamble<K: P4ObjectKind> {
    pub id: P4Id<K>,
    pub name: String,
    #[serde(default)]
    pub alias: String,
}

impl<K: P4ObjectKind> Preamble<K> {
    fn matches(&self, name: &str) -> bool {
        self.name == name || (!self.alias.is_empty() && self.alias == name)
    }
}

/// A match field declared by a table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFieldInfo {
    pub id: MatchFieldId,
    pub name: String,
    pub bitwidth: u32,
    #[serde(deserialize_with = "deserialize_match_kind")]
    pub match_type: MatchKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionRef {
    pub id: ActionId,
}

/// A table declared by the program.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub preamble: Preamble<crate::ids::TableKind>,
    #[serde(default)]
    pub match_fields: Vec<MatchFieldInfo>,
    #[serde(default)]
    pub action_refs: Vec<ActionRef>,
}

impl TableInfo {
    pub fn match_field(&self, name: &str) -> P4rtResult<&MatchFieldInfo> {
        self.match_fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                P4rtError::unknown_name("match field", format!("{}.{}", self.preamble.name, name))
            })
    }

    pub fn match_field_by_id(&self, id: MatchFieldId) -> P4rtResult<&MatchFieldInfo> {
        self.match_fields
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| {
                P4rtError::unknown_name("match field", format!("{}#{}", self.preamble.name, id))
            })
    }

    /// Returns true if entries of this table must carry a priority.
    pub fn requires_priority(&self) -> bool {
        self.match_fields
            .iter()
            .any(|f| f.match_type.requires_priority())
    }

    pub fn allows_action(&self, id: ActionId) -> bool {
        self.action_refs.iter().any(|r| r.id == id)
    }
}

/// An action parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamInfo {
    pub id: ActionParamId,
    pub name: String,
    pub bitwidth: u32,
}

/// An action declared by the program.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionInfo {
    pub preamble: Preamble<crate::ids::ActionKind>,
    #[serde(default)]
    pub params: Vec<ParamInfo>,
}

impl ActionInfo {
    pub fn param(&self, name: &str) -> P4rtResult<&ParamInfo> {
        self.params.iter().find(|p| p.name == name).ok_or_else(|| {
            P4rtError::unknown_name("action param", format!("{}.{}", self.preamble.name, name))
        })
    }

    pub fn param_by_id(&self, id: ActionParamId) -> P4rtResult<&ParamInfo> {
        self.params.iter().find(|p| p.id == id).ok_or_else(|| {
            P4rtError::unknown_name("action param", format!("{}#{}", self.preamble.name, id))
        })
    }
}

/// A loaded P4Info document.
#[derive(Debug, Clone, Deserialize)]
pub struct P4Info {
    #[serde(default)]
    tables: Vec<TableInfo>,
    #[serde(default)]
    actions: Vec<ActionInfo>,
}

fn deserialize_match_kind<'de, D>(deserializer: D) -> Result<MatchKind, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl P4Info {
    /// Parses a P4Info document in JSON form.
    pub fn from_json_str(json: &str) -> P4rtResult<Self> {
        let info: P4Info =
            serde_json::from_str(json).map_err(|e| P4rtError::schema(e.to_string()))?;
        debug!(
            tables = info.tables.len(),
            actions = info.actions.len(),
            "Loaded P4Info"
        );
        Ok(info)
    }

    /// Reads and parses a P4Info JSON file.
    pub fn load(path: impl AsRef<Path>) -> P4rtResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| P4rtError::schema(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn actions(&self) -> &[ActionInfo] {
        &self.actions
    }

    /// Looks up a table by full name or alias.
    pub fn table(&self, name: &str) -> P4rtResult<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.preamble.matches(name))
            .ok_or_else(|| P4rtError::unknown_name("table", name))
    }

    pub fn table_by_id(&self, id: TableId) -> P4rtResult<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.preamble.id == id)
            .ok_or_else(|| P4rtError::unknown_name("table", id.to_string()))
    }

    /// Looks up an action by full name or alias.
    pub fn action(&self, name: &str) -> P4rtResult<&ActionInfo> {
        self.actions
            .iter()
            .find(|a| a.preamble.matches(name))
            .ok_or_else(|| P4rtError::unknown_name("action", name))
    }

    pub fn action_by_id(&self, id: ActionId) -> P4rtResult<&ActionInfo> {
        self.actions
            .iter()
            .find(|a| a.preamble.id == id)
            .ok_or_else(|| P4rtError::unknown_name("action", id.to_string()))
    }

    pub fn table_name(&self, id: TableId) -> P4rtResult<&str> {
        Ok(&self.table_by_id(id)?.preamble.name)
    }

    pub fn action_name(&self, id: ActionId) -> P4rtResult<&str> {
        Ok(&self.action_by_id(id)?.preamble.name)
    }

    pub fn match_field_name(&self, table: &str, id: MatchFieldId) -> P4rtResult<&str> {
        Ok(&self.table(table)?.match_field_by_id(id)?.name)
    }

    pub fn action_param_name(&self, action: &str, id: ActionParamId) -> P4rtResult<&str> {
        Ok(&self.action(action)?.param_by_id(id)?.name)
    }

    /// Resolves a descriptor into a wire-ready entry.
    ///
    /// Checks every name against the schema, the match kind of every clause
    /// against the field's declared kind, every value against its bitwidth,
    /// that the action belongs to the table and receives exactly its declared
    /// parameters, and that a priority is given iff the table needs one.
    pub fn build_table_entry(&self, desc: &TableEntryDescriptor) -> P4rtResult<TableEntry> {
        let table = self.table(&desc.table)?;
        let context = table.preamble.name.as_str();

        let mut seen = HashSet::new();
        let mut matches = Vec::with_capacity(desc.matches.len());
        for clause in &desc.matches {
            let field = table.match_field(&clause.field)?;
            if !seen.insert(field.id) {
                return Err(P4rtError::invalid_entry(
                    context,
                    format!("field {} matched more than once", field.name),
                ));
            }
            if clause.value.kind() != field.match_type {
                return Err(P4rtError::invalid_entry(
                    context,
                    format!(
                        "field {} is {} but a {} match was given",
                        field.name,
                        field.match_type,
                        clause.value.kind()
                    ),
                ));
            }
            let value = encode_match(field, &clause.value)
                .map_err(|message| P4rtError::invalid_entry(context, message))?;
            matches.push(FieldMatchEntry {
                field_id: field.id,
                value,
            });
        }
        matches.sort_by_key(|m| m.field_id);

        let action = self.action(&desc.action.name)?;
        if !table.allows_action(action.preamble.id) {
            return Err(P4rtError::invalid_entry(
                context,
                format!("action {} is not permitted", action.preamble.name),
            ));
        }
        for (name, _) in &desc.action.params {
            action.param(name)?;
        }
        let mut params = Vec::with_capacity(action.params.len());
        for param in &action.params {
            let mut supplied = desc.action.params.iter().filter(|(n, _)| n == &param.name);
            let value = match (supplied.next(), supplied.next()) {
                (Some((_, value)), None) => value,
                (None, _) => {
                    return Err(P4rtError::invalid_entry(
                        context,
                        format!("missing parameter {} for {}", param.name, action.preamble.name),
                    ))
                }
                (Some(_), Some(_)) => {
                    return Err(P4rtError::invalid_entry(
                        context,
                        format!("parameter {} supplied more than once", param.name),
                    ))
                }
            };
            if !value.fits(param.bitwidth) {
                return Err(P4rtError::invalid_entry(
                    context,
                    format!(
                        "value {} does not fit {}-bit parameter {}",
                        value, param.bitwidth, param.name
                    ),
                ));
            }
            params.push(ActionParamEntry {
                param_id: param.id,
                value: value.clone(),
            });
        }

        let priority = match (table.requires_priority(), desc.priority) {
            (true, Some(p)) if p > 0 => p,
            (true, Some(p)) => {
                return Err(P4rtError::invalid_entry(
                    context,
                    format!("priority must be positive, got {}", p),
                ))
            }
            (true, None) => {
                return Err(P4rtError::invalid_entry(context, "priority is required"))
            }
            (false, Some(p)) => {
                return Err(P4rtError::invalid_entry(
                    context,
                    format!("priority {} given for a table without ternary/range fields", p),
                ))
            }
            (false, None) => 0,
        };

        Ok(TableEntry {
            table_id: table.preamble.id,
            matches,
            action: ActionEntry {
                action_id: action.preamble.id,
                params,
            },
            priority,
        })
    }
}

fn check_fits(field: &MatchFieldInfo, value: &FieldValue) -> Result<(), String> {
    if value.fits(field.bitwidth) {
        Ok(())
    } else {
        Err(format!(
            "value {} does not fit {}-bit field {}",
            value, field.bitwidth, field.name
        ))
    }
}

/// Numeric comparison of canonical values: a longer canonical form is larger.
fn numeric_le(a: &FieldValue, b: &FieldValue) -> bool {
    (a.as_bytes().len(), a.as_bytes()) <= (b.as_bytes().len(), b.as_bytes())
}

fn encode_match(field: &MatchFieldInfo, m: &FieldMatch) -> Result<FieldMatch, String> {
    match m {
        FieldMatch::Exact { value } => {
            check_fits(field, value)?;
            Ok(m.clone())
        }
        FieldMatch::Optional { value } => {
            check_fits(field, value)?;
            Ok(m.clone())
        }
        FieldMatch::Lpm { value, prefix_len } => {
            check_fits(field, value)?;
            if *prefix_len > field.bitwidth {
                return Err(format!(
                    "prefix length {} exceeds {}-bit field {}",
                    prefix_len, field.bitwidth, field.name
                ));
            }
            Ok(FieldMatch::Lpm {
                value: value.mask_prefix(*prefix_len, field.bitwidth),
                prefix_len: *prefix_len,
            })
        }
        FieldMatch::Ternary { value, mask } => {
            check_fits(field, value)?;
            check_fits(field, mask)?;
            Ok(FieldMatch::Ternary {
                value: value.and(mask),
                mask: mask.clone(),
            })
        }
        FieldMatch::Range { low, high } => {
            check_fits(field, low)?;
            check_fits(field, high)?;
            if !numeric_le(low, high) {
                return Err(format!(
                    "range {}..{} on field {} is empty",
                    low, high, field.name
                ));
            }
            Ok(m.clone())
        }
    }
}
