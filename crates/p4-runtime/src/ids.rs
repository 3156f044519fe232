//! Type-safe P4Info numeric ids.
//!
//! P4Info assigns a `u32` id to every table, action, match field and action
//! parameter. These wrappers keep the kinds apart so a match-field id can never
//! be passed where a table id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw P4Info id type.
pub type RawP4Id = u32;

/// Marker trait for P4Info object kinds.
pub trait P4ObjectKind: Send + Sync + 'static {
    /// Returns the object kind name for debugging.
    fn type_name() -> &'static str;
}

/// A typed P4Info id.
///
/// ```
/// use p4_runtime::{ActionId, TableId};
///
/// let table = TableId::new(0x0200_0001);
/// let action = ActionId::new(0x0100_0001);
/// assert_eq!(table.as_raw(), 0x0200_0001);
/// // fn takes_table(t: TableId) {}
/// // takes_table(action); // does not compile
/// # let _ = action;
/// ```
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct P4Id<T: P4ObjectKind> {
    raw: RawP4Id,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: P4ObjectKind> P4Id<T> {
    pub const fn new(raw: RawP4Id) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn as_raw(&self) -> RawP4Id {
        self.raw
    }
}

impl<T: P4ObjectKind> Clone for P4Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: P4ObjectKind> Copy for P4Id<T> {}

impl<T: P4ObjectKind> fmt::Debug for P4Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::type_name(), self.raw)
    }
}

impl<T: P4ObjectKind> fmt::Display for P4Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<T: P4ObjectKind> PartialEq for P4Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: P4ObjectKind> Eq for P4Id<T> {}

impl<T: P4ObjectKind> PartialOrd for P4Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: P4ObjectKind> Ord for P4Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: P4ObjectKind> Hash for P4Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $id_alias:ident) => {
        #[doc = concat!("Marker type for P4Info ", $type_name, " objects.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl P4ObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Id of a P4Info ", $type_name, ".")]
        pub type $id_alias = P4Id<$name>;
    };
}

define_object_kind!(TableKind, "Table", TableId);
define_object_kind!(ActionKind, "Action", ActionId);
define_object_kind!(MatchFieldKind, "MatchField", MatchFieldId);
define_object_kind!(ActionParamKind, "ActionParam", ActionParamId);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_debug_names_kind() {
        assert_eq!(format!("{:?}", TableId::new(7)), "Table(7)");
        assert_eq!(format!("{:?}", ActionParamId::new(2)), "ActionParam(2)");
        assert_eq!(TableId::new(7).to_string(), "7");
    }

    #[test]
    fn test_id_deserializes_from_number() {
        let id: ActionId = serde_json::from_str("16777217").unwrap();
        assert_eq!(id.as_raw(), 0x0100_0001);
    }

    #[test]
    fn test_id_hash_and_order() {
        let mut set = HashSet::new();
        set.insert(MatchFieldId::new(1));
        set.insert(MatchFieldId::new(1));
        set.insert(MatchFieldId::new(2));
        assert_eq!(set.len(), 2);
        assert!(MatchFieldId::new(1) < MatchFieldId::new(2));
    }
}
