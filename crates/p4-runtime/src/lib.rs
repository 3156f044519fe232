//! P4Runtime client surface for controllers.
//!
//! This crate covers everything a controller needs from a switch-control
//! library without owning the wire protocol:
//!
//! - [`ids`]: type-safe P4Info ids
//! - [`error`]: status codes and error handling
//! - [`p4info`]: the schema resolver (names <-> ids, match kinds, widths)
//! - [`descriptor`]: symbolic table entry descriptors produced by rule compilers
//! - [`entry`]: resolved entries exchanged with devices
//! - [`connection`]: the session and connector traits
//! - [`sim`]: in-process simulated devices
//!
//! # Example
//!
//! ```ignore
//! use p4_runtime::{P4Info, SwitchConnection, TableEntryDescriptor};
//!
//! async fn install(sw: &mut dyn SwitchConnection, info: &P4Info, desc: &TableEntryDescriptor)
//!     -> p4_runtime::P4rtResult<()>
//! {
//!     let entry = info.build_table_entry(desc)?;
//!     sw.write_table_entry(&entry).await
//! }
//! ```

pub mod connection;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod ids;
pub mod p4info;
pub mod sim;
pub mod value;

pub use connection::{
    DeviceHandle, ElectionId, ForwardingPipelineConfig, SwitchConnection, SwitchConnector,
};
pub use descriptor::{ActionCall, FieldMatch, MatchClause, MatchKind, TableEntryDescriptor};
pub use entry::{ActionEntry, ActionParamEntry, EntryKey, FieldMatchEntry, TableEntry};
pub use error::{P4rtError, P4rtResult, StatusCode};
pub use ids::{ActionId, ActionParamId, MatchFieldId, P4Id, P4ObjectKind, RawP4Id, TableId};
pub use p4info::{ActionInfo, MatchFieldInfo, P4Info, ParamInfo, TableInfo};
pub use sim::{Faults, SimulatedFabric, SimulatedSwitch};
pub use value::{full_mask, prefix_mask, FieldValue};
