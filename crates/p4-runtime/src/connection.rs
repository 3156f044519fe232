//! Switch session contract.
//!
//! A [`SwitchConnection`] is one controller session with one device. The
//! controller only ever talks to devices through these traits, so a gRPC
//! client and the in-process [`SimulatedFabric`](crate::sim::SimulatedFabric)
//! are interchangeable.

use crate::entry::TableEntry;
use crate::error::P4rtResult;
use crate::ids::TableId;
use crate::p4info::P4Info;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Identifies one managed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Logical name used in logs (e.g. `s1`).
    pub name: String,
    /// Server address (`host:port`).
    pub address: String,
    /// P4Runtime device id.
    pub device_id: u64,
    /// Optional file receiving a text trace of every request sent.
    #[serde(default)]
    pub proto_dump_file: Option<PathBuf>,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>, address: impl Into<String>, device_id: u64) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            device_id,
            proto_dump_file: None,
        }
    }

    pub fn with_proto_dump_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.proto_dump_file = Some(path.into());
        self
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, device_id {})", self.name, self.address, self.device_id)
    }
}

/// Controller identity used in mastership arbitration. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElectionId(pub u64);

impl fmt::Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The compiled program a device must load before any table is written.
#[derive(Debug, Clone)]
pub struct ForwardingPipelineConfig {
    pub p4info: Arc<P4Info>,
    /// Target-specific device config (the BMv2 JSON for software switches).
    pub device_config: Arc<Vec<u8>>,
}

impl ForwardingPipelineConfig {
    pub fn new(p4info: Arc<P4Info>, device_config: Vec<u8>) -> Self {
        Self {
            p4info,
            device_config: Arc::new(device_config),
        }
    }
}

/// One open session with a device.
#[async_trait]
pub trait SwitchConnection: Send + Sync {
    /// Returns the device this session talks to.
    fn handle(&self) -> &DeviceHandle;

    /// Claims mastership. Re-claiming with the same election id is a no-op;
    /// a lower id while another controller is master fails with
    /// `PERMISSION_DENIED`.
    async fn master_arbitration_update(&mut self, election_id: ElectionId) -> P4rtResult<()>;

    /// Installs the forwarding pipeline.
    async fn set_forwarding_pipeline_config(
        &mut self,
        config: &ForwardingPipelineConfig,
    ) -> P4rtResult<()>;

    /// Inserts one table entry.
    async fn write_table_entry(&mut self, entry: &TableEntry) -> P4rtResult<()>;

    /// Reads installed entries, optionally restricted to one table.
    async fn read_table_entries(&mut self, table: Option<TableId>) -> P4rtResult<Vec<TableEntry>>;

    /// Closes the session.
    async fn shutdown(&mut self) -> P4rtResult<()>;
}

/// Opens sessions.
#[async_trait]
pub trait SwitchConnector: Send + Sync {
    async fn connect(&self, handle: &DeviceHandle) -> P4rtResult<Box<dyn SwitchConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        let handle = DeviceHandle::new("s1", "127.0.0.1:50051", 0)
            .with_proto_dump_file("logs/s1-p4runtime-requests.txt");
        assert_eq!(handle.to_string(), "s1 (127.0.0.1:50051, device_id 0)");
        assert!(handle.proto_dump_file.is_some());
    }

    #[test]
    fn test_election_id_order() {
        assert!(ElectionId(2) > ElectionId(1));
    }
}
