//! In-process simulated switches.
//!
//! [`SimulatedFabric`] implements [`SwitchConnector`] over a set of in-memory
//! devices that enforce the P4Runtime rules the controller depends on:
//! mastership by election id, pipeline-before-write, and unique entry keys.
//! Every request is journaled, optionally traced to the handle's dump file,
//! and can be made to fail for exercising error paths.

use crate::connection::{
    DeviceHandle, ElectionId, ForwardingPipelineConfig, SwitchConnection, SwitchConnector,
};
use crate::descriptor::FieldMatch;
use crate::entry::{EntryKey, TableEntry};
use crate::error::{P4rtError, P4rtResult, StatusCode};
use crate::ids::TableId;
use crate::p4info::P4Info;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A request observed by a simulated device.
#[derive(Debug, Clone, PartialEq)]
pub enum SimRequest {
    Arbitration(ElectionId),
    PipelineConfig,
    Write(TableEntry),
    Read,
    Shutdown,
}

/// One journaled request.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalRecord {
    pub device: String,
    pub request: SimRequest,
}

/// Failure injection for one device.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Refuse new connections.
    pub refuse_connect: bool,
    /// Fail pipeline upload with this status.
    pub fail_pipeline: Option<StatusCode>,
    /// Fail the Nth write (0-based) with `INTERNAL`.
    pub fail_write_at: Option<usize>,
}

#[derive(Debug, Default)]
struct DeviceState {
    master: Option<ElectionId>,
    pipeline: Option<Arc<P4Info>>,
    entries: Vec<TableEntry>,
    keys: HashSet<EntryKey>,
    writes_attempted: usize,
    open_sessions: usize,
    faults: Faults,
}

/// A set of simulated devices keyed by device id.
#[derive(Debug, Clone, Default)]
pub struct SimulatedFabric {
    devices: Arc<Mutex<HashMap<u64, Arc<Mutex<DeviceState>>>>>,
    journal: Arc<Mutex<Vec<JournalRecord>>>,
}

impl SimulatedFabric {
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self, device_id: u64) -> Arc<Mutex<DeviceState>> {
        self.devices
            .lock()
            .entry(device_id)
            .or_insert_with(|| Arc::new(Mutex::new(DeviceState::default())))
            .clone()
    }

    /// Makes another controller master of the device.
    pub fn set_foreign_master(&self, device_id: u64, election_id: ElectionId) {
        self.device(device_id).lock().master = Some(election_id);
    }

    /// Replaces the failure injection settings of a device.
    pub fn set_faults(&self, device_id: u64, faults: Faults) {
        self.device(device_id).lock().faults = faults;
    }

    /// Returns the entries installed on a device, in insertion order.
    pub fn entries(&self, device_id: u64) -> Vec<TableEntry> {
        self.device(device_id).lock().entries.clone()
    }

    /// Returns the number of sessions currently open on a device.
    pub fn open_sessions(&self, device_id: u64) -> usize {
        self.device(device_id).lock().open_sessions
    }

    /// Returns true once a pipeline has been loaded on the device.
    pub fn has_pipeline(&self, device_id: u64) -> bool {
        self.device(device_id).lock().pipeline.is_some()
    }

    /// Returns every request seen by any device, in arrival order.
    pub fn journal(&self) -> Vec<JournalRecord> {
        self.journal.lock().clone()
    }

    /// Returns the entries written across all devices, in arrival order.
    pub fn writes(&self) -> Vec<(String, TableEntry)> {
        self.journal
            .lock()
            .iter()
            .filter_map(|r| match &r.request {
                SimRequest::Write(entry) => Some((r.device.clone(), entry.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SwitchConnector for SimulatedFabric {
    async fn connect(&self, handle: &DeviceHandle) -> P4rtResult<Box<dyn SwitchConnection>> {
        let state = self.device(handle.device_id);
        {
            let mut state = state.lock();
            if state.faults.refuse_connect {
                return Err(P4rtError::transport(&handle.address, "connection refused"));
            }
            state.open_sessions += 1;
        }
        debug!(device = %handle.name, address = %handle.address, "Opened simulated session");
        Ok(Box::new(SimulatedSwitch {
            handle: handle.clone(),
            election_id: None,
            state,
            journal: Arc::clone(&self.journal),
            closed: false,
        }))
    }
}

/// A session with one simulated device.
pub struct SimulatedSwitch {
    handle: DeviceHandle,
    election_id: Option<ElectionId>,
    state: Arc<Mutex<DeviceState>>,
    journal: Arc<Mutex<Vec<JournalRecord>>>,
    closed: bool,
}

impl SimulatedSwitch {
    fn record(&self, request: SimRequest) {
        self.journal.lock().push(JournalRecord {
            device: self.handle.name.clone(),
            request,
        });
    }

    fn ensure_open(&self) -> P4rtResult<()> {
        if self.closed {
            Err(P4rtError::rpc(StatusCode::Unavailable, "session closed"))
        } else {
            Ok(())
        }
    }

    fn ensure_master(&self, state: &DeviceState) -> P4rtResult<()> {
        match (self.election_id, state.master) {
            (Some(mine), Some(master)) if mine == master => Ok(()),
            _ => Err(P4rtError::rpc(
                StatusCode::PermissionDenied,
                "controller is not master",
            )),
        }
    }

    async fn trace(&self, text: String) {
        let Some(path) = self.handle.proto_dump_file.as_ref() else {
            return;
        };
        if let Err(e) = append(path, &text).await {
            warn!(device = %self.handle.name, path = %path.display(), error = %e,
                "Failed to write request trace");
        }
    }
}

async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

fn render_match(m: &FieldMatch) -> String {
    match m {
        FieldMatch::Exact { value } => format!("exact {{ value: {} }}", value),
        FieldMatch::Lpm { value, prefix_len } => {
            format!("lpm {{ value: {} prefix_len: {} }}", value, prefix_len)
        }
        FieldMatch::Ternary { value, mask } => {
            format!("ternary {{ value: {} mask: {} }}", value, mask)
        }
        FieldMatch::Range { low, high } => format!("range {{ low: {} high: {} }}", low, high),
        FieldMatch::Optional { value } => format!("optional {{ value: {} }}", value),
    }
}

fn render_entry(entry: &TableEntry) -> String {
    let mut out = format!("  table_entry {{\n    table_id: {}\n", entry.table_id);
    for m in &entry.matches {
        let _ = writeln!(
            out,
            "    match {{ field_id: {} {} }}",
            m.field_id,
            render_match(&m.value)
        );
    }
    let _ = writeln!(out, "    action {{ action_id: {}", entry.action.action_id);
    for p in &entry.action.params {
        let _ = writeln!(out, "      params {{ param_id: {} value: {} }}", p.param_id, p.value);
    }
    out.push_str("    }\n");
    if entry.priority != 0 {
        let _ = writeln!(out, "    priority: {}", entry.priority);
    }
    out.push_str("  }\n");
    out
}

#[async_trait]
impl SwitchConnection for SimulatedSwitch {
    fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    async fn master_arbitration_update(&mut self, election_id: ElectionId) -> P4rtResult<()> {
        self.ensure_open()?;
        self.record(SimRequest::Arbitration(election_id));
        self.trace(format!(
            "# MasterArbitrationUpdate\ndevice_id: {}\nelection_id: {}\n",
            self.handle.device_id, election_id
        ))
        .await;

        let mut state = self.state.lock();
        if let Some(master) = state.master {
            if master > election_id {
                return Err(P4rtError::rpc(
                    StatusCode::PermissionDenied,
                    format!("election_id {} is master", master),
                ));
            }
        }
        state.master = Some(election_id);
        self.election_id = Some(election_id);
        Ok(())
    }

    async fn set_forwarding_pipeline_config(
        &mut self,
        config: &ForwardingPipelineConfig,
    ) -> P4rtResult<()> {
        self.ensure_open()?;
        self.record(SimRequest::PipelineConfig);
        self.trace(format!(
            "# SetForwardingPipelineConfig\ndevice_id: {}\naction: VERIFY_AND_COMMIT\np4_device_config: <{} bytes>\n",
            self.handle.device_id,
            config.device_config.len()
        ))
        .await;

        let mut state = self.state.lock();
        self.ensure_master(&state)?;
        if let Some(code) = state.faults.fail_pipeline {
            return Err(P4rtError::rpc(code, "device rejected pipeline config"));
        }
        state.pipeline = Some(Arc::clone(&config.p4info));
        state.entries.clear();
        state.keys.clear();
        Ok(())
    }

    async fn write_table_entry(&mut self, entry: &TableEntry) -> P4rtResult<()> {
        self.ensure_open()?;
        self.record(SimRequest::Write(entry.clone()));
        self.trace(format!(
            "# WriteRequest\ndevice_id: {}\nupdates {{ type: INSERT\n{}}}\n",
            self.handle.device_id,
            render_entry(entry)
        ))
        .await;

        let mut state = self.state.lock();
        self.ensure_master(&state)?;
        let index = state.writes_attempted;
        state.writes_attempted += 1;
        let Some(pipeline) = state.pipeline.as_ref() else {
            return Err(P4rtError::rpc(
                StatusCode::FailedPrecondition,
                "no forwarding pipeline config set",
            ));
        };
        if pipeline.table_by_id(entry.table_id).is_err() {
            return Err(P4rtError::rpc(
                StatusCode::NotFound,
                format!("table {} not in pipeline", entry.table_id),
            ));
        }
        if state.faults.fail_write_at == Some(index) {
            return Err(P4rtError::rpc(StatusCode::Internal, "injected write failure"));
        }
        if !state.keys.insert(entry.key()) {
            return Err(P4rtError::rpc(
                StatusCode::AlreadyExists,
                "entry with identical match key and priority exists",
            ));
        }
        state.entries.push(entry.clone());
        Ok(())
    }

    async fn read_table_entries(&mut self, table: Option<TableId>) -> P4rtResult<Vec<TableEntry>> {
        self.ensure_open()?;
        self.record(SimRequest::Read);
        let state = self.state.lock();
        Ok(state
            .entries
            .iter()
            .filter(|e| table.map_or(true, |t| e.table_id == t))
            .cloned()
            .collect())
    }

    async fn shutdown(&mut self) -> P4rtResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.record(SimRequest::Shutdown);
        let mut state = self.state.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        Ok(())
    }
}
