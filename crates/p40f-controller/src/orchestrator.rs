//! Installation orchestrator.
//!
//! Drives one run across every configured device:
//!
//! ```text
//! Disconnected -> Connected -> Arbitrated -> PipelineConfigured
//!              -> RulesInstalled -> [Verified] -> ShutDown
//! ```
//!
//! Connection, arbitration and pipeline upload fan out across devices and
//! join before the next stage; a failure in one of them takes only that
//! device out of the run. Rule writes are sequential and any write failure
//! aborts the run. Every opened session is released on every exit path.

use crate::compiler::{compile_route, compile_signature, decode_entry, DisplayRecord};
use crate::config::{RouteRule, Topology};
use crate::error::{ControllerError, Result};
use crate::events::{EventSink, Outcome, RunEvent, Stage, TracingEventSink};
use futures::future::join_all;
use p0f_sigdb::SignatureSource;
use p4_runtime::{
    DeviceHandle, ForwardingPipelineConfig, P4rtError, P4rtResult, SwitchConnection,
    SwitchConnector, TableEntry, TableEntryDescriptor,
};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle of one device within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceState {
    Disconnected,
    Connected,
    Arbitrated,
    PipelineConfigured,
    RulesInstalled,
    Verified,
    ShutDown,
}

/// Final state of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub name: String,
    /// State after the run, `ShutDown` once the session was released.
    pub state: DeviceState,
    /// Furthest state reached before shutdown.
    pub reached: DeviceState,
    /// Stage at which the device dropped out of the run.
    pub failed_at: Option<Stage>,
    pub routes_written: usize,
    pub signatures_written: usize,
}

/// Entries read back from one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDump {
    pub device: String,
    pub records: Vec<DisplayRecord>,
}

impl fmt::Display for DeviceDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----- Reading tables rules for {} -----", self.device)?;
        for record in &self.records {
            writeln!(f, "{}", record)?;
            writeln!(f, "-----")?;
        }
        Ok(())
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub devices: Vec<DeviceReport>,
    pub route_rules: usize,
    pub signature_rules: usize,
    pub skipped_routes: usize,
    pub skipped_signatures: usize,
    pub read_back: Vec<DeviceDump>,
    /// Failures that took a single device out of the run.
    pub device_errors: Vec<ControllerError>,
    /// Failure that terminated the run.
    pub error: Option<ControllerError>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.device_errors.is_empty()
    }

    /// The error to report to the operator, if any.
    pub fn failure(&self) -> Option<&ControllerError> {
        self.error.as_ref().or_else(|| self.device_errors.first())
    }

    pub fn device(&self, name: &str) -> Option<&DeviceReport> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Devices whose rule set was fully installed.
    pub fn installed_devices(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| d.reached >= DeviceState::RulesInstalled)
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Installed {} route rules and {} p0f rules on {} device(s)",
            self.route_rules,
            self.signature_rules,
            self.installed_devices()
        )
    }
}

/// One compiled entry bound to its target device.
#[derive(Debug, Clone)]
struct PlannedWrite {
    device: String,
    /// Short description used in events and errors.
    what: String,
    table: String,
    entry: TableEntry,
}

#[derive(Debug, Default)]
struct InstallPlan {
    routes: Vec<PlannedWrite>,
    signatures: Vec<PlannedWrite>,
}

struct DeviceSession {
    handle: DeviceHandle,
    conn: Option<Box<dyn SwitchConnection>>,
    state: DeviceState,
    reached: DeviceState,
    failed_at: Option<Stage>,
    routes_written: usize,
    signatures_written: usize,
}

impl DeviceSession {
    fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            conn: None,
            state: DeviceState::Disconnected,
            reached: DeviceState::Disconnected,
            failed_at: None,
            routes_written: 0,
            signatures_written: 0,
        }
    }

    fn name(&self) -> &str {
        &self.handle.name
    }

    fn advance(&mut self, state: DeviceState) {
        self.state = state;
        self.reached = self.reached.max(state);
    }

    fn is_at(&self, state: DeviceState) -> bool {
        self.failed_at.is_none() && self.conn.is_some() && self.state == state
    }

    /// Ready to receive rules.
    fn is_available(&self) -> bool {
        self.failed_at.is_none()
            && self.conn.is_some()
            && self.state >= DeviceState::PipelineConfigured
    }

    fn report(&self) -> DeviceReport {
        DeviceReport {
            name: self.handle.name.clone(),
            state: self.state,
            reached: self.reached,
            failed_at: self.failed_at,
            routes_written: self.routes_written,
            signatures_written: self.signatures_written,
        }
    }
}

/// Runs an RPC unless the run has been cancelled. Returns `None` on
/// cancellation.
async fn guarded<T>(
    cancel: &CancellationToken,
    rpc: impl Future<Output = P4rtResult<T>>,
) -> Option<P4rtResult<T>> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = rpc => Some(result),
    }
}

/// Installs routes and fingerprint rules on a set of devices.
pub struct InstallationOrchestrator {
    connector: Arc<dyn SwitchConnector>,
    topology: Topology,
    pipeline: ForwardingPipelineConfig,
    sink: Arc<dyn EventSink>,
    read_back: bool,
}

impl InstallationOrchestrator {
    pub fn new(
        connector: Arc<dyn SwitchConnector>,
        topology: Topology,
        pipeline: ForwardingPipelineConfig,
    ) -> Self {
        Self {
            connector,
            topology,
            pipeline,
            sink: Arc::new(TracingEventSink),
            read_back: false,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Reads every table back after installation.
    pub fn with_read_back(mut self, read_back: bool) -> Self {
        self.read_back = read_back;
        self
    }

    fn emit(&self, device: Option<&str>, stage: Stage, outcome: Outcome, detail: String) {
        self.sink
            .emit(RunEvent::new(device, stage, outcome).with_detail(detail));
    }

    fn resolve(&self, desc: &TableEntryDescriptor) -> Result<TableEntry> {
        self.pipeline
            .p4info
            .build_table_entry(desc)
            .map_err(|source| ControllerError::Schema {
                rule: desc.to_string(),
                source,
            })
    }

    /// Compiles and resolves every rule before any device is contacted.
    fn plan<S: SignatureSource + ?Sized>(&self, source: &S) -> Result<InstallPlan> {
        let tables = &self.topology.tables;
        let mut plan = InstallPlan::default();

        for rule in self.topology.route_rules() {
            let desc = compile_route(&rule, tables)?;
            plan.routes.push(PlannedWrite {
                device: rule.device.clone(),
                what: describe_route(&rule),
                entry: self.resolve(&desc)?,
                table: desc.table,
            });
        }

        let signatures = source.signatures();
        let total = signatures.len();
        let mut compiled = Vec::with_capacity(total);
        for (ordinal, sig) in signatures.iter().enumerate() {
            let desc = compile_signature(sig, ordinal, total, tables)?;
            debug!(label_id = sig.label_id, priority = ?desc.priority, "Compiled signature");
            compiled.push((
                format!(
                    "{} p0f rule for {} (id {})",
                    sig.kind_description(),
                    sig.label,
                    sig.label_id
                ),
                self.resolve(&desc)?,
                desc.table,
            ));
        }
        for device in &self.topology.signature_devices {
            plan.signatures
                .extend(compiled.iter().map(|(what, entry, table)| PlannedWrite {
                    device: device.clone(),
                    what: what.clone(),
                    table: table.clone(),
                    entry: entry.clone(),
                }));
        }

        let mut seen = HashSet::new();
        for write in plan.routes.iter().chain(&plan.signatures) {
            if !seen.insert((write.device.as_str(), write.entry.key())) {
                return Err(ControllerError::validation(
                    format!("{} on {}", write.what, write.device),
                    format!("duplicates an earlier entry in {}", write.table),
                ));
            }
        }

        info!(
            routes = plan.routes.len(),
            signatures = total,
            devices = self.topology.signature_devices.len(),
            "Compiled install plan"
        );
        Ok(plan)
    }

    /// Executes one run. Never leaves a session open.
    pub async fn run<S: SignatureSource + ?Sized>(
        &self,
        source: &S,
        cancel: &CancellationToken,
    ) -> InstallReport {
        let mut report = InstallReport::default();
        let plan = match self.plan(source) {
            Ok(plan) => plan,
            Err(e) => {
                self.emit(None, e.stage(), Outcome::failed(&e), "compile rules".into());
                report.error = Some(e);
                return report;
            }
        };

        let mut sessions: Vec<DeviceSession> = self
            .topology
            .devices
            .iter()
            .map(|d| DeviceSession::new(d.to_handle()))
            .collect();

        let result = self.drive(&mut sessions, &plan, cancel, &mut report).await;
        self.release_all(&mut sessions).await;

        if let Err(e) = result {
            self.emit(None, e.stage(), Outcome::failed(&e), "run aborted".into());
            report.error = Some(e);
        }
        report.devices = sessions.iter().map(DeviceSession::report).collect();
        report
    }

    async fn drive(
        &self,
        sessions: &mut [DeviceSession],
        plan: &InstallPlan,
        cancel: &CancellationToken,
        report: &mut InstallReport,
    ) -> Result<()> {
        self.connect_all(sessions, cancel, report).await?;
        self.fan_out(sessions, Stage::Arbitration, cancel, report)
            .await?;
        self.fan_out(sessions, Stage::PipelineConfig, cancel, report)
            .await?;

        for write in &plan.routes {
            if self
                .install(sessions, write, Stage::RouteInstall, cancel)
                .await?
            {
                report.route_rules += 1;
            } else {
                report.skipped_routes += 1;
            }
        }

        for write in &plan.signatures {
            if self
                .install(sessions, write, Stage::SignatureInstall, cancel)
                .await?
            {
                report.signature_rules += 1;
            } else {
                report.skipped_signatures += 1;
            }
        }
        for name in &self.topology.signature_devices {
            if let Some(session) = sessions.iter().find(|s| s.name() == name) {
                if session.is_available() {
                    self.emit(
                        Some(name.as_str()),
                        Stage::SignatureInstall,
                        Outcome::Succeeded,
                        format!("Installed all p0f rules on {}", name),
                    );
                }
            }
        }

        for session in sessions.iter_mut().filter(|s| s.is_available()) {
            session.advance(DeviceState::RulesInstalled);
        }

        if self.read_back {
            self.read_back_all(sessions, cancel, report).await?;
        }
        Ok(())
    }

    async fn connect_all(
        &self,
        sessions: &mut [DeviceSession],
        cancel: &CancellationToken,
        report: &mut InstallReport,
    ) -> Result<()> {
        let connector = &self.connector;
        let results = join_all(
            sessions
                .iter()
                .map(|s| guarded(cancel, connector.connect(&s.handle))),
        )
        .await;

        let mut interrupted = false;
        let mut fatal = None;
        for (session, result) in sessions.iter_mut().zip(results) {
            match result {
                None => interrupted = true,
                Some(Ok(conn)) => {
                    session.conn = Some(conn);
                    session.advance(DeviceState::Connected);
                    self.emit(
                        Some(session.name()),
                        Stage::Connect,
                        Outcome::Succeeded,
                        format!("Connected to {}", session.handle),
                    );
                }
                Some(Err(e)) => {
                    if let Some(err) = self.fail_device(session, Stage::Connect, e, report) {
                        fatal.get_or_insert(err);
                    }
                }
            }
        }
        if interrupted {
            return Err(ControllerError::Interrupted);
        }
        fatal.map_or(Ok(()), Err)
    }

    /// Runs arbitration or pipeline upload on every eligible device
    /// concurrently.
    async fn fan_out(
        &self,
        sessions: &mut [DeviceSession],
        stage: Stage,
        cancel: &CancellationToken,
        report: &mut InstallReport,
    ) -> Result<()> {
        let (from, to) = match stage {
            Stage::Arbitration => (DeviceState::Connected, DeviceState::Arbitrated),
            _ => (DeviceState::Arbitrated, DeviceState::PipelineConfigured),
        };
        let election_id = self.topology.election_id();
        let pipeline = &self.pipeline;

        let results = join_all(sessions.iter_mut().filter(|s| s.is_at(from)).map(
            move |session| async move {
                let result = match session.conn.as_deref_mut() {
                    Some(conn) if stage == Stage::Arbitration => {
                        guarded(cancel, conn.master_arbitration_update(election_id)).await
                    }
                    Some(conn) => {
                        guarded(cancel, conn.set_forwarding_pipeline_config(pipeline)).await
                    }
                    None => Some(Err(P4rtError::transport(
                        &session.handle.address,
                        "not connected",
                    ))),
                };
                (session, result)
            },
        ))
        .await;

        let mut interrupted = false;
        let mut fatal = None;
        for (session, result) in results {
            match result {
                None => interrupted = true,
                Some(Ok(())) => {
                    session.advance(to);
                    let detail = match stage {
                        Stage::Arbitration => {
                            format!("Claimed mastership with election_id {}", election_id)
                        }
                        _ => format!(
                            "Installed P4 Program using SetForwardingPipelineConfig on {}",
                            session.name()
                        ),
                    };
                    self.emit(Some(session.name()), stage, Outcome::Succeeded, detail);
                }
                Some(Err(e)) => {
                    if let Some(err) = self.fail_device(session, stage, e, report) {
                        fatal.get_or_insert(err);
                    }
                }
            }
        }
        if interrupted {
            return Err(ControllerError::Interrupted);
        }
        fatal.map_or(Ok(()), Err)
    }

    /// Takes a device out of the run. Returns the error back if it is not
    /// confined to that device.
    fn fail_device(
        &self,
        session: &mut DeviceSession,
        stage: Stage,
        source: P4rtError,
        report: &mut InstallReport,
    ) -> Option<ControllerError> {
        let err = ControllerError::from_session(session.name(), stage, source);
        session.failed_at = Some(stage);
        if !err.is_device_local() {
            return Some(err);
        }
        self.emit(
            Some(session.name()),
            stage,
            Outcome::failed(&err),
            "device removed from run".into(),
        );
        report.device_errors.push(err);
        None
    }

    /// Writes one planned entry. Returns `Ok(false)` if the target device is
    /// not available.
    async fn install(
        &self,
        sessions: &mut [DeviceSession],
        write: &PlannedWrite,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(session) = sessions
            .iter_mut()
            .find(|s| s.name() == write.device)
            .filter(|s| s.is_available())
        else {
            self.emit(
                Some(write.device.as_str()),
                stage,
                Outcome::skipped("device unavailable"),
                write.what.clone(),
            );
            return Ok(false);
        };
        let Some(conn) = session.conn.as_deref_mut() else {
            return Ok(false);
        };

        let result = guarded(cancel, conn.write_table_entry(&write.entry)).await;
        match result {
            None => Err(ControllerError::Interrupted),
            Some(Err(source)) => Err(ControllerError::Write {
                device: write.device.clone(),
                stage,
                entry: write.what.clone(),
                source,
            }),
            Some(Ok(())) => {
                match stage {
                    Stage::RouteInstall => session.routes_written += 1,
                    _ => session.signatures_written += 1,
                }
                self.emit(
                    Some(write.device.as_str()),
                    stage,
                    Outcome::Succeeded,
                    format!(
                        "Installed {} in {} on {}",
                        write.what, write.table, write.device
                    ),
                );
                Ok(true)
            }
        }
    }

    async fn read_back_all(
        &self,
        sessions: &mut [DeviceSession],
        cancel: &CancellationToken,
        report: &mut InstallReport,
    ) -> Result<()> {
        let schema = Arc::clone(&self.pipeline.p4info);
        for session in sessions.iter_mut().filter(|s| s.is_available()) {
            let name = session.handle.name.clone();
            let Some(conn) = session.conn.as_deref_mut() else {
                continue;
            };

            let mut records = Vec::new();
            let mut failure = None;
            for table in schema.tables() {
                let result = guarded(cancel, conn.read_table_entries(Some(table.preamble.id))).await;
                match result {
                    None => return Err(ControllerError::Interrupted),
                    Some(Err(e)) => {
                        failure = Some(ControllerError::from_session(&name, Stage::ReadBack, e));
                        break;
                    }
                    Some(Ok(entries)) => {
                        for entry in &entries {
                            match decode_entry(entry, &schema) {
                                Ok(record) => records.push(record),
                                Err(source) => {
                                    failure = Some(ControllerError::Schema {
                                        rule: format!("entry read from {}", name),
                                        source,
                                    });
                                    break;
                                }
                            }
                        }
                    }
                }
                if failure.is_some() {
                    break;
                }
            }

            match failure {
                Some(err) => {
                    self.emit(
                        Some(name.as_str()),
                        Stage::ReadBack,
                        Outcome::failed(&err),
                        "read back tables".into(),
                    );
                    report.device_errors.push(err);
                }
                None => {
                    session.advance(DeviceState::Verified);
                    self.emit(
                        Some(name.as_str()),
                        Stage::ReadBack,
                        Outcome::Succeeded,
                        format!("Read {} entries from {}", records.len(), name),
                    );
                    report.read_back.push(DeviceDump {
                        device: name,
                        records,
                    });
                }
            }
        }
        Ok(())
    }

    /// Closes every open session, attempting all of them even if some fail.
    async fn release_all(&self, sessions: &mut [DeviceSession]) {
        for session in sessions.iter_mut() {
            let Some(mut conn) = session.conn.take() else {
                continue;
            };
            match conn.shutdown().await {
                Ok(()) => self.emit(
                    Some(session.name()),
                    Stage::Shutdown,
                    Outcome::Succeeded,
                    "Released session".into(),
                ),
                Err(e) => self.emit(
                    Some(session.name()),
                    Stage::Shutdown,
                    Outcome::failed(&e),
                    "release session".into(),
                ),
            }
            session.state = DeviceState::ShutDown;
        }
    }
}

fn describe_route(rule: &RouteRule) -> String {
    format!("{} IPv4 forwarding rule to {}", rule.side, rule.dst_ip)
}
