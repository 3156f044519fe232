//! Structured run progress.
//!
//! The orchestrator reports every stage transition as a [`RunEvent`] through
//! an [`EventSink`]. The binary logs them with [`TracingEventSink`]; tests use
//! [`RecordingEventSink`] to assert on progress without parsing log text.

use parking_lot::Mutex;
use std::fmt;
use tracing::{error, info, warn};

/// Stage of an installation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Config,
    Compile,
    Connect,
    Arbitration,
    PipelineConfig,
    RouteInstall,
    SignatureInstall,
    ReadBack,
    Shutdown,
    Decode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Compile => "compile",
            Stage::Connect => "connect",
            Stage::Arbitration => "arbitration",
            Stage::PipelineConfig => "pipeline-config",
            Stage::RouteInstall => "route-install",
            Stage::SignatureInstall => "signature-install",
            Stage::ReadBack => "read-back",
            Stage::Shutdown => "shutdown",
            Stage::Decode => "decode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one stage step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Skipped { reason: String },
    Failed { error: String },
}

impl Outcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Outcome::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEvent {
    /// Device the event concerns; `None` for run-wide events.
    pub device: Option<String>,
    pub stage: Stage,
    pub outcome: Outcome,
    /// Human-readable detail, e.g. the rule that was installed.
    pub detail: Option<String>,
}

impl RunEvent {
    pub fn new(device: Option<&str>, stage: Stage, outcome: Outcome) -> Self {
        Self {
            device: device.map(str::to_string),
            stage,
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receives run progress.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Renders events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: RunEvent) {
        let device = event.device.as_deref().unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("");
        match &event.outcome {
            Outcome::Succeeded => {
                info!(device, stage = %event.stage, "{}", detail)
            }
            Outcome::Skipped { reason } => {
                warn!(device, stage = %event.stage, reason = %reason, "Skipped {}", detail)
            }
            Outcome::Failed { error } => {
                error!(device, stage = %event.stage, error = %error, "Failed {}", detail)
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every event emitted so far.
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    /// Returns the events of one stage.
    pub fn by_stage(&self, stage: Stage) -> Vec<RunEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.stage == stage)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: RunEvent) {
        self.events.lock().push(event);
    }
}
