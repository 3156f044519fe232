//! p40f control plane.
//!
//! Installs static host routes and the p0f fingerprint rule set on P4Runtime
//! switches, and decodes classification results back into OS labels.
//!
//! - [`compiler`]: routes and signatures to table entries, and back
//! - [`orchestrator`]: the per-run install sequence across devices
//! - [`decoder`]: offline result-to-label translation
//! - [`config`]: deployment topology
//! - [`events`]: structured run progress

pub mod compiler;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod orchestrator;

pub use compiler::{
    compile_route, compile_signature, decode_entry, signature_priority, DisplayMatch,
    DisplayRecord, GENERIC_FUZZY_PARAM, RESULT_PARAM,
};
pub use config::{DeviceConfig, HostRoute, RouteRule, RouteSide, TablesConfig, Topology};
pub use decoder::{DisplayLabel, ResultDecoder, MISS_MARKER};
pub use error::{ControllerError, Result};
pub use events::{EventSink, Outcome, RecordingEventSink, RunEvent, Stage, TracingEventSink};
pub use orchestrator::{
    DeviceDump, DeviceReport, DeviceState, InstallReport, InstallationOrchestrator,
};
