//! Integration tests for the installation orchestrator.
//!
//! These tests drive full runs against the simulated fabric and check what
//! the devices actually received: write order, priorities, skipped devices
//! and session release on every exit path.

use p0f_sigdb::{SignatureDatabase, SignatureSource};
use p40f_controller::{
    decode_entry, ControllerError, DeviceState, DisplayLabel, EventSink, InstallReport,
    InstallationOrchestrator, RecordingEventSink, ResultDecoder, RunEvent, Stage, Topology,
    GENERIC_FUZZY_PARAM, RESULT_PARAM,
};
use p4_runtime::sim::SimRequest;
use p4_runtime::{
    ElectionId, Faults, ForwardingPipelineConfig, P4Info, SimulatedFabric, StatusCode,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const P4INFO: &str = include_str!("../../../testdata/p40f.p4info.json");
const SIGDB: &str = include_str!("../../../testdata/p0f.sigdb.json");

const S1: u64 = 0;
const S3: u64 = 1;

fn p4info() -> Arc<P4Info> {
    Arc::new(P4Info::from_json_str(P4INFO).unwrap())
}

fn sigdb() -> SignatureDatabase {
    SignatureDatabase::from_json_str(SIGDB).unwrap()
}

/// The lab topology with request traces redirected into `dir`.
fn topology(dir: &tempfile::TempDir) -> Topology {
    let mut topology = Topology::default();
    for device in &mut topology.devices {
        device.proto_dump_file = Some(dir.path().join(format!("{}-p4runtime-requests.txt", device.name)));
    }
    topology
}

fn orchestrator(
    fabric: &SimulatedFabric,
    topology: Topology,
    sink: Arc<dyn EventSink>,
) -> InstallationOrchestrator {
    InstallationOrchestrator::new(
        Arc::new(fabric.clone()),
        topology,
        ForwardingPipelineConfig::new(p4info(), b"{\"program\": \"p40f\"}".to_vec()),
    )
    .with_event_sink(sink)
}

async fn run(fabric: &SimulatedFabric, topology: Topology) -> (InstallReport, Arc<RecordingEventSink>) {
    let sink = Arc::new(RecordingEventSink::new());
    let report = orchestrator(fabric, topology, sink.clone())
        .run(&sigdb(), &CancellationToken::new())
        .await;
    (report, sink)
}

fn assert_all_released(fabric: &SimulatedFabric, report: &InstallReport) {
    assert_eq!(fabric.open_sessions(S1), 0);
    assert_eq!(fabric.open_sessions(S3), 0);
    for device in &report.devices {
        if device.reached > DeviceState::Disconnected {
            assert_eq!(device.state, DeviceState::ShutDown, "{} not released", device.name);
        }
    }
}

/// Cancels the run once `limit` events of `stage` have succeeded.
struct CancelAfter {
    token: CancellationToken,
    stage: Stage,
    limit: usize,
    seen: AtomicUsize,
}

impl EventSink for CancelAfter {
    fn emit(&self, event: RunEvent) {
        if event.stage == self.stage && event.outcome.is_success() {
            let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if seen == self.limit {
                self.token.cancel();
            }
        }
    }
}

#[tokio::test]
async fn test_end_to_end_install() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    let (report, sink) = run(&fabric, topology(&dir)).await;

    assert!(report.is_success(), "{:?}", report.failure());
    assert_eq!(
        report.summary(),
        "Installed 4 route rules and 3 p0f rules on 2 device(s)"
    );

    let info = p4info();
    let route_table = info.table("MyIngress.ipv4_lpm").unwrap().preamble.id;
    let writes = fabric.writes();
    let order: Vec<(&str, bool, i32)> = writes
        .iter()
        .map(|(device, entry)| (device.as_str(), entry.table_id == route_table, entry.priority))
        .collect();
    assert_eq!(
        order,
        vec![
            ("s1", true, 0),
            ("s3", true, 0),
            ("s3", true, 0),
            ("s1", true, 0),
            ("s1", false, 3),
            ("s1", false, 2),
            ("s1", false, 1),
        ]
    );

    assert!(fabric.has_pipeline(S1));
    assert!(fabric.has_pipeline(S3));
    assert_eq!(fabric.entries(S1).len(), 5);
    assert_eq!(fabric.entries(S3).len(), 2);
    assert_eq!(report.device("s1").unwrap().signatures_written, 3);
    assert_eq!(report.device("s3").unwrap().routes_written, 2);
    assert_all_released(&fabric, &report);

    let installed: Vec<String> = sink
        .by_stage(Stage::SignatureInstall)
        .into_iter()
        .filter_map(|e| e.detail)
        .collect();
    assert_eq!(
        installed[0],
        "Installed specific non-fuzzy p0f rule for s:unix:Linux:3.11 and newer (id 1) \
         in MyIngress.result_match on s1"
    );
    assert_eq!(installed.last().unwrap(), "Installed all p0f rules on s1");

    let trace = std::fs::read_to_string(dir.path().join("s1-p4runtime-requests.txt")).unwrap();
    assert!(trace.contains("# MasterArbitrationUpdate"));
    assert!(trace.contains("priority: 3"));
}

#[tokio::test]
async fn test_arbitration_conflict_is_device_local() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    fabric.set_foreign_master(S3, ElectionId(5));

    let (report, sink) = run(&fabric, topology(&dir)).await;

    assert!(report.error.is_none());
    assert!(matches!(
        report.failure(),
        Some(ControllerError::ArbitrationConflict { device, .. }) if device == "s3"
    ));
    assert_eq!(report.device("s3").unwrap().failed_at, Some(Stage::Arbitration));

    // s1 still gets its pipeline, its two routes and every signature.
    assert!(fabric.has_pipeline(S1));
    assert!(!fabric.has_pipeline(S3));
    assert_eq!(report.route_rules, 2);
    assert_eq!(report.skipped_routes, 2);
    assert_eq!(report.signature_rules, 3);
    assert!(fabric.writes().iter().all(|(device, _)| device == "s1"));
    assert_eq!(
        sink.by_stage(Stage::PipelineConfig)
            .iter()
            .filter(|e| e.outcome.is_success())
            .count(),
        1
    );
    assert_all_released(&fabric, &report);
}

#[tokio::test]
async fn test_pipeline_failure_skips_device_rules() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    fabric.set_faults(
        S1,
        Faults {
            fail_pipeline: Some(StatusCode::InvalidArgument),
            ..Faults::default()
        },
    );

    let (report, _) = run(&fabric, topology(&dir)).await;

    assert!(matches!(
        report.failure(),
        Some(ControllerError::PipelineConfig { .. })
    ));
    assert_eq!(report.signature_rules, 0);
    assert_eq!(report.skipped_signatures, 3);
    assert_eq!(fabric.entries(S3).len(), 2);
    assert_eq!(report.installed_devices(), 1);
    assert_all_released(&fabric, &report);
}

#[tokio::test]
async fn test_connect_failure_is_device_local() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    fabric.set_faults(
        S3,
        Faults {
            refuse_connect: true,
            ..Faults::default()
        },
    );

    let (report, _) = run(&fabric, topology(&dir)).await;

    let s3 = report.device("s3").unwrap();
    assert_eq!(s3.state, DeviceState::Disconnected);
    assert_eq!(s3.failed_at, Some(Stage::Connect));
    assert_eq!(report.failure().map(|e| e.stage()), Some(Stage::Connect));
    assert_eq!(report.signature_rules, 3);
    assert_all_released(&fabric, &report);
}

#[tokio::test]
async fn test_write_failure_aborts_run_but_releases() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    // s1's second write is the egress route of h3 -> h1.
    fabric.set_faults(
        S1,
        Faults {
            fail_write_at: Some(1),
            ..Faults::default()
        },
    );

    let (report, _) = run(&fabric, topology(&dir)).await;

    match &report.error {
        Some(ControllerError::Write {
            device,
            stage,
            source,
            ..
        }) => {
            assert_eq!(device, "s1");
            assert_eq!(*stage, Stage::RouteInstall);
            assert_eq!(source.code(), Some(StatusCode::Internal));
        }
        other => panic!("expected write error, got {:?}", other),
    }
    assert_eq!(report.route_rules, 3);
    assert_eq!(report.signature_rules, 0);
    assert_eq!(fabric.writes().len(), 4);
    assert_eq!(report.installed_devices(), 0);
    assert_all_released(&fabric, &report);
}

#[tokio::test]
async fn test_interruption_releases_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    let token = CancellationToken::new();
    let sink = Arc::new(CancelAfter {
        token: token.clone(),
        stage: Stage::RouteInstall,
        limit: 2,
        seen: AtomicUsize::new(0),
    });

    let report = orchestrator(&fabric, topology(&dir), sink)
        .run(&sigdb(), &token)
        .await;

    assert!(matches!(report.error, Some(ControllerError::Interrupted)));
    assert_eq!(report.route_rules, 2);
    assert_eq!(fabric.writes().len(), 2);
    assert_all_released(&fabric, &report);
    let shutdowns = fabric
        .journal()
        .iter()
        .filter(|r| r.request == SimRequest::Shutdown)
        .count();
    assert_eq!(shutdowns, 2);
}

#[tokio::test]
async fn test_cancelled_before_start_contacts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    let token = CancellationToken::new();
    token.cancel();

    let report = orchestrator(&fabric, topology(&dir), Arc::new(RecordingEventSink::new()))
        .run(&sigdb(), &token)
        .await;

    assert!(matches!(report.error, Some(ControllerError::Interrupted)));
    assert!(fabric.journal().is_empty());
    assert_eq!(fabric.open_sessions(S1), 0);
}

#[tokio::test]
async fn test_read_back_decodes_installed_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = SimulatedFabric::new();
    let db = sigdb();
    let report = orchestrator(&fabric, topology(&dir), Arc::new(RecordingEventSink::new()))
        .with_read_back(true)
        .run(&db, &CancellationToken::new())
        .await;
    assert!(report.is_success(), "{:?}", report.failure());

    let info = p4info();
    let signature_table = info.table("MyIngress.result_match").unwrap().preamble.id;
    let installed: Vec<_> = fabric
        .entries(S1)
        .into_iter()
        .filter(|e| e.table_id == signature_table)
        .collect();
    assert_eq!(installed.len(), db.len());

    for (entry, sig) in installed.iter().zip(db.signatures()) {
        let record = decode_entry(entry, &info).unwrap();
        let label_id = record.param(RESULT_PARAM).and_then(|v| v.to_u64()).unwrap();
        assert_eq!(db.label_for_id(u32::try_from(label_id).unwrap()), sig.label);
        assert_eq!(
            record.param(GENERIC_FUZZY_PARAM).and_then(|v| v.to_u64()),
            Some(u64::from(sig.is_generic_or_fuzzy()))
        );
        for (name, value) in &sig.extra_params {
            assert_eq!(record.param(name).and_then(|v| v.to_u64()), Some(*value));
        }
    }

    let s1_dump = report
        .read_back
        .iter()
        .find(|d| d.device == "s1")
        .unwrap()
        .to_string();
    assert!(s1_dump.contains("field_name: meta.p0f_metadata.wsize"));
    assert!(s1_dump.contains("ternary {"));
}

#[test]
fn test_miss_and_unrecognized_results_decode_alike() {
    let db = sigdb();
    let decoder = ResultDecoder::new(&db);
    let input = "[t0] result_match miss\n[t1] result_match hit deadbeef,\n[t2] result_match hit 3,0\n";
    let labels: Vec<DisplayLabel> = decoder
        .decode_all(std::io::Cursor::new(input))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        labels,
        vec![
            DisplayLabel::Unknown,
            DisplayLabel::Unknown,
            DisplayLabel::Label("Windows 7 or 8".into()),
        ]
    );
    assert_eq!(labels[1].to_string(), "???");
}
