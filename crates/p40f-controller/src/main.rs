//! p40f-controller entry point.
//!
//! `run` installs the pipeline, host routes and p0f rules on every device of
//! the topology; `decode` turns a file of classification results into labels.

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use p0f_sigdb::SignatureDatabase;
use p40f_controller::{ControllerError, InstallationOrchestrator, ResultDecoder, Topology};
use p4_runtime::{ForwardingPipelineConfig, P4Info, SimulatedFabric, SwitchConnector};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status of a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// P4Runtime controller for the p40f fingerprinting pipeline
#[derive(Parser, Debug)]
#[command(name = "p40f-controller")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the pipeline, host routes and p0f rules on every device
    Run(RunArgs),
    /// Translate classification results into OS labels
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// P4Info file (JSON) from p4c
    #[arg(long, default_value = "./build/p40f.p4info.json")]
    p4info: PathBuf,

    /// BMv2 JSON file from p4c
    #[arg(long = "bmv2-json", default_value = "./build/p40f.json")]
    bmv2_json: PathBuf,

    /// Topology file (TOML); the built-in two-switch lab when omitted
    #[arg(long)]
    topology: Option<PathBuf>,

    /// p0f signature database (JSON)
    #[arg(long, default_value = "./p0f.sigdb.json")]
    sigdb: PathBuf,

    /// Read every table back after installation and print it
    #[arg(long)]
    read_back: bool,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// p0f signature database (JSON)
    #[arg(long, default_value = "./p0f.sigdb.json")]
    sigdb: PathBuf,

    /// File of raw result lines
    #[arg(long, default_value = "grep_result.txt")]
    input: PathBuf,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Compiler outputs a run cannot start without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineFile {
    P4Info,
    Bmv2Json,
}

impl PipelineFile {
    fn kind(self) -> &'static str {
        match self {
            PipelineFile::P4Info => "p4info",
            PipelineFile::Bmv2Json => "BMv2 JSON",
        }
    }
}

/// First pipeline file that does not exist, p4info first.
fn missing_pipeline_file(args: &RunArgs) -> Option<(PipelineFile, &Path)> {
    [
        (PipelineFile::P4Info, args.p4info.as_path()),
        (PipelineFile::Bmv2Json, args.bmv2_json.as_path()),
    ]
    .into_iter()
    .find(|(_, path)| !path.exists())
}

fn missing_file_hint(file: PipelineFile, path: &Path) -> String {
    format!(
        "\n{} file not found: {}\nHave you run 'make'?",
        file.kind(),
        path.display()
    )
}

/// Prints the `run` usage and the missing-file hint.
fn missing_file(file: PipelineFile, path: &Path) -> ExitCode {
    let mut cmd = Cli::command();
    if let Some(run) = cmd.find_subcommand_mut("run") {
        let _ = run.print_help();
    }
    println!("{}", missing_file_hint(file, path));
    ExitCode::FAILURE
}

async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    run_with(args, Arc::new(SimulatedFabric::new())).await
}

async fn run_with(
    args: RunArgs,
    connector: Arc<dyn SwitchConnector>,
) -> anyhow::Result<ExitCode> {
    if let Some((file, path)) = missing_pipeline_file(&args) {
        return Ok(missing_file(file, path));
    }

    let p4info = P4Info::load(&args.p4info)
        .with_context(|| format!("loading {}", args.p4info.display()))?;
    let device_config = tokio::fs::read(&args.bmv2_json)
        .await
        .with_context(|| format!("reading {}", args.bmv2_json.display()))?;
    let topology = match &args.topology {
        Some(path) => Topology::load(path)?,
        None => Topology::default(),
    };
    let sigdb = SignatureDatabase::load(&args.sigdb)?;

    info!(
        devices = topology.devices.len(),
        host_routes = topology.host_routes.len(),
        signatures = sigdb.len(),
        "Starting p40f controller"
    );
    warn!("No hardware P4Runtime client linked; running against simulated switches");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down.");
            on_interrupt.cancel();
        }
    });

    let orchestrator = InstallationOrchestrator::new(
        connector,
        topology,
        ForwardingPipelineConfig::new(Arc::new(p4info), device_config),
    )
    .with_read_back(args.read_back);
    let report = orchestrator.run(&sigdb, &cancel).await;

    for dump in &report.read_back {
        println!("\n{}", dump);
    }
    println!("{}", report.summary());

    Ok(match report.failure() {
        None => ExitCode::SUCCESS,
        Some(ControllerError::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Some(e) => {
            error!("Run failed at {} stage: {}", e.stage(), e);
            ExitCode::FAILURE
        }
    })
}

fn decode(args: DecodeArgs) -> anyhow::Result<ExitCode> {
    let sigdb = SignatureDatabase::load(&args.sigdb)?;
    let decoder = ResultDecoder::new(&sigdb);
    let labels = decoder
        .decode_path(&args.input)?
        .map(|label| label.map(|l| l.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    println!("{:#?}", labels);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Decode(args) => decode(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run_args(dir: &Path) -> RunArgs {
        RunArgs {
            p4info: dir.join("p40f.p4info.json"),
            bmv2_json: dir.join("p40f.json"),
            topology: None,
            sigdb: dir.join("p0f.sigdb.json"),
            read_back: false,
        }
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["p40f-controller", "run"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.p4info, PathBuf::from("./build/p40f.p4info.json"));
        assert_eq!(args.bmv2_json, PathBuf::from("./build/p40f.json"));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_missing_p4info_reported_first() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path());
        let (file, path) = missing_pipeline_file(&args).unwrap();
        assert_eq!(file, PipelineFile::P4Info);
        assert_eq!(path, args.p4info.as_path());
        assert_eq!(
            missing_file_hint(file, path),
            format!("\np4info file not found: {}\nHave you run 'make'?", path.display())
        );
    }

    #[test]
    fn test_missing_bmv2_json() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path());
        std::fs::write(&args.p4info, "{}").unwrap();
        let (file, path) = missing_pipeline_file(&args).unwrap();
        assert_eq!(file, PipelineFile::Bmv2Json);
        assert!(missing_file_hint(file, path).contains("BMv2 JSON file not found"));

        std::fs::write(&args.bmv2_json, "{}").unwrap();
        assert_eq!(missing_pipeline_file(&args), None);
    }

    #[tokio::test]
    async fn test_missing_pipeline_file_contacts_no_device() {
        let dir = tempfile::tempdir().unwrap();
        let fabric = SimulatedFabric::new();

        let args = run_args(dir.path());
        run_with(args, Arc::new(fabric.clone())).await.unwrap();
        assert!(fabric.journal().is_empty());

        let args = run_args(dir.path());
        std::fs::write(&args.p4info, "{}").unwrap();
        run_with(args, Arc::new(fabric.clone())).await.unwrap();
        assert!(fabric.journal().is_empty());
    }
}
