//! cuffcompare wrapper
//!
//! Runs `cuffcompare` inside a private workspace and copies its outputs to
//! the destinations given on the command line. Prints the tool's version
//! banner on stdout first, then exits 0 when every required output was
//! published and 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, Level};

use toolwrap_core::config::SandboxConfig;
use toolwrap_core::cuffcompare::{
    CuffcompareOutputs, CuffcompareRequest, PROGRAM, VERSION_MARKER,
};
use toolwrap_core::version::DEFAULT_PROBE_TIMEOUT;
use toolwrap_core::{execute, probe_version, CancellationToken, ReferenceRequest};

/// Value the workflow engine passes for an unset optional dataset.
const ABSENT_DATASET: &str = "None";

#[derive(Parser, Debug)]
#[command(name = "cuffcompare-wrapper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Compare assembled transcripts to a reference annotation with cuffcompare",
    long_about = None
)]
struct Cli {
    /// Reference annotation in GTF format
    #[arg(short = 'r', long = "ref-annotation")]
    ref_annotation: Option<PathBuf>,

    /// Ignore reference transcripts not overlapped by any input transfrag
    #[arg(short = 'R', long = "ignore-nonoverlap")]
    ignore_nonoverlap: bool,

    /// Use genomic sequence data to classify transfrags
    #[arg(short = 's', long = "use-seq-data")]
    use_seq_data: bool,

    /// Genome build key used to look up the sequence
    #[arg(long)]
    dbkey: Option<String>,

    /// Directory holding the sequence pointer table
    #[arg(long = "index-dir", env = "GALAXY_DATA_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Sequence file from the user's history; overrides the pointer table
    #[arg(long = "ref-file")]
    ref_file: Option<String>,

    /// First set of assembled transcripts (GTF)
    #[arg(short = '1', long)]
    input1: PathBuf,

    /// Second set of assembled transcripts (GTF)
    #[arg(short = '2', long)]
    input2: Option<PathBuf>,

    /// Destination for the accuracy report
    #[arg(short = 'A', long = "transcripts-accuracy-output")]
    accuracy_output: Option<PathBuf>,

    /// Destination for the combined transcripts GTF
    #[arg(short = 'B', long = "transcripts-combined-output")]
    combined_output: Option<PathBuf>,

    /// Destination for the tracking file (two inputs only)
    #[arg(short = 'C', long = "transcripts-tracking-output")]
    tracking_output: Option<PathBuf>,

    #[arg(long = "input1-tmap-output")]
    input1_tmap_output: Option<PathBuf>,

    #[arg(long = "input1-refmap-output")]
    input1_refmap_output: Option<PathBuf>,

    #[arg(long = "input2-tmap-output")]
    input2_tmap_output: Option<PathBuf>,

    #[arg(long = "input2-refmap-output")]
    input2_refmap_output: Option<PathBuf>,

    /// cuffcompare executable
    #[arg(long, env = "CUFFCOMPARE_PATH", default_value = PROGRAM)]
    program: String,

    /// Kill the tool after this many seconds
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Parent directory for temporary workspaces
    #[arg(long = "workspace-root")]
    workspace_root: Option<PathBuf>,

    /// Do not run the tool once to print its version
    #[arg(long = "skip-version-probe")]
    skip_version_probe: bool,

    /// Write a JSON report of the published outputs to this file
    #[arg(long = "report-json")]
    report_json: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn ref_file(&self) -> Option<PathBuf> {
        self.ref_file
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != ABSENT_DATASET)
            .map(PathBuf::from)
    }

    fn request(&self) -> Result<CuffcompareRequest> {
        let sequence = if self.use_seq_data {
            let (Some(index_dir), Some(dbkey)) = (&self.index_dir, &self.dbkey) else {
                bail!("--use-seq-data needs both --index-dir and --dbkey");
            };
            let mut lookup = ReferenceRequest::new(index_dir, dbkey);
            if let Some(file) = self.ref_file() {
                lookup = lookup.with_override(file);
            }
            Some(lookup)
        } else {
            None
        };

        Ok(CuffcompareRequest {
            program: self.program.clone(),
            ref_annotation: self.ref_annotation.clone(),
            ignore_nonoverlap: self.ignore_nonoverlap,
            sequence,
            input1: self.input1.clone(),
            input2: self.input2.clone(),
            outputs: CuffcompareOutputs {
                accuracy: self.accuracy_output.clone(),
                combined: self.combined_output.clone(),
                tracking: self.tracking_output.clone(),
                input1_tmap: self.input1_tmap_output.clone(),
                input1_refmap: self.input1_refmap_output.clone(),
                input2_tmap: self.input2_tmap_output.clone(),
                input2_refmap: self.input2_refmap_output.clone(),
            },
        })
    }

    /// Environment defaults, then command-line overrides.
    fn sandbox_config(&self) -> Result<SandboxConfig> {
        let mut config = SandboxConfig::from_env()?;
        if let Some(root) = &self.workspace_root {
            config = config.with_workspace_root(root);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    toolwrap_core::init_tracing(cli.json, level);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error running cuffcompare. {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    if !cli.skip_version_probe {
        match probe_version(&cli.program, VERSION_MARKER, DEFAULT_PROBE_TIMEOUT).await {
            Some(banner) => println!("{banner}"),
            None => println!("Could not determine Cuffcompare version"),
        }
    }

    let config = cli.sandbox_config()?;
    let invocation = cli.request()?.into_invocation()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let report = execute(&invocation, &config, cancel).await?;
    info!(
        invocation_id = %report.id,
        published = report.publish.published.len(),
        duration_ms = report.duration_ms,
        "cuffcompare finished"
    );

    if let Some(path) = &cli.report_json {
        let body = serde_json::to_vec_pretty(&report)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    Ok(())
}
