//! CLI command definitions for secb-eval.
//!
//! `evaluate` runs a patch set through the sandbox and writes one JSONL report
//! per mode; `extract` runs the sanitizer report extractor over a saved log.

use crate::execution::DockerClient;
use crate::metrics::{export_metrics, init_metrics};
use crate::secb::{
    extract_sanitizer_report, BatchEvaluator, EvalConfig, EvalMode, EvaluationSummary,
    LocalDataset, ModeSelection, PatchSet, SandboxExecutor,
};
use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// SEC-bench patch verification.
#[derive(Parser)]
#[command(name = "secb-eval")]
#[command(about = "Verify candidate patches for memory-safety bugs in sandboxed containers")]
#[command(version)]
#[command(
    long_about = "secb-eval applies each candidate patch inside the instance's Docker image, builds the project and runs the proof-of-concept, then classifies the result under strict, medium and generous policies.\n\nExample usage:\n  secb-eval evaluate --input-file output.json --dataset secb.jsonl --mode all"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Evaluate a set of candidate patches.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Print the sanitizer report found in a saved log file.
    Extract(ExtractArgs),
}

/// Mode selection as accepted on the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Strict,
    Medium,
    Generous,
    /// Evaluate every mode and write one report per mode.
    All,
}

impl From<ModeArg> for ModeSelection {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Strict => ModeSelection::Single(EvalMode::Strict),
            ModeArg::Medium => ModeSelection::Single(EvalMode::Medium),
            ModeArg::Generous => ModeSelection::Single(EvalMode::Generous),
            ModeArg::All => ModeSelection::All,
        }
    }
}

/// Arguments for the evaluate command.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Patch input: a JSON object keyed by instance id, or JSON Lines.
    #[arg(short = 'i', long)]
    pub input_file: PathBuf,

    /// Dataset file (JSON array or JSON Lines) with `instance_id`, `work_dir`
    /// and optional `exit_code`.
    #[arg(short = 'd', long)]
    pub dataset: PathBuf,

    /// Evaluation mode.
    #[arg(short = 'm', long, value_enum, default_value_t = ModeArg::All)]
    pub mode: ModeArg,

    /// Directory for the reports. Defaults to the input file's directory.
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// YAML configuration file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Image repository prefix.
    #[arg(long, env = "SECB_IMAGE_PREFIX")]
    pub image_prefix: Option<String>,

    /// Image tag.
    #[arg(long, env = "SECB_IMAGE_TAG")]
    pub image_tag: Option<String>,

    /// Timeout in seconds for the proof-of-concept stage.
    #[arg(long, env = "SECB_POC_TIMEOUT_SECS")]
    pub poc_timeout: Option<u64>,

    /// Docker network mode for the sandbox (e.g. none, bridge).
    #[arg(long)]
    pub network: Option<String>,

    /// Number of instances evaluated concurrently.
    #[arg(short = 'p', long, default_value = "1")]
    pub parallel: usize,

    /// Print the summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Write Prometheus metrics in text format to this file when done.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

impl EvaluateArgs {
    /// Builds the evaluation configuration: defaults, then the YAML file,
    /// then environment variables and flags.
    pub fn eval_config(&self) -> anyhow::Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EvalConfig::default(),
        };

        if let Some(prefix) = &self.image_prefix {
            config = config.with_image_prefix(prefix.as_str());
        }
        if let Some(tag) = &self.image_tag {
            config = config.with_image_tag(tag.as_str());
        }
        if let Some(secs) = self.poc_timeout {
            config = config.with_poc_timeout_secs(secs);
        }
        if let Some(network) = &self.network {
            config = config.with_network_mode(network.as_str());
        }

        config.validate()?;
        Ok(config)
    }

    /// Directory the reports are written to.
    pub fn report_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => match self.input_file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }
}

/// Arguments for the extract command.
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Log file to scan.
    pub log_file: PathBuf,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Evaluate(args) => run_evaluate_command(args).await,
        Commands::Extract(args) => run_extract_command(&args),
    }
}

async fn run_evaluate_command(args: EvaluateArgs) -> anyhow::Result<()> {
    let config = args.eval_config()?;
    let selection = ModeSelection::from(args.mode);

    if args.metrics_file.is_some() {
        init_metrics().context("Failed to initialize metrics")?;
    }

    let patches = PatchSet::from_path(&args.input_file)?;
    let dataset = LocalDataset::from_path(&args.dataset)?;
    info!(
        "Loaded {} patches from {} and {} dataset entries from {}",
        patches.len(),
        args.input_file.display(),
        dataset.len(),
        args.dataset.display()
    );

    let docker = DockerClient::new()?;
    let executor = SandboxExecutor::new(docker, config);
    let evaluator = BatchEvaluator::new(executor, selection).with_parallel(args.parallel);

    let run = evaluator.evaluate(&patches, &dataset).await?;
    let report_dir = args.report_dir();
    let reports = run.sink.write_reports(&report_dir, selection)?;
    for path in &reports {
        info!("Report written to {}", path.display());
    }

    let mut summary = run.summary;
    summary.reports = reports;

    if let Some(path) = &args.metrics_file {
        fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&summary)?;
        println!("{json}");
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &EvaluationSummary) {
    println!("\n=== SEC-bench Evaluation Results ===");
    println!("Instances:      {}", summary.instances);
    println!("Duration:       {:.1}s", summary.duration_secs());
    println!();

    for mode in &summary.modes {
        println!(
            "  {:<9} {}/{} passed ({:.1}%)  timeouts={} no_patch={} infra={}",
            mode.mode.as_str(),
            mode.succeeded,
            mode.total,
            mode.success_rate * 100.0,
            mode.timeouts,
            mode.no_patch,
            mode.infra_failures,
        );
    }

    if !summary.reports.is_empty() {
        println!();
        for path in &summary.reports {
            println!("  report: {}", path.display());
        }
    }
}

fn run_extract_command(args: &ExtractArgs) -> anyhow::Result<()> {
    let logs = read_log(&args.log_file)?;

    match extract_sanitizer_report(&logs) {
        Some(report) => println!("{report}"),
        None => println!("No sanitizer report found in {}", args.log_file.display()),
    }

    Ok(())
}

fn read_log(path: &Path) -> anyhow::Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read log file {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
