use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::engine::LiveEngine;
use crate::events::{EngineEvent, ExecutionReport};
use crate::frontend::SyntaxError;
use crate::script::{ScriptFrontEnd, Value};

#[derive(Parser)]
#[command(name = "livecode")]
#[command(about = "Livecode - incremental checking and execution of scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report every syntax error in a file
    Check {
        /// Script to check
        file: PathBuf,
    },

    /// Execute successive revisions of a program in one session
    ///
    /// Each file is submitted as the next edit of the same program, so
    /// unchanged leading statements are not evaluated again.
    Run {
        /// Revisions, in submission order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Source identity shared by all revisions (default: first file path)
        #[arg(long)]
        source_id: Option<String>,

        /// Print one JSON report per revision
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load configuration before executing any command so errors show first
    let config = EngineConfig::builder()
        .config_path(cli.config.clone())
        .build()
        .context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command {
        Commands::Check { file } => {
            let text = read_source(&file)?;
            let frontend = ScriptFrontEnd::new(&config.script);
            let source_id = file.display().to_string();
            let errors = check_only(frontend, config, &text, &source_id).await?;

            if errors.is_empty() {
                println!("{}: ok", source_id);
                return Ok(());
            }
            for error in &errors {
                eprintln!("{}:{}:{}: {}", source_id, error.line, error.column, error.message);
            }
            std::process::exit(1);
        }

        Commands::Run {
            files,
            source_id,
            json,
        } => {
            let source_id = source_id.unwrap_or_else(|| files[0].display().to_string());
            let failed = run_revisions(config, &files, &source_id, json).await?;
            if failed {
                std::process::exit(1);
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Log to stderr, `RUST_LOG` wins over the configured filter
fn init_logging(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    // A subscriber may already be installed by an embedding host
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn check_only(
    frontend: ScriptFrontEnd,
    config: EngineConfig,
    text: &str,
    source_id: &str,
) -> Result<Vec<SyntaxError>> {
    let (engine, mut events) = LiveEngine::with_channel(Arc::new(frontend), config);
    engine.submit_check(text, Some(source_id), false)?;

    let errors = loop {
        match events.recv().await {
            Some(EngineEvent::CheckEnded { errors, .. }) => break errors,
            Some(_) => {}
            None => bail!("engine stopped before the check finished"),
        }
    };
    engine.shutdown();
    Ok(errors)
}

/// Result of submitting one revision
enum Revision {
    Rejected(Vec<SyntaxError>),
    Settled(ExecutionReport<Value>),
}

#[derive(Debug, Serialize)]
struct RevisionReport {
    file: String,
    source_id: String,
    errors: Vec<SyntaxError>,
    resumed_from: Option<usize>,
    evaluated: usize,
    faulted: bool,
    stdout: String,
    stderr: String,
    globals: BTreeMap<String, String>,
    locals: BTreeMap<String, String>,
}

impl RevisionReport {
    fn new(file: &Path, source_id: &str, revision: &Revision) -> Self {
        let rendered = |bindings: &BTreeMap<String, Value>| -> BTreeMap<String, String> {
            bindings
                .iter()
                .map(|(name, value)| (name.clone(), value.repr()))
                .collect()
        };
        let mut report = Self {
            file: file.display().to_string(),
            source_id: source_id.to_string(),
            errors: Vec::new(),
            resumed_from: None,
            evaluated: 0,
            faulted: false,
            stdout: String::new(),
            stderr: String::new(),
            globals: BTreeMap::new(),
            locals: BTreeMap::new(),
        };
        match revision {
            Revision::Rejected(errors) => report.errors = errors.clone(),
            Revision::Settled(settled) => {
                report.resumed_from = Some(settled.resumed_from);
                report.evaluated = settled.evaluated;
                report.faulted = settled.faulted;
                report.stdout = settled.stdout.clone();
                report.stderr = settled.stderr.clone();
                report.globals = rendered(&settled.bindings.globals);
                report.locals = rendered(&settled.bindings.locals);
            }
        }
        report
    }

    fn failed(&self) -> bool {
        self.faulted || !self.errors.is_empty()
    }
}

/// Submit each file as the next revision and wait for it to settle
///
/// Returns whether the last revision failed.
async fn run_revisions(config: EngineConfig, files: &[PathBuf], source_id: &str, json: bool) -> Result<bool> {
    let frontend = ScriptFrontEnd::new(&config.script);
    let (engine, mut events) = LiveEngine::with_channel(Arc::new(frontend), config);

    let mut last: Option<RevisionReport> = None;
    for file in files {
        let text = read_source(file)?;
        engine.submit_check(text, Some(source_id), true)?;
        let revision = next_revision(&mut events).await?;
        let report = RevisionReport::new(file, source_id, &revision);

        info!(
            file = %report.file,
            errors = report.errors.len(),
            evaluated = report.evaluated,
            "revision settled"
        );
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print_summary(&report);
        }
        last = Some(report);
    }
    engine.shutdown();

    let Some(last) = last else {
        return Ok(false);
    };
    if !json {
        print!("{}", last.stdout);
        eprint!("{}", last.stderr);
    }
    Ok(last.failed())
}

async fn next_revision(events: &mut UnboundedReceiver<EngineEvent<Value>>) -> Result<Revision> {
    loop {
        match events.recv().await {
            Some(EngineEvent::CheckEnded { errors, .. }) if !errors.is_empty() => {
                return Ok(Revision::Rejected(errors))
            }
            Some(EngineEvent::ExecutionSettled(report)) => return Ok(Revision::Settled(report)),
            Some(event) => debug!(?event, "engine event"),
            None => bail!("engine stopped before the revision settled"),
        }
    }
}

fn print_summary(report: &RevisionReport) {
    if !report.errors.is_empty() {
        for error in &report.errors {
            eprintln!("{}:{}:{}: {}", report.file, error.line, error.column, error.message);
        }
        eprintln!("{}: not executed ({} syntax errors)", report.file, report.errors.len());
        return;
    }
    let start = report.resumed_from.unwrap_or(0);
    if report.evaluated == 0 {
        eprintln!("{}: up to date at statement {}", report.file, start);
        return;
    }
    eprintln!(
        "{}: evaluated statements {}..{}{}",
        report.file,
        start + 1,
        start + report.evaluated,
        if report.faulted { " (faulted)" } else { "" }
    );
}
