//! filevine-dl - mirror a Filevine project's documents into a local folder.
//!
//! Usage:
//!   filevine-dl --project 123 --dest ./exports/123   Export a project
//!   filevine-dl --dry-run                            Prompt for project and destination, list only
//!   filevine-dl check                                Verify credentials
//!
//! Credentials come from `FILEVINE_PAT`, `FILEVINE_CLIENT_ID` and
//! `FILEVINE_CLIENT_SECRET`, read from the environment or a `.env` file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use filevine_dl::{
    Config, Credentials, EXIT_INTERRUPTED, Error, ExistingFileAction, Exporter, Result, RunReport,
    cancel_on_signal,
};

#[derive(Parser)]
#[command(
    name = "filevine-dl",
    version,
    about = "Download every document of a Filevine project",
    long_about = "filevine-dl lists a project's folder tree and mirrors it, documents \
                  included, under a local destination folder.\n\n\
                  Missing --project or --dest values are asked for interactively."
)]
struct Cli {
    /// Project id to export
    #[arg(short, long)]
    project: Option<String>,

    /// Destination folder
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Number of parallel downloads (default: 4)
    #[arg(short, long)]
    workers: Option<usize>,

    /// List what would be downloaded without fetching or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Log file, written alongside console output
    #[arg(long, default_value = "download_log.txt")]
    log: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// What to do with files that already exist: overwrite, skip or error
    #[arg(long)]
    existing: Option<ExistingFileAction>,

    /// Write the final report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Verify credentials and print the organization and user ids
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging(&cli.log) {
        eprintln!("error: cannot open log file {}: {e}", cli.log.display());
        return ExitCode::FAILURE;
    }

    let cancel = cancel_on_signal(CancellationToken::new());
    match run(cli, cancel.clone()).await {
        Ok(()) if cancel.is_cancelled() => ExitCode::from(EXIT_INTERRUPTED),
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cancelled) => {
            eprintln!("interrupted before any download started");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(workers) = cli.workers {
        config.download.workers = workers;
    }
    if cli.dry_run {
        config.download.dry_run = true;
    }
    if let Some(action) = cli.existing {
        config.download.existing_files = action;
    }

    let exporter = Exporter::new(config, credentials_from_env()?)?;

    if let Some(Command::Check) = cli.command {
        let session = exporter.check_connection().await?;
        println!(
            "Connection OK (org {}, user {})",
            session.org_id, session.user_id
        );
        return Ok(());
    }

    let project = match cli.project {
        Some(project) => project,
        None => prompt("project", "Enter the project ID: ")?,
    };
    let dest = match cli.dest {
        Some(dest) => dest,
        None => PathBuf::from(prompt("dest", "Enter the destination folder: ")?),
    };

    match exporter.export(&project, &dest, cancel).await {
        Ok(report) => publish(&report, cli.report.as_deref()),
        Err(Error::Aborted { report, cause }) => {
            publish(&report, cli.report.as_deref())?;
            Err(cause.into())
        }
        Err(e) => Err(e),
    }
}

/// Print the report and optionally save it as JSON
fn publish(report: &RunReport, json_path: Option<&Path>) -> Result<()> {
    println!("{report}");

    if let Some(path) = json_path {
        report.write_json(path)?;
        tracing::info!(path = %path.display(), "Report written");
    }
    Ok(())
}

fn credentials_from_env() -> Result<Credentials> {
    Ok(Credentials::new(
        env_var("FILEVINE_PAT")?,
        env_var("FILEVINE_CLIENT_ID")?,
        env_var("FILEVINE_CLIENT_SECRET")?,
    ))
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| Error::config(name, format!("{name} is not set (environment or .env)")))
}

fn prompt(key: &str, question: &str) -> Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(Error::config(key, format!("a value for --{key} is required")));
    }
    Ok(answer.to_string())
}

/// Console layer on stderr plus a plain-text file layer, both filtered by
/// `RUST_LOG` (default `info`)
fn init_logging(log_file: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter()),
        )
        .init();

    Ok(())
}
