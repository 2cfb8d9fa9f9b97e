//! # Docket CLI (`docket`)
//!
//! Runs the full pipeline over one case folder.
//!
//! ## Usage
//!
//! ```bash
//! docket <folder> [--config ./config/docket.toml]
//! ```
//!
//! `<folder>` is resolved under `paths.data_root`. Stage artifacts are
//! written to `paths.results_dir` as `<folder>_<stage>_results.json`.
//!
//! Exit status is 0 when every stage completed and 1 otherwise, usage errors
//! included. The reason for a failure is printed to stdout; progress logs go to stderr and are
//! filtered with `RUST_LOG` (default `info`).

use clap::error::ErrorKind;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use docket::config::{self, Config};
use docket::pipeline::{Pipeline, ProcessingState};

/// Docket: version resolution and field reconciliation for folders of
/// scanned legal documents.
#[derive(Parser)]
#[command(
    name = "docket",
    about = "Docket: version resolution and reconciliation for scanned legal documents",
    version,
    long_about = "Docket reads a folder of scanned company documents, classifies them, \
    orders each category into a version history, diffs adjacent versions, and builds a \
    reconciled report where the newest document wins and older ones fill the gaps."
)]
struct Cli {
    /// Case folder name, resolved under `paths.data_root`.
    folder: PathBuf,

    /// Path to configuration file (TOML).
    ///
    /// When omitted, built-in defaults are used: local text extraction,
    /// keyword classification and no language model.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            println!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    let folder_path = cfg.paths.data_root.join(&cli.folder);
    if !folder_path.is_dir() {
        println!("Error: folder {} does not exist", folder_path.display());
        return Ok(ExitCode::FAILURE);
    }
    let folder_id = folder_id(&cli.folder);

    let pipeline = Pipeline::from_config(&cfg)?;
    let state = pipeline.run(&folder_id, &folder_path).await;

    print_summary(&state, &cfg.paths.results_dir);

    match &state.error {
        Some(failure) => {
            println!(
                "Pipeline failed at stage {}: {}",
                failure.stage, failure.message
            );
            Ok(ExitCode::FAILURE)
        }
        None => {
            println!("ok");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Last path component of the folder argument, used in artifact names.
fn folder_id(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| folder.to_string_lossy().to_string())
}

fn print_summary(state: &ProcessingState, results_dir: &Path) {
    println!("docket {}", state.folder_id);
    println!("  documents processed: {}", state.ocr_results.len());
    println!("  documents excluded: {}", state.excluded.len());
    for doc in &state.excluded {
        println!("    {}: {}", doc.filename, doc.reason);
    }
    for (category, chain) in &state.versioning_results {
        println!("  {}: {} version(s)", category, chain.len());
    }
    let comparisons: usize = state.comparison_results.values().map(Vec::len).sum();
    println!("  comparisons: {}", comparisons);
    if let Some(report) = &state.report_results {
        let empty = report.header.empty_fields().len()
            + report
                .sections
                .values()
                .map(|r| r.empty_fields().len())
                .sum::<usize>();
        println!("  report ({}): {} empty field(s)", report.report_category, empty);
    }
    println!("  results: {}", results_dir.display());
}
