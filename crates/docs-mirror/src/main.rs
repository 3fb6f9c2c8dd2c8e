mod clean;
mod config;
mod consistency;
mod error;
mod links;
mod model;
mod pipeline;
mod search;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use model::{Outcome, RunSummary};
use pipeline::RunOptions;

#[derive(Debug, Parser)]
#[command(name = "docs-mirror", about = "Manifest, index and link integrity for a local documentation mirror")]
struct Cli {
    /// Repository root holding `paths_manifest.json` and `docs/`. Defaults to the
    /// current directory.
    #[arg(long, env = "DOCS_MIRROR_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every consistency, index and link check.
    Validate {
        /// Print the full report as JSON on stdout.
        #[arg(long)]
        json: bool,
        /// Also verify file contents against the recorded SHA-256 hashes.
        #[arg(long)]
        verify_hashes: bool,
    },
    /// Rebuild `docs/.search_index.json` from the docs manifest.
    BuildIndex,
    /// Remove deprecated paths from the paths manifest and stamp provenance.
    CleanManifest {
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the canonical filename of each URL path.
    Canonicalize {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON report and canonical filenames.
    // INFO is always on; RUST_LOG adds targeted directives such as `docs_mirror=debug`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    if let Command::Canonicalize { paths } = &cli.command {
        for path in paths {
            println!("{}", mirror_common::canonical::canonicalize(path));
        }
        return Ok(());
    }

    let config = Config::from_env(cli.root)?;
    info!(
        root = %config.layout.root().display(),
        orphan_ceiling_pct = config.thresholds.orphan_ceiling_pct,
        broken_link_ceiling_pct = config.thresholds.broken_link_ceiling_pct,
        "configuration loaded"
    );

    match cli.command {
        Command::Validate { json, verify_hashes } => {
            let summary = pipeline::run(Arc::new(config), RunOptions { verify_hashes }).await?;
            log_reports(&summary);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            if !summary.passed {
                let failed: Vec<&str> = summary.failures().map(|r| r.check).collect();
                anyhow::bail!("{} checks failed: {}", failed.len(), failed.join(", "));
            }
        }
        Command::BuildIndex => {
            search::rebuild(&config.layout).inspect_err(|e| {
                error!(error = %e, "search index build failed");
            })?;
        }
        Command::CleanManifest { dry_run } => {
            let outcome = clean::run_clean(&config, dry_run)?;
            info!(removed = outcome.removed, remaining = outcome.remaining, written = outcome.written, "clean finished");
        }
        Command::Canonicalize { .. } => {}
    }
    Ok(())
}

fn log_reports(summary: &RunSummary) {
    for report in &summary.reports {
        match report.outcome {
            Outcome::Pass => info!(check = report.check, "{}", report.message),
            Outcome::Warn => warn!(check = report.check, samples = ?report.samples, "{}", report.message),
            Outcome::Fail => error!(check = report.check, samples = ?report.samples, "{}", report.message),
        }
    }
}
