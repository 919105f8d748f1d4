mod config;
mod oracle;
mod pipeline;
mod report;
mod store;
mod tracker;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{secs, Config};
use crate::oracle::AnthropicOracle;
use crate::pipeline::apply::{self, ApplyOptions};
use crate::pipeline::classify::{Classifier, ClassifyOptions};
use crate::pipeline::review::{self, TerminalReviewer};
use crate::pipeline::{ingest, PipelineError};
use crate::report::ReportKind;
use crate::store::Store;
use crate::tracker::{parse_repo, GitHubTracker};

/// Issue Triage: classifies open GitHub issues with an LLM, lets a human
/// review the proposed labels, and applies approved labels back to the tracker.
#[derive(Parser, Debug)]
#[command(name = "issue-triage", version, about)]
struct Cli {
    /// Directory holding the record store (defaults to config, then .triage)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Repository to triage as owner/name (defaults to config)
    #[arg(long, global = true)]
    repo: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the record store with the repository's open issues
    Fetch {
        /// Only compare the stored count with the live open-issue count
        #[arg(long)]
        verify: bool,
    },

    /// Classify one chunk of unclassified issues, or all of them with --all
    Classify {
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Seconds between oracle calls
        #[arg(long)]
        rate_limit: Option<f64>,

        /// Keep going chunk by chunk until every issue has been attempted
        #[arg(long)]
        all: bool,

        /// Index to start the single chunk at (defaults to the first unclassified issue)
        #[arg(long)]
        start: Option<usize>,
    },

    /// Continue classification after an interruption
    Resume {
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Seconds between oracle calls
        #[arg(long)]
        rate_limit: Option<f64>,
    },

    /// Interactively approve, modify or skip proposed labels
    Review {
        /// Skip issues before this index in canonical order
        #[arg(long, default_value_t = 0)]
        start_from: usize,

        /// Review only this issue number
        #[arg(long)]
        issue: Option<u64>,
    },

    /// Push approved label changes to the tracker
    Apply {
        /// Show what would change without touching the tracker
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Seconds to pause between batches
        #[arg(long)]
        batch_delay: Option<f64>,

        /// Re-read a random sample of applied issues and check their labels
        #[arg(long)]
        verify: bool,
    },

    /// Render a store view
    Report {
        #[arg(value_enum, default_value_t = ReportKind::Progress)]
        kind: ReportKind,

        /// Write markdown to this file instead of printing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classification and age distributions
    Stats {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Everything known about one issue
    Show {
        issue: u64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let mut config = Config::load()?;
    if let Some(repo) = cli.repo {
        config.tracker.repo = repo;
    }
    let store = Store::open(cli.data_dir.unwrap_or_else(|| config.store.dir.clone()))?;

    match cli.command {
        Command::Fetch { verify } => {
            let _span = info_span!("fetch", repo = %config.tracker.repo).entered();
            let tracker = github(&config)?;
            if verify {
                let check = ingest::verify_count(&tracker, &store).await?;
                if check.matches() {
                    println!("{} {} issues stored, {} open on tracker", "✓".green(), check.local, check.remote);
                } else {
                    println!(
                        "{} {} issues stored, {} open on tracker; run fetch to refresh",
                        "✗".red(),
                        check.local,
                        check.remote
                    );
                }
            } else {
                let count = ingest::ingest(&tracker, &store).await?;
                if count == 0 {
                    println!("No issues found.");
                } else {
                    println!("Fetched {} open issues into {}", count, store.root().display());
                }
            }
        }

        Command::Classify {
            chunk_size,
            rate_limit,
            all,
            start,
        } => {
            let oracle = anthropic(&config)?;
            let options = classify_options(&config, chunk_size, rate_limit);
            let chunk = options.chunk_size;
            let classifier = Classifier::new(&store, &oracle, options);

            if all {
                let summary = classifier.classify_all().await?;
                report::output(&report::classify_result(&summary), None)?;
            } else {
                let records = store.load_all()?;
                if records.is_empty() {
                    warn!("record store is empty; run fetch first");
                    return Ok(());
                }
                let start = start.unwrap_or_else(|| {
                    records
                        .iter()
                        .position(|r| !r.is_classified())
                        .unwrap_or(records.len())
                });
                let outcome = classifier.classify_chunk(start, chunk).await?;
                println!(
                    "Chunk {}..{}: {} classified, {} failed, {} already classified",
                    start, outcome.end, outcome.classified, outcome.failed, outcome.skipped
                );
            }
        }

        Command::Resume {
            chunk_size,
            rate_limit,
        } => {
            let oracle = anthropic(&config)?;
            let options = classify_options(&config, chunk_size, rate_limit);
            let summary = Classifier::new(&store, &oracle, options).resume().await?;
            report::output(&report::classify_result(&summary), None)?;
        }

        Command::Review { start_from, issue } => {
            let mut reviewer = TerminalReviewer::new();
            let summary = review::run_review(&store, &mut reviewer, start_from, issue)?;
            println!(
                "Reviewed {} of {} queued: {} approved ({} modified), {} skipped{}",
                summary.approved + summary.skipped,
                summary.queued,
                summary.approved,
                summary.modified,
                summary.skipped,
                if summary.quit { ", session ended early" } else { "" }
            );
        }

        Command::Apply {
            dry_run,
            batch_size,
            batch_delay,
            verify,
        } => {
            let tracker = github(&config)?;
            let options = ApplyOptions {
                dry_run,
                batch_size: batch_size.unwrap_or(config.pipeline.batch_size),
                batch_delay: secs(batch_delay.unwrap_or(config.pipeline.batch_delay_secs)),
            };
            let summary = apply::apply(&tracker, &store, &options).await?;
            report::output(&report::apply_result(&summary), None)?;

            if verify && !dry_run {
                let result = apply::verify(&tracker, &store, config.pipeline.verify_sample).await?;
                report::output(&report::verification_result(&result), None)?;
            }
        }

        Command::Report { kind, output } => {
            let built = report::build(
                kind,
                &store.load_all()?,
                &store.load_metadata()?,
                &store.load_audit()?,
            );
            report::output(&built, output.as_deref())?;
        }

        Command::Stats { output } => {
            let built = report::stats(&store.load_all()?, &store.load_metadata()?);
            report::output(&built, output.as_deref())?;
        }

        Command::Show { issue, output } => {
            let records = store.load_all()?;
            let record = records
                .iter()
                .find(|r| r.number == issue)
                .ok_or(PipelineError::IssueNotFound(issue))?;
            report::output(&report::issue_detail(record), output.as_deref())?;
        }
    }

    Ok(())
}

fn github(config: &Config) -> Result<GitHubTracker, Box<dyn std::error::Error>> {
    let repo = parse_repo(&config.tracker.repo)?;
    Ok(GitHubTracker::new(repo, config.github_token()))
}

/// Resolve the oracle credential up front so a missing key fails before any call.
fn anthropic(config: &Config) -> Result<AnthropicOracle, Box<dyn std::error::Error>> {
    let api_key = config.oracle_api_key()?;
    Ok(AnthropicOracle::new(api_key, config.oracle.model.clone()))
}

fn classify_options(config: &Config, chunk_size: Option<usize>, rate_limit: Option<f64>) -> ClassifyOptions {
    ClassifyOptions {
        chunk_size: chunk_size.unwrap_or(config.pipeline.chunk_size),
        rate_limit: secs(rate_limit.unwrap_or(config.pipeline.rate_limit_secs)),
        max_output_tokens: config.oracle.max_output_tokens,
    }
}
