//! tnr-sync: batch sync and chain queries over a JSON snapshot
//!
//! Usage:
//!   cargo run --features cli --bin tnr-sync -- sync \
//!     --source hudoc --input feeds/hudoc.jsonl --state state/tracker.json
//!
//!   cargo run --features cli --bin tnr-sync -- chain --actor <uuid> --state state/tracker.json
//!   cargo run --features cli --bin tnr-sync -- nominate --actor <uuid>
//!   cargo run --features cli --bin tnr-sync -- candidates --max-priority 2 --limit 20
//!
//! Ctrl-C during a sync cancels it; committed records stay and the snapshot
//! is still saved.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tnr_tracker::{
    CandidateFilter, InMemoryStore, JsonlConnector, SanctionStatus, SyncState, SyncStatus,
    Tracker, TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "tnr-sync")]
#[command(about = "Sync source feeds into the TNR tracker and query the results")]
struct Args {
    /// YAML configuration file (TNR_* environment variables override it)
    #[arg(long, global = true, env = "TNR_CONFIG")]
    config: Option<PathBuf>,

    /// JSON snapshot holding the tracker state
    #[arg(long, global = true, env = "TNR_STATE", default_value = "tnr-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync from a JSONL feed
    Sync {
        #[arg(long)]
        source: String,
        #[arg(long)]
        input: PathBuf,
    },
    /// Reporting chain of an actor, nearest superior first
    Chain {
        #[arg(long)]
        actor: Uuid,
    },
    /// Number of actors transitively below an actor
    Centrality {
        #[arg(long)]
        actor: Uuid,
    },
    /// Flag an actor as a sanction candidate; an existing candidate is shown as is
    Nominate {
        #[arg(long)]
        actor: Uuid,
    },
    /// Ranked sanction candidates
    Candidates {
        #[arg(long, value_parser = parse_status)]
        status: Option<SanctionStatus>,
        #[arg(long)]
        max_priority: Option<u8>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Current sync status of a source
    Status {
        #[arg(long)]
        source: String,
    },
}

fn parse_status(s: &str) -> std::result::Result<SanctionStatus, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown candidate status: {}", s))
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    let config = match path {
        Some(path) => TrackerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    Ok(config.apply_env()?)
}

async fn load_store(path: &Path) -> Result<InMemoryStore> {
    if path.exists() {
        InMemoryStore::load_snapshot(path)
            .await
            .with_context(|| format!("loading snapshot {}", path.display()))
    } else {
        Ok(InMemoryStore::new())
    }
}

fn print_status(status: &SyncStatus) {
    let state = match status.state {
        SyncState::Completed => status.state.to_string().green().bold(),
        SyncState::Failed => status.state.to_string().red().bold(),
        SyncState::Syncing => status.state.to_string().yellow().bold(),
        SyncState::Idle => status.state.to_string().normal(),
    };
    let c = &status.counters;
    println!("{} {} ({})", "Source:".cyan().bold(), status.source_id, state);
    println!(
        "  seen {}  processed {}  created {}  updated {}  linked {}  unchanged {}",
        c.seen, c.processed, c.created, c.updated, c.linked, c.unchanged
    );
    println!(
        "  review {}  rejected {}  edges +{} / rejected {} / deferred {}",
        c.queued_for_review, c.rejected, c.edges_added, c.edges_rejected, c.edges_deferred
    );
    if let Some(ms) = status.duration_ms {
        println!("  duration {} ms, run #{}", ms, status.run_count);
    }
    if let Some(err) = &status.last_error {
        println!("  {} {}", "last error:".red(), err);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let store = Arc::new(load_store(&args.state).await?);
    let tracker = Tracker::new(store.clone(), config)?;

    match args.command {
        Command::Sync { source, input } => {
            let connector = JsonlConnector::new(&source, &input);
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let outcome = tracker.sync_source(&connector, &cancel).await;
            store
                .save_snapshot(&args.state)
                .await
                .with_context(|| format!("saving snapshot {}", args.state.display()))?;

            print_status(&tracker.sync_status(&source).await?);
            if let Err(err) = outcome {
                eprintln!("{} {}", "ERROR:".red().bold(), err);
                std::process::exit(1);
            }
        }
        Command::Chain { actor } => {
            let chain = tracker.reporting_chain(actor).await?;
            let root = tracker.resolver().get_actor(actor).await?;
            println!("{} {}", "Actor:".cyan().bold(), root.name);
            if chain.is_empty() {
                println!("  (no active superior)");
            }
            for (depth, id) in chain.iter().enumerate() {
                let superior = tracker.resolver().get_actor(*id).await?;
                println!("  {}{} {}", "  ".repeat(depth), "↑".dimmed(), superior.name);
            }
        }
        Command::Centrality { actor } => {
            let count = tracker.centrality(actor).await?;
            println!("{} {}", "Subordinates:".cyan().bold(), count);
        }
        Command::Nominate { actor } => {
            let candidate = tracker.scoring().nominate(actor).await?;
            store
                .save_snapshot(&args.state)
                .await
                .with_context(|| format!("saving snapshot {}", args.state.display()))?;
            let name = tracker.resolver().get_actor(actor).await?.name;
            println!(
                "{} {}  P{}  {:.3}  ({} cases, centrality {})",
                "Candidate:".cyan().bold(),
                name.bold(),
                candidate.priority_level,
                candidate.evidence_strength_score,
                candidate.breakdown.case_count,
                candidate.breakdown.centrality
            );
        }
        Command::Candidates {
            status,
            max_priority,
            limit,
        } => {
            let filter = CandidateFilter {
                status,
                max_priority_level: max_priority,
                limit,
                ..Default::default()
            };
            for candidate in tracker.candidate_list(&filter).await? {
                let actor = tracker.resolver().get_actor(candidate.actor_id).await?;
                println!(
                    "P{}  {:.3}  {:<12}  {}",
                    candidate.priority_level,
                    candidate.evidence_strength_score,
                    candidate.status.to_string(),
                    actor.name.bold()
                );
            }
        }
        Command::Status { source } => {
            print_status(&tracker.sync_status(&source).await?);
            for past in tracker.sync().history(&source).await?.iter().skip(1).take(5) {
                println!(
                    "  {} {} processed {}",
                    "previous:".dimmed(),
                    past.state,
                    past.counters.processed
                );
            }
        }
    }
    Ok(())
}
