//! Ledger query CLI
//!
//! Loads a JSON fixture into the in-memory backend, then either serves one
//! volumes page or verifies the write log chain.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ledger_query::{Config, Ledger, MemoryStore, Metadata, TransactionData, VolumesRequest};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about = "Bi-temporal ledger volume queries", long_about = None)]
struct Cli {
    /// Fixture describing transactions, reverts and account metadata
    #[arg(long)]
    fixture: PathBuf,

    /// TOML configuration file (falls back to LEDGER_QUERY_* variables)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one page of volumes with balances
    Volumes {
        /// Effective-time cutoff (RFC3339)
        #[arg(long)]
        pit: Option<String>,
        /// Visibility-time cutoff (RFC3339)
        #[arg(long)]
        oot: Option<String>,
        /// Rows per page
        #[arg(long)]
        page_size: Option<u64>,
        /// Token from a previous page
        #[arg(long)]
        cursor: Option<String>,
        /// File holding the predicate document
        #[arg(long)]
        query: Option<PathBuf>,
    },
    /// Recompute the log hash chain
    Verify,
}

#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    transactions: Vec<FixtureTransaction>,
    #[serde(default)]
    reverts: Vec<FixtureRevert>,
    #[serde(default)]
    accounts: HashMap<String, Metadata>,
}

#[derive(Deserialize)]
struct FixtureTransaction {
    #[serde(flatten)]
    data: TransactionData,
    inserted_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct FixtureRevert {
    id: u64,
    inserted_at: DateTime<Utc>,
    #[serde(default)]
    at_effective_date: bool,
}

fn load_store(path: &PathBuf) -> anyhow::Result<MemoryStore> {
    let raw = std::fs::read(path).with_context(|| format!("reading fixture {}", path.display()))?;
    let fixture: Fixture = serde_json::from_slice(&raw).context("parsing fixture")?;

    let store = MemoryStore::new();
    for tx in fixture.transactions {
        store.insert_transaction(tx.data, tx.inserted_at)?;
    }
    for revert in fixture.reverts {
        store.revert_transaction(revert.id, revert.inserted_at, revert.at_effective_date)?;
    }
    let now = Utc::now();
    for (address, metadata) in fixture.accounts {
        store.save_account_metadata(&address, metadata, now)?;
    }

    tracing::info!(
        movements = store.movement_count(),
        logs = store.logs().len(),
        "Fixture loaded"
    );
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    tracing::info!(service = %config.service_name, version = %config.service_version, "Starting");

    let store = load_store(&cli.fixture)?;

    match cli.command {
        Commands::Verify => {
            let logs = store.logs();
            match ledger_query::log::verify_chain(&logs) {
                Ok(()) => println!("{} logs verified", logs.len()),
                Err(id) => anyhow::bail!("log {} does not match its hash", id),
            }
        }
        Commands::Volumes {
            pit,
            oot,
            page_size,
            cursor,
            query,
        } => {
            let body = match query {
                Some(path) => std::fs::read(&path).with_context(|| format!("reading query {}", path.display()))?,
                None => Vec::new(),
            };
            let request = VolumesRequest {
                pit,
                oot,
                page_size,
                cursor,
                body,
            };

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let ledger = Ledger::new(store, config);
            let page = ledger
                .get_volumes_with_balances(&request, &cancel)
                .await
                .map_err(|e| anyhow::anyhow!("[{}] {}", e.code(), e))?;

            println!("{}", serde_json::to_string_pretty(&page)?);
        }
    }

    Ok(())
}
