//! # Runbook Harness CLI (`rbh`)
//!
//! The `rbh` binary ingests runbooks into per-agent collections, matches
//! incoming alerts against them and serves the same operations over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! rbh --config ./config/rbh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rbh ingest <tenant> <agent> <path>` | Add `.txt`/`.md` files to a collection |
//! | `rbh extract [text]` | Show the names, codes and keywords parsed from an alert |
//! | `rbh match <tenant> <agent> [text]` | Ranked matches for an alert |
//! | `rbh analyze <tenant> <agent> [text]` | Answer an alert |
//! | `rbh drop <tenant> <agent>` | Delete a collection |
//! | `rbh stats <tenant> <agent>` | Collection size and document count |
//! | `rbh logs` | Recent analyses |
//! | `rbh doctor` | Check log database, embedder and completion backend |
//! | `rbh serve` | Start the HTTP server |
//! | `rbh completions <shell>` | Print shell completions |
//!
//! Alert text is read from stdin when not given as an argument, so
//! multi-line alerts can be piped in.

use clap::{CommandFactory, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use runbook_harness::{
    analysis_log, analyze, config, doctor, ingest, logging, server, stats,
};
use runbook_harness_core::keywords::extract_candidates;
use runbook_harness_core::models::CollectionKey;

/// Runbook Harness: match alerts to runbooks and answer from them.
#[derive(Parser)]
#[command(
    name = "rbh",
    about = "Runbook Harness: alert-to-runbook matching and constrained answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rbh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add plain-text documents to a collection.
    ///
    /// Each `.txt` or `.md` file under `path` becomes one document.
    /// Re-ingesting a file replaces its previous version.
    Ingest {
        tenant_id: u64,
        agent_id: u64,
        path: PathBuf,
    },

    /// Show what the keyword extractor finds in an alert. Needs no config.
    Extract {
        /// Alert text; read from stdin when omitted.
        text: Option<String>,
    },

    /// Print ranked matches for an alert without generating an answer.
    Match {
        tenant_id: u64,
        agent_id: u64,
        /// Alert text; read from stdin when omitted.
        text: Option<String>,
        /// Number of results (defaults to `retrieval.result_count`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer an alert using the agent's collection.
    Analyze {
        tenant_id: u64,
        agent_id: u64,
        /// Alert text; read from stdin when omitted.
        text: Option<String>,
        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete a collection and all its documents.
    Drop { tenant_id: u64, agent_id: u64 },

    /// Show collection statistics.
    Stats { tenant_id: u64, agent_id: u64 },

    /// List recent analyses from the log.
    Logs {
        #[arg(long, requires = "agent_id")]
        tenant_id: Option<u64>,
        #[arg(long, requires = "tenant_id")]
        agent_id: Option<u64>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Check that configured backends are reachable.
    Doctor,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions { shell: clap_complete::Shell },
}

fn alert_text(arg: Option<String>) -> anyhow::Result<String> {
    match arg {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "rbh", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Extract { text } => {
            let query = extract_candidates(&alert_text(text.clone())?);
            println!("names:    {}", query.candidate_names.join(", "));
            println!("codes:    {}", query.codes.join(", "));
            println!(
                "keywords: {}",
                query.keywords.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init_tracing(&cfg.log.level);

    match cli.command {
        Commands::Ingest {
            tenant_id,
            agent_id,
            path,
        } => {
            ingest::run_ingest(&cfg, CollectionKey::new(tenant_id, agent_id), &path).await?;
        }
        Commands::Match {
            tenant_id,
            agent_id,
            text,
            k,
        } => {
            let text = alert_text(text)?;
            analyze::run_match(&cfg, CollectionKey::new(tenant_id, agent_id), &text, k).await?;
        }
        Commands::Analyze {
            tenant_id,
            agent_id,
            text,
            json,
        } => {
            let text = alert_text(text)?;
            analyze::run_analyze(&cfg, CollectionKey::new(tenant_id, agent_id), &text, json)
                .await?;
        }
        Commands::Drop {
            tenant_id,
            agent_id,
        } => {
            let key = CollectionKey::new(tenant_id, agent_id);
            let service = analyze::AlertService::from_config(&cfg).await?;
            if !service.drop_collection(key).await {
                anyhow::bail!("Failed to drop collection {}", key);
            }
            println!("dropped collection {}", key);
        }
        Commands::Stats {
            tenant_id,
            agent_id,
        } => {
            stats::run_stats(&cfg, CollectionKey::new(tenant_id, agent_id)).await?;
        }
        Commands::Logs {
            tenant_id,
            agent_id,
            limit,
        } => {
            let key = match (tenant_id, agent_id) {
                (Some(t), Some(a)) => Some(CollectionKey::new(t, a)),
                _ => None,
            };
            analysis_log::run_logs(&cfg, key, limit).await?;
        }
        Commands::Doctor => {
            doctor::run_doctor(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } | Commands::Extract { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
