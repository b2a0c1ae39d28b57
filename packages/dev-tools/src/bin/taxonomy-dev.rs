//! Taxonomy development CLI
//!
//! Loads one or more feeds into an in-memory taxonomy and runs a query
//! against it, printing JSON. Handy for checking a new feed dump before it is
//! deployed.
//!
//! Usage:
//!   cargo run -p mise-dev-tools --bin taxonomy-dev -- \
//!     --import-dir ./data/taxonomy \
//!     --feed ingredients.txt \
//!     search pom --language fr --limit 10
//!
//! Log output goes to stderr and honours `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mise_taxonomy::config::TaxonomyConfig;
use mise_taxonomy::services::QueryService;
use serde_json::json;
use std::path::PathBuf;

/// Import taxonomy feeds and query them
#[derive(Parser, Debug)]
#[command(name = "taxonomy-dev")]
struct Args {
    /// JSON configuration file; environment variables are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Import directory, overriding the configuration
    #[arg(long)]
    import_dir: Option<PathBuf>,

    /// Feed to import, relative to the import directory (repeatable)
    #[arg(long = "feed", required = true)]
    feeds: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print taxonomy and index statistics
    Stats,

    /// Prefix search
    Search {
        query: String,
        #[arg(long, default_value = "en")]
        language: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        skip: i64,
    },

    /// Show one node with its parents and children
    Get {
        id: String,
        #[arg(long, default_value = "en")]
        language: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TaxonomyConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => TaxonomyConfig::from_env()?,
    };
    if let Some(dir) = args.import_dir {
        config.import_dir = dir;
    }
    tracing::info!("Using import directory {}", config.import_dir.display());

    let service = QueryService::new(config);

    let mut reports = Vec::with_capacity(args.feeds.len());
    for feed in &args.feeds {
        let report = service
            .run_import(feed)
            .await
            .with_context(|| format!("importing {}", feed))?;
        if !report.is_clean() {
            tracing::warn!("{} records of {} failed to import", report.failed.len(), feed);
        }
        reports.push(report);
    }

    let result = match args.command {
        Command::Stats => json!({
            "taxonomy": service.stats().await,
            "index": service.index_stats().await,
        }),
        Command::Search {
            query,
            language,
            limit,
            skip,
        } => serde_json::to_value(service.search(&query, &language, limit, skip).await?)?,
        Command::Get { id, language } => serde_json::to_value(service.get(&id, &language).await?)?,
    };

    let output = json!({ "imports": reports, "result": result });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
