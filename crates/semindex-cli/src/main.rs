//! semindex CLI.
//!
//! A thin driver over `semindex_core::Engine`: parses arguments, opens an
//! engine against a per-repository store, and prints results. It owns no
//! domain logic of its own.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use semindex_core::config::Config;
use semindex_core::orchestrator::{Engine, IngestOptions};
use semindex_core::search::SearchOptions;
use semindex_core::types::Classification;

#[derive(Parser, Debug)]
#[command(name = "semindex", version, about = "Semantic index for code repositories")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Log level passed to `tracing_subscriber`'s `EnvFilter`.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index (or re-index) a repository.
    Index {
        /// Path to the repository root.
        #[arg(default_value = ".")]
        path: String,

        /// Process only files that are demonstrably unfinished.
        #[arg(long)]
        resume: bool,

        /// Bypass size/chunk-count skip gates for this path.
        #[arg(long = "force-file")]
        force_files: Vec<String>,
    },

    /// Search the indexed codebase with a natural-language query.
    Search {
        /// Search query.
        query: String,

        /// Maximum number of results.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Restrict results to one classification (`code`, `text`, `binary`).
        #[arg(long)]
        classification: Option<String>,
    },

    /// Show the repository's indexed file and chunk counts.
    Status {
        /// Path to the repository root.
        #[arg(default_value = ".")]
        path: String,
    },
}

fn store_path(repo_path: &str) -> PathBuf {
    PathBuf::from(repo_path).join(".semindex").join("index.sqlite3")
}

fn log_dir(repo_path: &str) -> PathBuf {
    PathBuf::from(repo_path).join(".semindex").join("logs")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(&cli.log_level).init();

    match cli.command {
        Commands::Index { path, resume, force_files } => {
            let repo_name = PathBuf::from(&path)
                .canonicalize()
                .unwrap_or_else(|_| PathBuf::from(&path))
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.clone());

            let mut engine = Engine::open(&store_path(&path), &log_dir(&path), Config::default())
                .context("failed to open engine")?;

            let options = IngestOptions {
                resume,
                force_files: force_files.into_iter().map(PathBuf::from).collect(),
            };

            let summary = engine
                .ingest(&repo_name, &PathBuf::from(&path), &options, None)
                .await
                .context("ingest failed")?;

            println!(
                "processed={} ingested={} unchanged={} errored={} deleted={}",
                summary.processed, summary.ingested, summary.unchanged, summary.errored, summary.deleted
            );
            for (reason, count) in &summary.skipped_by_reason {
                println!("skipped[{reason}]={count}");
            }
        }
        Commands::Search { query, limit, classification } => {
            let path = ".".to_string();
            let engine = Engine::open(&store_path(&path), &log_dir(&path), Config::default())
                .context("failed to open engine")?;

            let classification = classification
                .map(|c| match c.as_str() {
                    "code" => Ok(Classification::Code),
                    "text" => Ok(Classification::Text),
                    "binary" => Ok(Classification::Binary),
                    other => Err(anyhow::anyhow!("unrecognized classification {other:?}")),
                })
                .transpose()?;

            let options = SearchOptions { repository_id: None, limit: Some(limit), classification };
            let results = engine.search(&query, &options).await.context("search failed")?;

            for result in results {
                println!(
                    "{:.4}  {}::{}\n{}\n",
                    result.similarity,
                    result.repository_name,
                    result.relative_path.display(),
                    result.content
                );
            }
        }
        Commands::Status { path } => {
            let engine = Engine::open(&store_path(&path), &log_dir(&path), Config::default())
                .context("failed to open engine")?;

            match engine.storage().get_repository_by_path(&PathBuf::from(&path))? {
                Some(repo) => {
                    let files = engine.storage().list_files(repo.id)?;
                    println!("repository: {} ({})", repo.name, repo.path.display());
                    println!("files: {}", files.len());
                    println!("metadata: {}", repo.metadata);
                }
                None => println!("no index found for {path}; run `semindex index {path}` first"),
            }
        }
    }

    Ok(())
}
