//! semindex MCP server.
//!
//! Exposes semantic code search to AI coding agents over the Model
//! Context Protocol, via stdio transport.

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use semindex_core::config::Config;
use semindex_core::orchestrator::Engine;
use semindex_mcp::tools;
use std::path::PathBuf;

/// semindex MCP server
#[derive(Parser, Debug)]
#[command(name = "semindex-mcp", version, about)]
struct Args {
    /// Path to the already-indexed repository to serve.
    #[arg(long, default_value = ".")]
    repo: String,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn store_path(repo_path: &str) -> PathBuf {
    PathBuf::from(repo_path).join(".semindex").join("index.sqlite3")
}

fn log_dir(repo_path: &str) -> PathBuf {
    PathBuf::from(repo_path).join(".semindex").join("logs")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let repo_path = std::path::Path::new(&args.repo);
    if !repo_path.exists() {
        anyhow::bail!("repository path does not exist: {}", args.repo);
    }

    let engine = Engine::open(&store_path(&args.repo), &log_dir(&args.repo), Config::default())
        .context("failed to open engine; has this repository been indexed with `semindex index`?")?;

    tracing::info!(repo = %args.repo, "semindex MCP server starting on stdio");

    let server = tools::SemindexServer::new(engine);
    let service = server.serve(stdio()).await.context("failed to start MCP server")?;
    service.waiting().await.context("MCP server exited with an error")?;

    Ok(())
}
