//! Integration tests for MCP tool handlers.
//!
//! Each test builds a real in-memory-backed `Engine`, ingests a small
//! fixture repository, and exercises the tool router the same way an
//! MCP client would.

use semindex_core::config::Config;
use semindex_core::orchestrator::{Engine, IngestOptions};
use semindex_mcp::tools::{FindSimilarParams, SearchCodeParams, SemindexServer};
use rmcp::handler::server::wrapper::Parameters;
use tempfile::TempDir;

fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.provider = "transformers".to_string();
    config.embedding.dimensions = 8;
    config
}

async fn indexed_server() -> (SemindexServer, TempDir) {
    let repo_dir = TempDir::new().expect("create temp dir");
    std::fs::write(
        repo_dir.path().join("auth.py"),
        "class AuthService:\n    def validate_token(self, token):\n        return bool(token)\n",
    )
    .unwrap();
    std::fs::write(
        repo_dir.path().join("config.rs"),
        "pub struct Config { pub port: u16 }\n",
    )
    .unwrap();

    let log_dir = TempDir::new().expect("create log dir");
    let mut engine = Engine::open_in_memory(log_dir.path(), test_config()).expect("open engine");
    engine
        .ingest("demo", repo_dir.path(), &IngestOptions::default(), None)
        .await
        .expect("ingest fixture repo");

    (SemindexServer::new(engine), repo_dir)
}

fn text_of(result: &rmcp::model::CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn search_code_finds_relevant_file() {
    let (server, _dir) = indexed_server().await;

    let params = SearchCodeParams {
        query: "validate_token".to_string(),
        limit: Some(5),
        classification: None,
    };
    let result = server.search_code(Parameters(params)).await.expect("search_code call");
    let text = text_of(&result);
    assert!(text.contains("auth.py"), "expected auth.py in results, got: {text}");
}

#[tokio::test]
async fn search_code_with_no_match_reports_no_results() {
    let (server, _dir) = indexed_server().await;

    let params = SearchCodeParams {
        query: "xyzzy_nonexistent_symbol_12345".to_string(),
        limit: Some(5),
        classification: None,
    };
    let result = server.search_code(Parameters(params)).await.expect("search_code call");
    let text = text_of(&result);
    // A brute-force cosine search over a placeholder embedder never
    // returns zero results for a non-empty store, but it must not error.
    assert!(!text.is_empty());
}

#[tokio::test]
async fn search_code_rejects_unknown_classification() {
    let (server, _dir) = indexed_server().await;

    let params = SearchCodeParams {
        query: "token".to_string(),
        limit: Some(5),
        classification: Some("spreadsheet".to_string()),
    };
    let result = server.search_code(Parameters(params)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn search_code_respects_limit() {
    let (server, _dir) = indexed_server().await;

    let params = SearchCodeParams { query: "token".to_string(), limit: Some(1), classification: None };
    let result = server.search_code(Parameters(params)).await.expect("search_code call");
    let text = text_of(&result);
    assert_eq!(text.matches("## Result").count(), 1);
}

#[tokio::test]
async fn find_similar_code_finds_the_matching_chunk() {
    let (server, _dir) = indexed_server().await;

    let params = FindSimilarParams {
        code: "pub struct Config { pub port: u16 }".to_string(),
        limit: Some(5),
    };
    let result = server.find_similar_code(Parameters(params)).await.expect("find_similar_code call");
    let text = text_of(&result);
    assert!(text.contains("config.rs"), "expected config.rs in results, got: {text}");
}

#[tokio::test]
async fn find_similar_code_on_empty_index_reports_no_results() {
    let log_dir = TempDir::new().expect("create log dir");
    let engine = Engine::open_in_memory(log_dir.path(), test_config()).expect("open engine");
    let server = SemindexServer::new(engine);

    let params = FindSimilarParams { code: "fn main() {}".to_string(), limit: Some(5) };
    let result = server.find_similar_code(Parameters(params)).await.expect("find_similar_code call");
    let text = text_of(&result);
    assert!(text.contains("No results found"));
}
