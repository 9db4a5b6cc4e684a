//! MCP tool definitions for semindex.
//!
//! Exposes C9's `search`/`find_similar` contract as two MCP tools, as a
//! thin pass-through over `Engine` — no domain logic lives here.
//!
//! ## Thread safety
//!
//! `Engine` wraps a `rusqlite::Connection`, which is `!Sync`. It is
//! wrapped in a `tokio::sync::Mutex` so the MCP server can share one
//! instance across concurrent tool calls.

use std::sync::Arc;

use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*, tool, tool_handler,
    tool_router, ErrorData as McpError, ServerHandler,
};
use semindex_core::orchestrator::Engine;
use semindex_core::search::SearchOptions;
use serde::Deserialize;
use tokio::sync::Mutex;

/// Parameters for the `search_code` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchCodeParams {
    /// Natural-language or keyword query.
    pub query: String,
    /// Maximum number of results to return (default: 10).
    pub limit: Option<usize>,
    /// Restrict results to one classification (`code`, `text`, `binary`).
    pub classification: Option<String>,
}

/// Parameters for the `find_similar_code` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindSimilarParams {
    /// A code snippet to find semantically similar chunks for.
    pub code: String,
    /// Maximum number of results to return (default: 10).
    pub limit: Option<usize>,
}

fn parse_classification(raw: Option<&str>) -> Result<Option<semindex_core::types::Classification>, McpError> {
    use semindex_core::types::Classification;
    raw.map(|c| match c {
        "code" => Ok(Classification::Code),
        "text" => Ok(Classification::Text),
        "binary" => Ok(Classification::Binary),
        other => Err(McpError::invalid_params(format!("unrecognized classification {other:?}"), None)),
    })
    .transpose()
}

fn format_results(results: &[semindex_core::types::SearchResult]) -> String {
    if results.is_empty() {
        return "No results found. Make sure the repository has been indexed first.".to_string();
    }
    let mut output = String::new();
    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "## Result {} (similarity: {:.4})\n**Repository**: {}\n**File**: {}\n```\n{}\n```\n\n",
            i + 1,
            result.similarity,
            result.repository_name,
            result.relative_path.display(),
            result.content,
        ));
    }
    output
}

/// semindex MCP server: a thin tool router over one shared `Engine`.
#[derive(Clone)]
pub struct SemindexServer {
    engine: Arc<Mutex<Engine>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SemindexServer {
    /// Wrap an already-open engine.
    pub fn new(engine: Engine) -> Self {
        Self { engine: Arc::new(Mutex::new(engine)), tool_router: Self::tool_router() }
    }

    #[tool(
        name = "search_code",
        description = "Search the indexed codebase with a natural-language or keyword query. Returns ranked code chunks with repository, file path, similarity score, and source text."
    )]
    async fn search_code(&self, params: Parameters<SearchCodeParams>) -> Result<CallToolResult, McpError> {
        let classification = parse_classification(params.0.classification.as_deref())?;
        let options = SearchOptions { repository_id: None, limit: params.0.limit, classification };

        let engine = self.engine.lock().await;
        match engine.search(&params.0.query, &options).await {
            Ok(results) => Ok(CallToolResult::success(vec![Content::text(format_results(&results))])),
            Err(e) => Err(McpError::internal_error(format!("search failed: {e}"), None)),
        }
    }

    #[tool(
        name = "find_similar_code",
        description = "Given a code snippet, find semantically similar chunks already indexed in the codebase."
    )]
    async fn find_similar_code(&self, params: Parameters<FindSimilarParams>) -> Result<CallToolResult, McpError> {
        let options = SearchOptions { repository_id: None, limit: params.0.limit, classification: None };

        let engine = self.engine.lock().await;
        match engine.find_similar(&params.0.code, &options).await {
            Ok(results) => Ok(CallToolResult::success(vec![Content::text(format_results(&results))])),
            Err(e) => Err(McpError::internal_error(format!("find_similar failed: {e}"), None)),
        }
    }
}

#[tool_handler]
impl ServerHandler for SemindexServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "semindex exposes a semantic index over a code repository. Use search_code for \
                 natural-language or keyword queries, and find_similar_code to locate chunks \
                 semantically similar to a given snippet."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}
