//! Search service (C9): embed a query string and return the nearest
//! stored chunks, with repository context.

use crate::embedding::EmbeddingOracle;
use crate::error::{IndexError, IndexResult};
use crate::storage::Storage;
use crate::types::{Classification, SearchResult};

/// Optional scoping/filtering for a query.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict results to one repository.
    pub repository_id: Option<i64>,
    /// Maximum results to return. Defaults to 10 if unset.
    pub limit: Option<usize>,
    /// Restrict results to one classification.
    pub classification: Option<Classification>,
}

/// Embed `text` and return the nearest stored chunks, scoped by
/// `options.repository_id` when present and filtered by
/// `options.classification` when present.
///
/// # Errors
/// Returns an error if `text` is empty, the embedding oracle fails, or
/// the vector search fails.
pub async fn query(
    storage: &Storage,
    oracle: &dyn EmbeddingOracle,
    text: &str,
    options: &SearchOptions,
) -> IndexResult<Vec<SearchResult>> {
    if text.trim().is_empty() {
        return Err(IndexError::Configuration { details: "query text must not be empty".to_string() });
    }

    let limit = options.limit.unwrap_or(10);
    let vector = oracle.embed_one(text).await?;

    let results = match options.repository_id {
        Some(repository_id) => storage.nearest_in_repository(&vector, repository_id, limit)?,
        None => storage.nearest(&vector, limit)?,
    };

    Ok(match options.classification {
        Some(classification) => results.into_iter().filter(|r| r.classification == classification).collect(),
        None => results,
    })
}

/// Same contract as `query`, with `code` as the query text — for
/// find-similar-code use cases.
///
/// # Errors
/// See `query`.
pub async fn find_similar(
    storage: &Storage,
    oracle: &dyn EmbeddingOracle,
    code: &str,
    options: &SearchOptions,
) -> IndexResult<Vec<SearchResult>> {
    query(storage, oracle, code, options).await
}
