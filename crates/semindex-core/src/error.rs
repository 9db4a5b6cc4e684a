//! Error types for semindex-core.
//!
//! Uses a hierarchical error enum so callers can pattern-match on the
//! subsystem that failed. The orchestrator treats each variant's fatality
//! per its own propagation rules; this type only carries what is needed to
//! log and classify a failure.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all semindex-core operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid or missing configuration. Fatal; surfaces to the caller.
    #[error("configuration error: {details}")]
    Configuration {
        /// What's wrong with the config.
        details: String,
    },

    /// A storage-layer failure: connection, query, constraint, not-found,
    /// transaction, or migration.
    #[error("storage error: {details}")]
    Storage {
        /// Human-readable description, including the failing batch's
        /// original error message for batched operations.
        details: String,
    },

    /// Reading sniff bytes for classification failed. Non-fatal: the file
    /// is treated as binary.
    #[error("classification error for {path}: {message}")]
    Classification {
        /// Path to the file whose sniff read failed.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// Chunking a text/code file failed. Fatal per-file.
    #[error("chunking error for {path}: {message}")]
    Chunking {
        /// Path to the file that failed to chunk.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// The embedding oracle exhausted its retries. Fatal per-file.
    #[error("embedding oracle error: {message}")]
    EmbeddingOracle {
        /// Human-readable error description.
        message: String,
    },

    /// Requested entity was not found in the store.
    #[error("not found: {entity}")]
    NotFound {
        /// Description of what was not found.
        entity: String,
    },

    /// SQLite error, wrapped directly.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error, wrapped directly.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error from the remote embedding backend.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results in semindex-core.
pub type IndexResult<T> = Result<T, IndexError>;

/// Skip reasons recorded as `status_metadata` on a file row, and as the
/// error log's `errorType` for skip-policy records. Not an error itself —
/// a skip is a recorded outcome, never raised as an `IndexError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `stat.size > maxFileSizeBytes` and the path was not force-listed.
    FileTooLarge,
    /// Pre-flight chunk-count estimate exceeded `maxChunksPerFile * 1.5`.
    EstimatedTooManyChunks,
    /// Actual chunk count exceeded `maxChunksPerFile` after chunking.
    TooManyChunks,
}

impl SkipReason {
    /// The stable string used in `status_metadata` and the error log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::FileTooLarge => "file_too_large",
            SkipReason::EstimatedTooManyChunks => "estimated_too_many_chunks",
            SkipReason::TooManyChunks => "too_many_chunks",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
