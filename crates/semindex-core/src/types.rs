//! Core domain types shared across all semindex-core subsystems.
//!
//! These types form the API contract between modules: the row shapes the
//! storage engine reads and writes, the classification/chunking vocabulary,
//! and the events the orchestrator emits. Changing them requires updating
//! every consumer, so they should be stable and minimal.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// The three-way file-type decision produced by the classifier (C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Recognized programming language, has a language tag.
    Code,
    /// Plain prose or structured-but-non-code text (markdown, JSON, etc).
    Text,
    /// Not decodable as printable text; content is never read into the
    /// store for these files.
    Binary,
}

impl Classification {
    /// The stable string used in the storage schema's `file_type` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Code => "code",
            Classification::Text => "text",
            Classification::Binary => "binary",
        }
    }

    /// Parse the storage schema's `file_type` column back into a
    /// `Classification`. Any unrecognized value is a program error, not a
    /// data error (per the row-shape-struct re-architecture note).
    ///
    /// # Errors
    /// Returns an error if `s` is not one of `"code"`, `"text"`, `"binary"`.
    pub fn from_str_strict(s: &str) -> Result<Self, String> {
        match s {
            "code" => Ok(Classification::Code),
            "text" => Ok(Classification::Text),
            "binary" => Ok(Classification::Binary),
            other => Err(format!("unrecognized file_type column value: {other}")),
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// A repository row: the top of the ownership hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Surrogate id, stable for the repository's lifetime.
    pub id: i64,
    /// Unique within the store.
    pub name: String,
    /// Unique absolute path.
    pub path: PathBuf,
    /// Optional VCS commit tag recorded at last ingest.
    pub commit_tag: Option<String>,
    /// When this repository was first (or most recently) ingested, as a
    /// Unix timestamp in seconds.
    pub ingested_at: i64,
    /// Free-form metadata bag, stored as a JSON object.
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// A file row.
///
/// Invariant: `classification == Binary` iff `content.is_none() &&
/// binary_metadata.is_some()`; the inverse holds for `Code`/`Text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Surrogate id.
    pub id: i64,
    /// Owning repository id.
    pub repository_id: i64,
    /// Path relative to the repository root. Unique within the
    /// repository.
    pub relative_path: PathBuf,
    /// Classification produced by C2.
    pub classification: Classification,
    /// Normalized text content. `Some` iff classification != Binary.
    pub content: Option<String>,
    /// Binary-specific metadata. `Some` iff classification == Binary.
    pub binary_metadata: Option<BinaryMetadata>,
    /// Content hash per C1 (hex-encoded SHA-256).
    pub content_hash: String,
    /// File size in bytes, as observed by discovery's `stat`.
    pub size_bytes: u64,
    /// Last-modified time as reported by the filesystem, Unix seconds.
    /// Informational only — never used for change-detection equality.
    pub last_modified: i64,
    /// Detected language tag, e.g. `"rust"`. `None` for non-code files.
    pub language: Option<String>,
    /// Skip-policy or other status metadata, stored as a JSON object.
    pub status_metadata: Option<serde_json::Value>,
}

/// Metadata recorded for binary files in place of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryMetadata {
    /// Raw byte size.
    pub size: u64,
    /// SHA-256 hex hash of the raw bytes.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A chunk row: one bounded, contiguous slice of a file's normalized text.
///
/// Invariant: `(file_id, chunk_index)` is unique; for a file with `n`
/// chunks, the indices present are exactly `{0, .., n-1}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Surrogate id.
    pub id: i64,
    /// Owning file id.
    pub file_id: i64,
    /// 0-based, contiguous within the file.
    pub chunk_index: i64,
    /// The chunk's text.
    pub content: String,
    /// Start character offset into the file's normalized text.
    pub char_start: i64,
    /// End character offset (exclusive) into the file's normalized text.
    pub char_end: i64,
    /// Estimated start token (per the `chars/4` estimator).
    pub token_start: i64,
    /// Estimated end token (exclusive).
    pub token_end: i64,
    /// Tokens of overlap this chunk shares with its predecessor. 0 for
    /// most code chunks; the configured overlap for prose.
    pub overlap_from_prev: i64,
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// An embedding row: 1:1 with a chunk.
///
/// Invariant: `vector.len() == D` exactly, where `D` is the dimension
/// declared by configuration; at most one embedding per chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Surrogate id.
    pub id: i64,
    /// Owning chunk id. Unique.
    pub chunk_id: i64,
    /// Dense vector of fixed dimension `D`.
    pub vector: Vec<f32>,
    /// When this embedding was produced, Unix seconds.
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One ranked result from C9's `query`/`find_similar`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Owning repository's name.
    pub repository_name: String,
    /// Path relative to the repository root.
    pub relative_path: PathBuf,
    /// Classification of the source file.
    pub classification: Classification,
    /// Language tag, if any.
    pub language: Option<String>,
    /// The chunk's text, or a placeholder for binary files (which in
    /// practice never appear here, having no embeddings).
    pub content: String,
    /// `1 - cosine_distance`, clamped to `[0, 1]`.
    pub similarity: f64,
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// The per-file classification produced by the delta analyzer (C7).
#[derive(Debug, Clone, Default)]
pub struct Delta {
    /// Paths newly discovered, absent from the store.
    pub to_add: Vec<PathBuf>,
    /// Paths present in both, whose size or hash differs.
    pub to_update: Vec<PathBuf>,
    /// Paths present in both, identical size and hash.
    pub unchanged: Vec<PathBuf>,
    /// Paths present in the store but no longer discovered.
    pub to_delete: Vec<PathBuf>,
}

/// The resume-mode partition produced by `analyzeResume`.
#[derive(Debug, Clone, Default)]
pub struct ResumePartition {
    /// Files demonstrably unfinished: need (re)processing.
    pub to_process: Vec<PathBuf>,
    /// Files demonstrably complete already.
    pub already_processed: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Orchestrator outcomes and events
// ---------------------------------------------------------------------------

/// The outcome of processing a single file, replacing exceptions-as-control-
/// flow for skip policies with an explicit sum type.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// File was fully (re)ingested: its row, chunks, and embeddings (if
    /// any) are up to date.
    Ingested {
        /// Number of chunks produced (0 for binary files).
        chunk_count: usize,
    },
    /// File was skipped per a skip policy; no chunks/embeddings exist.
    Skipped {
        /// Why the file was skipped.
        reason: crate::error::SkipReason,
    },
    /// File failed during chunking or embedding; the error was logged and
    /// the loop continued.
    Failed {
        /// Human-readable failure description.
        error: String,
    },
}

/// Per-file progress event the orchestrator emits after each file.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// The file that finished processing.
    pub path: PathBuf,
    /// How it concluded.
    pub outcome: ProcessOutcomeKind,
}

/// A lightweight tag mirroring `ProcessOutcome`'s shape, used where only the
/// kind (not the payload) is needed, e.g. summary counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcomeKind {
    /// See `ProcessOutcome::Ingested`.
    Ingested,
    /// See `ProcessOutcome::Skipped`.
    Skipped,
    /// See `ProcessOutcome::Failed`.
    Failed,
}

impl From<&ProcessOutcome> for ProcessOutcomeKind {
    fn from(outcome: &ProcessOutcome) -> Self {
        match outcome {
            ProcessOutcome::Ingested { .. } => ProcessOutcomeKind::Ingested,
            ProcessOutcome::Skipped { .. } => ProcessOutcomeKind::Skipped,
            ProcessOutcome::Failed { .. } => ProcessOutcomeKind::Failed,
        }
    }
}

/// Summary returned at the end of an ingestion run (spec §4.8 step 9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Total files discovered and considered.
    pub processed: usize,
    /// Files fully ingested (added or updated).
    pub ingested: usize,
    /// Files skipped, keyed by skip reason string.
    pub skipped_by_reason: std::collections::BTreeMap<String, usize>,
    /// Files that errored during processing.
    pub errored: usize,
    /// Files left unchanged (neither added nor updated nor deleted).
    pub unchanged: usize,
    /// Files deleted because discovery no longer found them.
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_round_trips_through_its_wire_string() {
        for c in [Classification::Code, Classification::Text, Classification::Binary] {
            let s = c.as_str();
            assert_eq!(Classification::from_str_strict(s).unwrap(), c);
        }
    }

    #[test]
    fn classification_rejects_unknown_strings() {
        assert!(Classification::from_str_strict("archive").is_err());
    }

    #[test]
    fn process_outcome_kind_matches_variant() {
        let ingested = ProcessOutcome::Ingested { chunk_count: 3 };
        assert_eq!(ProcessOutcomeKind::from(&ingested), ProcessOutcomeKind::Ingested);
        let skipped = ProcessOutcome::Skipped { reason: crate::error::SkipReason::FileTooLarge };
        assert_eq!(ProcessOutcomeKind::from(&skipped), ProcessOutcomeKind::Skipped);
    }
}
