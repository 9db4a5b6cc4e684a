//! Delta analysis (C7): decide which discovered files are new, changed,
//! unchanged, or gone, and — separately — which files a resumed run still
//! needs to process.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::storage::{FileMetadataRow, Storage};
use crate::types::{Delta, ResumePartition};

/// A freshly `stat`-ed candidate file, as produced by discovery (C3) plus
/// a `stat` call, before hashing or classification.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the repository root.
    pub relative_path: PathBuf,
    /// Current size in bytes.
    pub size_bytes: u64,
    /// Current content hash (post-normalization, per C1). Computing this
    /// requires reading the file, so callers that only need a cheap
    /// size-based pre-filter may pass `None` and rely on size alone to
    /// flag definite changes; a `None` hash is never treated as equal to
    /// a stored hash.
    pub content_hash: Option<String>,
}

/// Compare `discovered` against what's stored for `repository_id`,
/// partitioning by size+hash equality. `last_modified` is never consulted:
/// per spec, mtime is informational only, never authoritative for
/// change-detection, since it can be unreliable after checkouts or
/// archive extraction.
///
/// # Errors
/// Returns an error if the stored file list cannot be read.
pub fn analyze(storage: &Storage, repository_id: i64, discovered: &[DiscoveredFile]) -> crate::error::IndexResult<Delta> {
    let stored = storage.list_file_metadata(repository_id)?;
    let stored_by_path: BTreeMap<&Path, &FileMetadataRow> =
        stored.iter().map(|row| (row.relative_path.as_path(), row)).collect();
    let discovered_paths: BTreeSet<&Path> = discovered.iter().map(|f| f.relative_path.as_path()).collect();

    let mut delta = Delta::default();

    for file in discovered {
        match stored_by_path.get(file.relative_path.as_path()) {
            None => delta.to_add.push(file.relative_path.clone()),
            Some(row) => {
                let size_matches = row.size_bytes == file.size_bytes;
                let hash_matches = match &file.content_hash {
                    Some(hash) => &row.content_hash == hash,
                    // No hash computed: size mismatch alone proves change;
                    // size match alone does not prove sameness, so treat
                    // conservatively as changed to force a re-read.
                    None => false,
                };
                if size_matches && hash_matches {
                    delta.unchanged.push(file.relative_path.clone());
                } else {
                    delta.to_update.push(file.relative_path.clone());
                }
            }
        }
    }

    for row in &stored {
        if !discovered_paths.contains(row.relative_path.as_path()) {
            delta.to_delete.push(row.relative_path.clone());
        }
    }

    Ok(delta)
}

/// Partition discovered files for a resumed run: a binary file with any
/// stored record is complete (binaries have no chunks/embeddings to be
/// incomplete); a text/code file counts as complete only if it has at
/// least one chunk AND every one of its chunks has an embedding. Anything
/// else — absent, partially chunked, or chunked-but-not-embedded — needs
/// (re)processing.
///
/// # Errors
/// Returns an error if stored file, chunk, or embedding rows cannot be
/// read.
pub fn analyze_resume(
    storage: &Storage,
    repository_id: i64,
    discovered: &[DiscoveredFile],
) -> crate::error::IndexResult<ResumePartition> {
    let stored = storage.list_file_metadata(repository_id)?;
    let stored_by_path: BTreeMap<&Path, &FileMetadataRow> =
        stored.iter().map(|row| (row.relative_path.as_path(), row)).collect();

    let mut partition = ResumePartition::default();

    for file in discovered {
        let Some(row) = stored_by_path.get(file.relative_path.as_path()) else {
            partition.to_process.push(file.relative_path.clone());
            continue;
        };

        if row.classification == crate::types::Classification::Binary {
            partition.already_processed.push(file.relative_path.clone());
            continue;
        }

        let chunks = storage.get_chunks_by_file(row.id)?;
        if chunks.is_empty() {
            partition.to_process.push(file.relative_path.clone());
            continue;
        }

        let mut fully_embedded = true;
        for chunk in &chunks {
            if storage.get_embedding_by_chunk(chunk.id)?.is_none() {
                fully_embedded = false;
                break;
            }
        }

        if fully_embedded {
            partition.already_processed.push(file.relative_path.clone());
        } else {
            partition.to_process.push(file.relative_path.clone());
        }
    }

    Ok(partition)
}
