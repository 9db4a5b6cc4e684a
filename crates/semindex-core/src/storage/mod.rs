//! Storage engine (C6): typed CRUD, batched inserts, cascade deletes, ACID
//! transactions, and vector search over a single SQLite-backed relational
//! store.

mod migrations;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{IndexError, IndexResult};
use crate::types::{BinaryMetadata, Classification, ChunkRecord, EmbeddingRecord, FileRecord, Repository, SearchResult};

/// Sub-batch row ceilings so a prepared statement's bound-parameter count
/// never exceeds SQLite's default limit. Chosen so `rows * params_per_row`
/// stays comfortably under the ~900-999 ceiling spec §4.6 gives as a
/// concrete example.
const FILE_BATCH_ROWS: usize = 80;
const CHUNK_BATCH_ROWS: usize = 100;
const EMBEDDING_BATCH_ROWS: usize = 300;

/// Counts of rows removed by a health-check orphan sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanSweepReport {
    /// Files whose `repository_id` no longer exists.
    pub orphan_files: usize,
    /// Chunks whose `file_id` no longer exists.
    pub orphan_chunks: usize,
    /// Embeddings whose `chunk_id` no longer exists.
    pub orphan_embeddings: usize,
}

/// A process-owned handle to the relational store. Per spec §5's
/// re-architected shared-resource policy, this is an explicit context
/// object constructed once by the orchestrator — never a lazy global — so
/// tests can freely construct a fresh one per case.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (creating if absent) the SQLite database at `path`, apply WAL
    /// pragmas, and run any pending migrations.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or a migration fails.
    pub fn open(path: &Path) -> IndexResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        configure_pragmas(&conn)?;
        migrations::run(&mut conn)?;
        Ok(Storage { conn })
    }

    /// Open an in-memory database. Useful for tests; never persisted.
    ///
    /// # Errors
    /// Returns an error if a migration fails.
    pub fn open_in_memory() -> IndexResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        migrations::run(&mut conn)?;
        Ok(Storage { conn })
    }

    /// `PRAGMA integrity_check`.
    ///
    /// # Errors
    /// Returns an error if the pragma query itself fails.
    pub fn check_integrity(&self) -> IndexResult<bool> {
        let result: String = self.conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    // -----------------------------------------------------------------
    // Repository CRUD
    // -----------------------------------------------------------------

    /// Insert a new repository row.
    ///
    /// # Errors
    /// Returns a `Storage` error on constraint violation (duplicate path
    /// or name) or any other SQLite failure.
    pub fn insert_repository(&self, name: &str, path: &Path, ingested_at: i64, metadata: &serde_json::Value) -> IndexResult<i64> {
        self.conn
            .execute(
                "INSERT INTO repositories (name, path, ingested_at, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![name, path.to_string_lossy(), ingested_at, metadata.to_string()],
            )
            .map_err(|e| IndexError::Storage { details: e.to_string() })?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Fetch a repository by id.
    ///
    /// # Errors
    /// Returns `IndexError::NotFound` if no such repository exists.
    pub fn get_repository(&self, id: i64) -> IndexResult<Repository> {
        self.conn
            .query_row("SELECT * FROM repositories WHERE id = ?1", [id], repository_from_row)
            .optional()?
            .ok_or_else(|| IndexError::NotFound { entity: format!("repository {id}") })
    }

    /// Fetch a repository by its absolute path, if one exists.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn get_repository_by_path(&self, path: &Path) -> IndexResult<Option<Repository>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM repositories WHERE path = ?1",
                [path.to_string_lossy()],
                repository_from_row,
            )
            .optional()?)
    }

    /// List all repositories.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn list_repositories(&self) -> IndexResult<Vec<Repository>> {
        let mut stmt = self.conn.prepare("SELECT * FROM repositories ORDER BY id")?;
        let rows = stmt.query_map([], repository_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
    }

    /// Update a repository's `{last_ingested, file_count}` metadata after
    /// a run completes (spec §4.8 step 7).
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn update_repository_metadata(&self, id: i64, last_ingested: i64, file_count: usize) -> IndexResult<()> {
        let repo = self.get_repository(id)?;
        let mut metadata = repo.metadata;
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("last_ingested".to_string(), serde_json::json!(last_ingested));
            obj.insert("file_count".to_string(), serde_json::json!(file_count));
        }
        self.conn.execute(
            "UPDATE repositories SET metadata = ?1 WHERE id = ?2",
            params![metadata.to_string(), id],
        )?;
        Ok(())
    }

    /// Delete a repository and, via `ON DELETE CASCADE`, every file,
    /// chunk, and embedding it owns.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn delete_repository(&self, id: i64) -> IndexResult<()> {
        self.conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // File CRUD
    // -----------------------------------------------------------------

    /// Insert or replace a file row, keyed by `(repository_id,
    /// relative_path)`. Returns the file's id.
    ///
    /// # Errors
    /// Returns an error on constraint violation or SQLite failure.
    pub fn upsert_file(&self, file: &FileRecord) -> IndexResult<i64> {
        let (binary_size, binary_hash) = match &file.binary_metadata {
            Some(meta) => (Some(meta.size as i64), Some(meta.hash.clone())),
            None => (None, None),
        };
        self.conn.execute(
            "INSERT INTO files (repository_id, relative_path, classification, content, binary_size, binary_hash, content_hash, size_bytes, last_modified, language, status_metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (repository_id, relative_path) DO UPDATE SET
                classification = excluded.classification,
                content = excluded.content,
                binary_size = excluded.binary_size,
                binary_hash = excluded.binary_hash,
                content_hash = excluded.content_hash,
                size_bytes = excluded.size_bytes,
                last_modified = excluded.last_modified,
                language = excluded.language,
                status_metadata = excluded.status_metadata",
            params![
                file.repository_id,
                file.relative_path.to_string_lossy(),
                file.classification.as_str(),
                file.content,
                binary_size,
                binary_hash,
                file.content_hash,
                file.size_bytes as i64,
                file.last_modified,
                file.language,
                file.status_metadata.as_ref().map(serde_json::Value::to_string),
            ],
        ).map_err(|e| IndexError::Storage { details: e.to_string() })?;

        self.get_file_by_path(file.repository_id, &file.relative_path)?
            .map(|f| f.id)
            .ok_or_else(|| IndexError::Internal("upsert_file did not produce a row".to_string()))
    }

    /// Batch-insert files, splitting into sub-batches of at most
    /// `FILE_BATCH_ROWS` rows so no prepared statement exceeds the bound
    /// parameter ceiling. Each sub-batch runs inside its own transaction.
    ///
    /// # Errors
    /// Returns an error (including the failing sub-batch's original
    /// message) if any insert fails; that sub-batch is rolled back.
    pub fn insert_files_batch(&mut self, files: &[FileRecord]) -> IndexResult<()> {
        for sub_batch in files.chunks(FILE_BATCH_ROWS) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO files (repository_id, relative_path, classification, content, binary_size, binary_hash, content_hash, size_bytes, last_modified, language, status_metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT (repository_id, relative_path) DO UPDATE SET
                        classification = excluded.classification, content = excluded.content,
                        binary_size = excluded.binary_size, binary_hash = excluded.binary_hash,
                        content_hash = excluded.content_hash, size_bytes = excluded.size_bytes,
                        last_modified = excluded.last_modified, language = excluded.language,
                        status_metadata = excluded.status_metadata",
                )?;
                for file in sub_batch {
                    let (binary_size, binary_hash) = match &file.binary_metadata {
                        Some(meta) => (Some(meta.size as i64), Some(meta.hash.clone())),
                        None => (None, None),
                    };
                    stmt.execute(params![
                        file.repository_id,
                        file.relative_path.to_string_lossy(),
                        file.classification.as_str(),
                        file.content,
                        binary_size,
                        binary_hash,
                        file.content_hash,
                        file.size_bytes as i64,
                        file.last_modified,
                        file.language,
                        file.status_metadata.as_ref().map(serde_json::Value::to_string),
                    ]).map_err(|e| IndexError::Storage { details: format!("file batch insert failed: {e}") })?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Fetch a file by id.
    ///
    /// # Errors
    /// Returns `IndexError::NotFound` if no such file exists.
    pub fn get_file(&self, id: i64) -> IndexResult<FileRecord> {
        self.conn
            .query_row("SELECT * FROM files WHERE id = ?1", [id], file_from_row)
            .optional()?
            .ok_or_else(|| IndexError::NotFound { entity: format!("file {id}") })
    }

    /// Fetch a file by its path within a repository.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn get_file_by_path(&self, repository_id: i64, relative_path: &Path) -> IndexResult<Option<FileRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM files WHERE repository_id = ?1 AND relative_path = ?2",
                params![repository_id, relative_path.to_string_lossy()],
                file_from_row,
            )
            .optional()?)
    }

    /// List every file record's path, size, hash, classification for a
    /// repository, WITHOUT loading content — the shape the delta analyzer
    /// (C7) needs.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn list_file_metadata(&self, repository_id: i64) -> IndexResult<Vec<FileMetadataRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, relative_path, classification, content_hash, size_bytes, last_modified FROM files WHERE repository_id = ?1",
        )?;
        let rows = stmt.query_map([repository_id], |row| {
            Ok(FileMetadataRow {
                id: row.get(0)?,
                relative_path: PathBuf::from(row.get::<_, String>(1)?),
                classification: Classification::from_str_strict(&row.get::<_, String>(2)?)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into()))?,
                content_hash: row.get(3)?,
                size_bytes: row.get::<_, i64>(4)? as u64,
                last_modified: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
    }

    /// List full file rows for a repository.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn list_files(&self, repository_id: i64) -> IndexResult<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare("SELECT * FROM files WHERE repository_id = ?1")?;
        let rows = stmt.query_map([repository_id], file_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
    }

    /// Delete a file and, via cascade, its chunks and their embeddings.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn delete_file(&self, id: i64) -> IndexResult<()> {
        self.conn.execute("DELETE FROM files WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete a file by its path within a repository. No-op if absent.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn delete_file_by_path(&self, repository_id: i64, relative_path: &Path) -> IndexResult<()> {
        self.conn.execute(
            "DELETE FROM files WHERE repository_id = ?1 AND relative_path = ?2",
            params![repository_id, relative_path.to_string_lossy()],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Chunk CRUD
    // -----------------------------------------------------------------

    /// Delete any existing chunks for `file_id` and insert `chunks` in one
    /// transactional unit, so a crash never leaves a partial chunk set.
    /// Returns the inserted chunk ids in index order.
    ///
    /// # Errors
    /// Returns an error (rolling back) if any insert fails.
    pub fn replace_chunks(&mut self, file_id: i64, chunks: &[crate::chunker::ChunkSpan]) -> IndexResult<Vec<i64>> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE file_id = ?1", [file_id])?;

        let mut ids = Vec::with_capacity(chunks.len());
        for sub_batch in chunks.chunks(CHUNK_BATCH_ROWS) {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (file_id, chunk_index, content, char_start, char_end, token_start, token_end, overlap_from_prev)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for chunk in sub_batch {
                stmt.execute(params![
                    file_id,
                    chunk.chunk_index,
                    chunk.content,
                    chunk.char_start,
                    chunk.char_end,
                    chunk.token_start,
                    chunk.token_end,
                    chunk.overlap_from_prev,
                ]).map_err(|e| IndexError::Storage { details: format!("chunk batch insert failed: {e}") })?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Fetch every chunk for a file, ordered by `chunk_index`.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn get_chunks_by_file(&self, file_id: i64) -> IndexResult<Vec<ChunkRecord>> {
        let mut stmt = self.conn.prepare("SELECT * FROM chunks WHERE file_id = ?1 ORDER BY chunk_index")?;
        let rows = stmt.query_map([file_id], chunk_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
    }

    /// Delete every chunk for a file (and, via cascade, their
    /// embeddings).
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn delete_chunks_by_file(&self, file_id: i64) -> IndexResult<()> {
        self.conn.execute("DELETE FROM chunks WHERE file_id = ?1", [file_id])?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Embedding CRUD
    // -----------------------------------------------------------------

    /// Batch-insert `(chunk_id, vector)` pairs, splitting into sub-batches
    /// of at most `EMBEDDING_BATCH_ROWS` rows.
    ///
    /// # Errors
    /// Returns an error (rolling back the failing sub-batch) if any
    /// insert fails.
    pub fn insert_embeddings_batch(&mut self, embeddings: &[(i64, Vec<f32>)]) -> IndexResult<()> {
        let created_at = now_unix();
        for sub_batch in embeddings.chunks(EMBEDDING_BATCH_ROWS) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO embeddings (chunk_id, vector, created_at) VALUES (?1, ?2, ?3)",
                )?;
                for (chunk_id, vector) in sub_batch {
                    stmt.execute(params![chunk_id, serialize_vector(vector), created_at]).map_err(|e| {
                        IndexError::Storage { details: format!("embedding batch insert failed: {e}") }
                    })?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Fetch the embedding for a chunk, if one exists.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn get_embedding_by_chunk(&self, chunk_id: i64) -> IndexResult<Option<EmbeddingRecord>> {
        Ok(self
            .conn
            .query_row("SELECT * FROM embeddings WHERE chunk_id = ?1", [chunk_id], embedding_from_row)
            .optional()?)
    }

    // -----------------------------------------------------------------
    // Vector search
    // -----------------------------------------------------------------

    /// Return the `limit` chunks whose stored vector minimizes cosine
    /// distance to `query`, across every repository.
    ///
    /// # Errors
    /// Returns an error if `query.len()` doesn't match any stored
    /// dimension handling, or on SQLite failure.
    pub fn nearest(&self, query: &[f32], limit: usize) -> IndexResult<Vec<SearchResult>> {
        self.nearest_filtered(query, limit, None)
    }

    /// Same as `nearest`, but scoped to a single repository.
    ///
    /// # Errors
    /// See `nearest`.
    pub fn nearest_in_repository(&self, query: &[f32], repository_id: i64, limit: usize) -> IndexResult<Vec<SearchResult>> {
        self.nearest_filtered(query, limit, Some(repository_id))
    }

    fn nearest_filtered(&self, query: &[f32], limit: usize, repository_id: Option<i64>) -> IndexResult<Vec<SearchResult>> {
        let sql = "SELECT e.id, e.vector, c.content, f.relative_path, f.classification, f.language, r.name
                   FROM embeddings e
                   JOIN chunks c ON c.id = e.chunk_id
                   JOIN files f ON f.id = c.file_id
                   JOIN repositories r ON r.id = f.repository_id
                   WHERE (?1 IS NULL OR r.id = ?1)
                   ORDER BY e.id ASC";
        let mut stmt = self.conn.prepare(sql)?;
        let mut candidates: Vec<(i64, f64, SearchResult)> = stmt
            .query_map(params![repository_id], |row| {
                let embedding_id: i64 = row.get(0)?;
                let vector = deserialize_vector(&row.get::<_, Vec<u8>>(1)?);
                let content: String = row.get(2)?;
                let relative_path: String = row.get(3)?;
                let classification: String = row.get(4)?;
                let language: Option<String> = row.get(5)?;
                let repository_name: String = row.get(6)?;
                Ok((embedding_id, vector, content, relative_path, classification, language, repository_name))
            })?
            .filter_map(Result::ok)
            .filter_map(|(embedding_id, vector, content, relative_path, classification, language, repository_name)| {
                if vector.len() != query.len() {
                    return None;
                }
                let similarity = cosine_similarity(query, &vector).clamp(0.0, 1.0);
                let classification = Classification::from_str_strict(&classification).ok()?;
                Some((
                    embedding_id,
                    similarity,
                    SearchResult {
                        repository_name,
                        relative_path: PathBuf::from(relative_path),
                        classification,
                        language,
                        content,
                        similarity,
                    },
                ))
            })
            .collect();

        // Strictly ascending cosine distance == strictly descending
        // similarity; ties broken by embedding id ascending.
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });
        candidates.truncate(limit);
        Ok(candidates.into_iter().map(|(_, _, result)| result).collect())
    }

    // -----------------------------------------------------------------
    // Health & repair
    // -----------------------------------------------------------------

    /// Remove files with no repository, chunks with no file, and
    /// embeddings with no chunk. A maintenance operation, never run
    /// automatically.
    ///
    /// # Errors
    /// Returns an error on SQLite failure.
    pub fn sweep_orphans(&self) -> IndexResult<OrphanSweepReport> {
        let orphan_files = self.conn.execute(
            "DELETE FROM files WHERE repository_id NOT IN (SELECT id FROM repositories)",
            [],
        )?;
        let orphan_chunks = self
            .conn
            .execute("DELETE FROM chunks WHERE file_id NOT IN (SELECT id FROM files)", [])?;
        let orphan_embeddings = self
            .conn
            .execute("DELETE FROM embeddings WHERE chunk_id NOT IN (SELECT id FROM chunks)", [])?;
        Ok(OrphanSweepReport { orphan_files, orphan_chunks, orphan_embeddings })
    }
}

/// Row shape for the delta analyzer: everything it needs except content.
#[derive(Debug, Clone)]
pub struct FileMetadataRow {
    /// File id.
    pub id: i64,
    /// Path relative to the repository root.
    pub relative_path: PathBuf,
    /// Stored classification.
    pub classification: Classification,
    /// Stored content hash.
    pub content_hash: String,
    /// Stored size in bytes.
    pub size_bytes: u64,
    /// Stored last-modified time.
    pub last_modified: i64,
}

fn configure_pragmas(conn: &Connection) -> IndexResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `f32::to_le_bytes` concatenated per component.
#[must_use]
pub fn serialize_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of `serialize_vector`. Malformed trailing bytes are dropped.
#[must_use]
pub fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity of two equal-length vectors. Returns 0.0 for
/// length-mismatched or zero-norm input.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    let metadata_text: String = row.get("metadata")?;
    let metadata = serde_json::from_str(&metadata_text).unwrap_or_else(|_| serde_json::json!({}));
    Ok(Repository {
        id: row.get("id")?,
        name: row.get("name")?,
        path: PathBuf::from(row.get::<_, String>("path")?),
        commit_tag: row.get("commit_tag")?,
        ingested_at: row.get("ingested_at")?,
        metadata,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let classification_text: String = row.get("classification")?;
    let classification = Classification::from_str_strict(&classification_text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into()))?;
    let binary_size: Option<i64> = row.get("binary_size")?;
    let binary_hash: Option<String> = row.get("binary_hash")?;
    let binary_metadata = match (binary_size, binary_hash) {
        (Some(size), Some(hash)) => Some(BinaryMetadata { size: size as u64, hash }),
        _ => None,
    };
    let status_metadata_text: Option<String> = row.get("status_metadata")?;
    let status_metadata = status_metadata_text.and_then(|t| serde_json::from_str(&t).ok());

    Ok(FileRecord {
        id: row.get("id")?,
        repository_id: row.get("repository_id")?,
        relative_path: PathBuf::from(row.get::<_, String>("relative_path")?),
        classification,
        content: row.get("content")?,
        binary_metadata,
        content_hash: row.get("content_hash")?,
        size_bytes: row.get::<_, i64>("size_bytes")? as u64,
        last_modified: row.get("last_modified")?,
        language: row.get("language")?,
        status_metadata,
    })
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        id: row.get("id")?,
        file_id: row.get("file_id")?,
        chunk_index: row.get("chunk_index")?,
        content: row.get("content")?,
        char_start: row.get("char_start")?,
        char_end: row.get("char_end")?,
        token_start: row.get("token_start")?,
        token_end: row.get("token_end")?,
        overlap_from_prev: row.get("overlap_from_prev")?,
    })
}

fn embedding_from_row(row: &Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
    let bytes: Vec<u8> = row.get("vector")?;
    Ok(EmbeddingRecord {
        id: row.get("id")?,
        chunk_id: row.get("chunk_id")?,
        vector: deserialize_vector(&bytes),
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkSpan;

    fn new_file(repository_id: i64, path: &str, hash: &str) -> FileRecord {
        FileRecord {
            id: 0,
            repository_id,
            relative_path: PathBuf::from(path),
            classification: Classification::Code,
            content: Some("fn f() {}".to_string()),
            binary_metadata: None,
            content_hash: hash.to_string(),
            size_bytes: 9,
            last_modified: 0,
            language: Some("rust".to_string()),
            status_metadata: None,
        }
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![0.1, 0.2, 0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_opposite_vectors_is_negative_one() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn vector_serialization_round_trips() {
        let v = vec![0.5_f32, -1.25, 3.0];
        assert_eq!(deserialize_vector(&serialize_vector(&v)), v);
    }

    #[test]
    fn open_in_memory_runs_migrations() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(storage.check_integrity().unwrap());
    }

    #[test]
    fn repository_and_file_roundtrip() {
        let storage = Storage::open_in_memory().unwrap();
        let repo_id = storage.insert_repository("demo", Path::new("/tmp/demo"), 0, &serde_json::json!({})).unwrap();
        let file = new_file(repo_id, "a.rs", "hash-a");
        let file_id = storage.upsert_file(&file).unwrap();
        let fetched = storage.get_file(file_id).unwrap();
        assert_eq!(fetched.relative_path, PathBuf::from("a.rs"));
        assert_eq!(fetched.content_hash, "hash-a");
    }

    #[test]
    fn cascade_delete_removes_file_chunk_and_embedding() {
        let mut storage = Storage::open_in_memory().unwrap();
        let repo_id = storage.insert_repository("demo", Path::new("/tmp/demo2"), 0, &serde_json::json!({})).unwrap();
        let file_id = storage.upsert_file(&new_file(repo_id, "a.rs", "hash-a")).unwrap();
        let span = ChunkSpan {
            content: "fn f() {}".to_string(),
            chunk_index: 0,
            char_start: 0,
            char_end: 9,
            token_start: 0,
            token_end: 3,
            overlap_from_prev: 0,
        };
        let chunk_ids = storage.replace_chunks(file_id, std::slice::from_ref(&span)).unwrap();
        storage.insert_embeddings_batch(&[(chunk_ids[0], vec![0.1, 0.2, 0.3])]).unwrap();

        storage.delete_repository(repo_id).unwrap();

        assert!(storage.get_file(file_id).is_err());
        assert!(storage.get_chunks_by_file(file_id).unwrap().is_empty());
        assert!(storage.get_embedding_by_chunk(chunk_ids[0]).unwrap().is_none());
    }

    #[test]
    fn nearest_orders_by_ascending_cosine_distance() {
        let mut storage = Storage::open_in_memory().unwrap();
        let repo_id = storage.insert_repository("demo", Path::new("/tmp/demo3"), 0, &serde_json::json!({})).unwrap();

        let mut chunk_ids_by_vector = Vec::new();
        for (i, v) in [0.1_f32, 0.5, 0.9].iter().enumerate() {
            let file = new_file(repo_id, &format!("f{i}.rs"), &format!("hash-{i}"));
            let file_id = storage.upsert_file(&file).unwrap();
            let span = ChunkSpan {
                content: format!("chunk {i}"),
                chunk_index: 0,
                char_start: 0,
                char_end: 7,
                token_start: 0,
                token_end: 2,
                overlap_from_prev: 0,
            };
            let chunk_ids = storage.replace_chunks(file_id, std::slice::from_ref(&span)).unwrap();
            storage.insert_embeddings_batch(&[(chunk_ids[0], vec![*v, 1.0 - v, 0.0])]).unwrap();
            chunk_ids_by_vector.push(chunk_ids[0]);
        }

        let results = storage.nearest(&[0.15, 0.85, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        for window in results.windows(2) {
            assert!(window[0].similarity >= window[1].similarity);
        }
    }

    #[test]
    fn sweep_orphans_removes_rows_left_behind_by_disabled_foreign_keys() {
        let storage = Storage::open_in_memory().unwrap();
        let repo_id = storage.insert_repository("demo", Path::new("/tmp/demo4"), 0, &serde_json::json!({})).unwrap();
        let file_id = storage.upsert_file(&new_file(repo_id, "a.rs", "hash-a")).unwrap();
        // Simulate an orphan by deleting the repository row directly,
        // bypassing cascade semantics (as if FK enforcement had been off).
        storage.conn.execute("PRAGMA foreign_keys = OFF", []).unwrap();
        storage.conn.execute("DELETE FROM repositories WHERE id = ?1", [repo_id]).unwrap();
        storage.conn.execute("PRAGMA foreign_keys = ON", []).unwrap();

        let report = storage.sweep_orphans().unwrap();
        assert_eq!(report.orphan_files, 1);
        assert!(storage.get_file(file_id).is_err());
    }
}
