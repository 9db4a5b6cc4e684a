//! Ingest orchestrator (C8): drives discovery, classification, chunking,
//! embedding, and storage for one repository, with per-file error
//! isolation, skip policies, resume, and progress events.
//!
//! `Engine::open` is the single explicit constructor — no lazy global — so
//! tests construct a fresh engine per case, per spec §5's re-architected
//! shared-resource policy.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::chunker::{self, ChunkOptions};
use crate::classify;
use crate::config::Config;
use crate::delta::{self, DiscoveredFile};
use crate::discovery;
use crate::embedding::{self, EmbeddingOracle};
use crate::error::{IndexError, IndexResult, SkipReason};
use crate::hash;
use crate::log::IngestLogger;
use crate::storage::Storage;
use crate::types::{BinaryMetadata, Classification, FileRecord, IngestSummary, ProcessOutcome, ProgressEvent};

/// Options governing one `ingest` run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Re-run mode: process only files `analyzeResume` flags as
    /// unfinished, rather than every discovered file.
    pub resume: bool,
    /// Paths that bypass the size and pre-flight chunk-count skip gates.
    pub force_files: HashSet<PathBuf>,
}

/// Advisory per-file progress callback.
pub type IngestProgressCallback<'a> = dyn Fn(&ProgressEvent) + Send + Sync + 'a;

/// The engine: an owned storage handle, embedding oracle, and
/// configuration, constructed explicitly per caller.
pub struct Engine {
    storage: Storage,
    config: Config,
    oracle: Box<dyn EmbeddingOracle>,
    log_dir: PathBuf,
}

impl Engine {
    /// Open (or create) the store at `db_path`, build the configured
    /// embedding oracle, and use `log_dir` for error/ingestion logs.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened/migrated, or if
    /// `config.embedding.provider` is unrecognized.
    pub fn open(db_path: &Path, log_dir: &Path, config: Config) -> IndexResult<Self> {
        let storage = Storage::open(db_path)?;
        let oracle = embedding::build_oracle(&config.embedding)?;
        Ok(Engine { storage, config, oracle, log_dir: log_dir.to_path_buf() })
    }

    /// Open an in-memory store. Useful for tests.
    ///
    /// # Errors
    /// See `open`.
    pub fn open_in_memory(log_dir: &Path, config: Config) -> IndexResult<Self> {
        let storage = Storage::open_in_memory()?;
        let oracle = embedding::build_oracle(&config.embedding)?;
        Ok(Engine { storage, config, oracle, log_dir: log_dir.to_path_buf() })
    }

    /// Read-only access to the underlying store, for search (C9) and
    /// callers that need direct query access.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The configured embedding oracle, for search (C9).
    #[must_use]
    pub fn oracle(&self) -> &dyn EmbeddingOracle {
        self.oracle.as_ref()
    }

    /// Embed `text` and return the nearest stored chunks (C9).
    ///
    /// # Errors
    /// See `crate::search::query`.
    pub async fn search(
        &self,
        text: &str,
        options: &crate::search::SearchOptions,
    ) -> IndexResult<Vec<crate::types::SearchResult>> {
        crate::search::query(&self.storage, self.oracle.as_ref(), text, options).await
    }

    /// Same contract as `search`, with `code` as the query text.
    ///
    /// # Errors
    /// See `crate::search::find_similar`.
    pub async fn find_similar(
        &self,
        code: &str,
        options: &crate::search::SearchOptions,
    ) -> IndexResult<Vec<crate::types::SearchResult>> {
        crate::search::find_similar(&self.storage, self.oracle.as_ref(), code, options).await
    }

    /// Ingest (or re-ingest) `root` under `repository_name`, running the
    /// full `Discover → (DeltaAnalyze | ResumeAnalyze | Fresh) →
    /// PerFileLoop → Finalize` state machine.
    ///
    /// # Errors
    /// Returns an error only for conditions spec §7 marks fatal to the
    /// whole run: configuration, migration, or a storage failure while
    /// reading/writing the repository row itself. Per-file failures are
    /// caught, logged, and counted in the returned summary instead.
    pub async fn ingest(
        &mut self,
        repository_name: &str,
        root: &Path,
        options: &IngestOptions,
        on_progress: Option<&IngestProgressCallback<'_>>,
    ) -> IndexResult<IngestSummary> {
        let repository_id = match self.storage.get_repository_by_path(root)? {
            Some(repo) => repo.id,
            None => self.storage.insert_repository(repository_name, root, now_unix(), &serde_json::json!({}))?,
        };

        let mut logger = IngestLogger::open(&self.log_dir, &slugify(repository_name));
        logger.session_start(repository_name);

        let discovered_paths = discovery::walk(root)?;
        let relative_paths: Vec<PathBuf> = discovered_paths
            .iter()
            .filter_map(|p| p.strip_prefix(root).ok().map(Path::to_path_buf))
            .collect();

        let stat_only: Vec<DiscoveredFile> = relative_paths
            .iter()
            .filter_map(|rel| {
                let size = std::fs::metadata(root.join(rel)).ok()?.len();
                Some(DiscoveredFile { relative_path: rel.clone(), size_bytes: size, content_hash: None })
            })
            .collect();

        let targets: Vec<PathBuf>;
        let mut to_delete: Vec<PathBuf> = Vec::new();
        let mut unchanged_count = 0usize;

        if options.resume {
            let discovered = self.hash_where_size_matches(repository_id, root, &stat_only)?;
            let partition = delta::analyze_resume(&self.storage, repository_id, &discovered)?;
            targets = partition.to_process;
        } else {
            let discovered = self.hash_where_size_matches(repository_id, root, &stat_only)?;
            let delta_result = delta::analyze(&self.storage, repository_id, &discovered)?;
            unchanged_count = delta_result.unchanged.len();
            to_delete = delta_result.to_delete;
            targets = delta_result
                .to_add
                .into_iter()
                .chain(delta_result.to_update)
                .collect();
        }

        let mut summary = IngestSummary { unchanged: unchanged_count, ..IngestSummary::default() };

        for relative_path in &targets {
            summary.processed += 1;
            let force = options.force_files.contains(relative_path);
            logger.file_start(&relative_path.to_string_lossy());

            let outcome = self.process_file(repository_id, root, relative_path, force).await;

            match &outcome {
                ProcessOutcome::Ingested { chunk_count } => {
                    summary.ingested += 1;
                    logger.file_done(&relative_path.to_string_lossy(), *chunk_count);
                }
                ProcessOutcome::Skipped { reason } => {
                    *summary.skipped_by_reason.entry(reason.as_str().to_string()).or_insert(0) += 1;
                    logger.file_skip(&relative_path.to_string_lossy(), *reason);
                }
                ProcessOutcome::Failed { error } => {
                    summary.errored += 1;
                    logger.file_error(&relative_path.to_string_lossy(), error);
                }
            }

            if let Some(callback) = on_progress {
                callback(&ProgressEvent { path: relative_path.clone(), outcome: (&outcome).into() });
            }

            tokio::task::yield_now().await;
        }

        for relative_path in &to_delete {
            if let Some(file) = self.storage.get_file_by_path(repository_id, relative_path)? {
                self.storage.delete_file(file.id)?;
            }
            summary.deleted += 1;
        }

        let file_count = self.storage.list_files(repository_id)?.len();
        self.storage.update_repository_metadata(repository_id, now_unix(), file_count)?;
        logger.session_end(&summary);

        Ok(summary)
    }

    /// For every stat-only candidate whose size matches a stored record,
    /// read and hash it so the delta analyzer can distinguish `unchanged`
    /// from `toUpdate`; candidates that are new or size-mismatched are
    /// passed through with no hash computed (the analyzer alone decides
    /// those on size).
    fn hash_where_size_matches(
        &self,
        repository_id: i64,
        root: &Path,
        stat_only: &[DiscoveredFile],
    ) -> IndexResult<Vec<DiscoveredFile>> {
        let stored = self.storage.list_file_metadata(repository_id)?;
        let stored_sizes: std::collections::BTreeMap<&Path, u64> =
            stored.iter().map(|row| (row.relative_path.as_path(), row.size_bytes)).collect();

        let mut out = Vec::with_capacity(stat_only.len());
        for candidate in stat_only {
            let needs_hash = stored_sizes
                .get(candidate.relative_path.as_path())
                .is_some_and(|&stored_size| stored_size == candidate.size_bytes);

            if !needs_hash {
                out.push(candidate.clone());
                continue;
            }

            let absolute = root.join(&candidate.relative_path);
            let content_hash = std::fs::read(&absolute).ok().map(|bytes| match std::str::from_utf8(&bytes) {
                Ok(text) => hash::hash_text(&hash::normalize_text(text)),
                Err(_) => hash::hash_bytes(&bytes),
            });

            out.push(DiscoveredFile { relative_path: candidate.relative_path.clone(), size_bytes: candidate.size_bytes, content_hash });
        }
        Ok(out)
    }

    /// The per-file state machine (spec §4.8), strictly ordered:
    /// classify → crash-recovery check → size gate → pre-flight chunk
    /// estimate → read+branch → chunk/embed/insert.
    async fn process_file(
        &mut self,
        repository_id: i64,
        root: &Path,
        relative_path: &Path,
        force: bool,
    ) -> ProcessOutcome {
        match self.process_file_inner(repository_id, root, relative_path, force).await {
            Ok(outcome) => outcome,
            Err(e) => ProcessOutcome::Failed { error: e.to_string() },
        }
    }

    async fn process_file_inner(
        &mut self,
        repository_id: i64,
        root: &Path,
        relative_path: &Path,
        force: bool,
    ) -> IndexResult<ProcessOutcome> {
        let absolute = root.join(relative_path);
        let metadata = std::fs::metadata(&absolute)?;
        let size_bytes = metadata.len();
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        // Crash-recovery: a prior run may have left a text/code file with
        // chunks but no embeddings (or zero chunks where some were
        // expected). Clear it so this run starts from a clean slate.
        if let Some(existing) = self.storage.get_file_by_path(repository_id, relative_path)? {
            if existing.classification != Classification::Binary {
                let chunks = self.storage.get_chunks_by_file(existing.id)?;
                let mut incomplete = chunks.is_empty() && existing.status_metadata.is_none();
                for chunk in &chunks {
                    if self.storage.get_embedding_by_chunk(chunk.id)?.is_none() {
                        incomplete = true;
                        break;
                    }
                }
                if incomplete {
                    self.storage.delete_chunks_by_file(existing.id)?;
                }
            }
        }

        let raw = std::fs::read(&absolute)?;
        let sniff_len = raw.len().min(512);
        let classify_result = classify::classify(&absolute, Some(&raw[..sniff_len]));

        let skip_gates_enabled = self.config.processing.skip_large_files;

        if skip_gates_enabled && size_bytes > self.config.processing.max_file_size_bytes && !force {
            self.record_skip(repository_id, relative_path, &raw, &classify_result, size_bytes, last_modified, SkipReason::FileTooLarge)?;
            return Ok(ProcessOutcome::Skipped { reason: SkipReason::FileTooLarge });
        }

        if skip_gates_enabled && classify_result.classification != Classification::Binary {
            let estimated = size_bytes
                .div_ceil((self.config.processing.token_target as u64 * 4).max(1));
            let ceiling = (self.config.processing.max_chunks_per_file as f64 * 1.5) as u64;
            if estimated > ceiling && !force {
                self.record_skip(repository_id, relative_path, &raw, &classify_result, size_bytes, last_modified, SkipReason::EstimatedTooManyChunks)?;
                return Ok(ProcessOutcome::Skipped { reason: SkipReason::EstimatedTooManyChunks });
            }
        }

        if classify_result.classification == Classification::Binary {
            let hash = hash::hash_bytes(&raw);
            let file = FileRecord {
                id: 0,
                repository_id,
                relative_path: relative_path.to_path_buf(),
                classification: Classification::Binary,
                content: None,
                binary_metadata: Some(BinaryMetadata { size: size_bytes, hash: hash.clone() }),
                content_hash: hash,
                size_bytes,
                last_modified,
                language: None,
                status_metadata: None,
            };
            let file_id = self.storage.upsert_file(&file)?;
            self.storage.delete_chunks_by_file(file_id)?;
            return Ok(ProcessOutcome::Ingested { chunk_count: 0 });
        }

        let text = String::from_utf8(raw).map_err(|e| IndexError::Chunking {
            path: relative_path.to_path_buf(),
            message: format!("file classified as text/code is not valid UTF-8: {e}"),
        })?;
        let normalized = hash::normalize_text(&text);

        let options = ChunkOptions {
            target_tokens: self.config.processing.token_target,
            overlap_tokens: self.config.processing.overlap_tokens,
        };
        let spans = chunker::chunk(relative_path, &normalized, classify_result.language.as_deref(), options);

        if skip_gates_enabled && spans.len() > self.config.processing.max_chunks_per_file && !force {
            return Ok(ProcessOutcome::Skipped { reason: SkipReason::TooManyChunks });
        }

        let content_hash = hash::hash_text(&normalized);
        let file = FileRecord {
            id: 0,
            repository_id,
            relative_path: relative_path.to_path_buf(),
            classification: classify_result.classification,
            content: Some(normalized),
            binary_metadata: None,
            content_hash,
            size_bytes,
            last_modified,
            language: classify_result.language.clone(),
            status_metadata: None,
        };
        let file_id = self.storage.upsert_file(&file)?;

        let chunk_ids = self.storage.replace_chunks(file_id, &spans)?;
        if chunk_ids.is_empty() {
            return Ok(ProcessOutcome::Ingested { chunk_count: 0 });
        }

        let texts: Vec<String> = spans.iter().map(|s| s.content.clone()).collect();
        let vectors = self.oracle.embed_many(&texts, None).await?;

        let pairs: Vec<(i64, Vec<f32>)> = chunk_ids.into_iter().zip(vectors).collect();
        self.storage.insert_embeddings_batch(&pairs)?;

        Ok(ProcessOutcome::Ingested { chunk_count: spans.len() })
    }

    #[allow(clippy::too_many_arguments)]
    fn record_skip(
        &self,
        repository_id: i64,
        relative_path: &Path,
        raw: &[u8],
        classify_result: &classify::ClassifyResult,
        size_bytes: u64,
        last_modified: i64,
        reason: SkipReason,
    ) -> IndexResult<()> {
        let (content, binary_metadata, content_hash) = if classify_result.classification == Classification::Binary {
            let hash = hash::hash_bytes(raw);
            (None, Some(BinaryMetadata { size: size_bytes, hash: hash.clone() }), hash)
        } else {
            let normalized = hash::normalize_text(&String::from_utf8_lossy(raw));
            let hash = hash::hash_text(&normalized);
            (Some(normalized), None, hash)
        };
        let file = FileRecord {
            id: 0,
            repository_id,
            relative_path: relative_path.to_path_buf(),
            classification: classify_result.classification,
            content,
            binary_metadata,
            content_hash,
            size_bytes,
            last_modified,
            language: classify_result.language.clone(),
            status_metadata: Some(serde_json::json!({ "skipped": true, "reason": reason.as_str() })),
        };
        let file_id = self.storage.upsert_file(&file)?;
        self.storage.delete_chunks_by_file(file_id)?;
        Ok(())
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Lowercase, non-alphanumeric runs collapsed to a single `-`, for use in
/// log file names.
fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for c in name.to_ascii_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.embedding.provider = "transformers".to_string();
        config.embedding.dimensions = 8;
        config
    }

    fn write_repo(dir: &Path) {
        std::fs::write(dir.join("a.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.join("b.md"), "# Title\n\nhello world\n").unwrap();
        std::fs::write(dir.join("c.png"), [0u8, 1, 2, 255, 254]).unwrap();
    }

    #[tokio::test]
    async fn fresh_ingest_processes_every_discovered_file() {
        let repo_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        write_repo(repo_dir.path());

        let mut engine = Engine::open_in_memory(log_dir.path(), test_config()).unwrap();
        let summary = engine
            .ingest("demo", repo_dir.path(), &IngestOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.ingested, 3);
        assert_eq!(summary.errored, 0);
    }

    #[tokio::test]
    async fn second_ingest_with_no_changes_reports_all_unchanged() {
        let repo_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        write_repo(repo_dir.path());

        let mut engine = Engine::open_in_memory(log_dir.path(), test_config()).unwrap();
        engine.ingest("demo", repo_dir.path(), &IngestOptions::default(), None).await.unwrap();
        let second = engine.ingest("demo", repo_dir.path(), &IngestOptions::default(), None).await.unwrap();

        assert_eq!(second.unchanged, 3);
        assert_eq!(second.processed, 0);
    }

    #[tokio::test]
    async fn scenario_s3_skip_large_file() {
        let repo_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        std::fs::write(repo_dir.path().join("huge.txt"), vec![b'x'; 4096]).unwrap();

        let mut config = test_config();
        config.processing.max_file_size_bytes = 1024;
        let mut engine = Engine::open_in_memory(log_dir.path(), config).unwrap();
        let summary = engine.ingest("demo", repo_dir.path(), &IngestOptions::default(), None).await.unwrap();

        assert_eq!(summary.skipped_by_reason.get("file_too_large"), Some(&1));
        let repo = engine.storage().get_repository_by_path(repo_dir.path()).unwrap().unwrap();
        let file = engine.storage().get_file_by_path(repo.id, Path::new("huge.txt")).unwrap().unwrap();
        assert!(file.content.is_some());
        assert!(file.binary_metadata.is_none());
        assert!(engine.storage().get_chunks_by_file(file.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_gates_are_bypassed_when_skip_large_files_is_disabled() {
        let repo_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        std::fs::write(repo_dir.path().join("huge.txt"), vec![b'x'; 4096]).unwrap();

        let mut config = test_config();
        config.processing.max_file_size_bytes = 1024;
        config.processing.skip_large_files = false;
        let mut engine = Engine::open_in_memory(log_dir.path(), config).unwrap();
        let summary = engine.ingest("demo", repo_dir.path(), &IngestOptions::default(), None).await.unwrap();

        assert!(summary.skipped_by_reason.is_empty());
        assert_eq!(summary.ingested, 1);
    }

    #[tokio::test]
    async fn binary_file_is_stored_without_content_or_chunks() {
        let repo_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        std::fs::write(repo_dir.path().join("c.png"), [0u8, 1, 2, 255, 254]).unwrap();

        let mut engine = Engine::open_in_memory(log_dir.path(), test_config()).unwrap();
        engine.ingest("demo", repo_dir.path(), &IngestOptions::default(), None).await.unwrap();

        let repo = engine.storage().get_repository_by_path(repo_dir.path()).unwrap().unwrap();
        let file = engine.storage().get_file_by_path(repo.id, Path::new("c.png")).unwrap().unwrap();
        assert_eq!(file.classification, Classification::Binary);
        assert!(file.content.is_none());
        assert!(file.binary_metadata.is_some());
    }

    #[test]
    fn slugify_collapses_non_alphanumeric_runs() {
        assert_eq!(slugify("My Repo / v2!!"), "my-repo-v2");
    }
}
