//! Per-run ingestion logging (spec §6/§9).
//!
//! Global mutable logger state is re-architected into an explicit
//! `IngestLogger` handle the orchestrator owns and passes around, rather
//! than a process-wide singleton. Two JSONL sinks are written: a
//! per-repository-per-day error log, and a per-session ingestion log.
//! Logging-subsystem failures are themselves reported through `tracing`
//! and never abort ingestion (spec §7).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// The `errorType` values spec §6's error log schema enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// See `SkipReason::FileTooLarge`.
    FileTooLarge,
    /// See `SkipReason::EstimatedTooManyChunks`.
    EstimatedTooManyChunks,
    /// See `SkipReason::TooManyChunks`.
    TooManyChunks,
    /// Chunking or embedding failure.
    ProcessingError,
    /// Classification could not determine a usable format.
    UnsupportedFormat,
    /// Catch-all for anything not otherwise classified.
    Unknown,
}

impl ErrorType {
    #[must_use]
    fn as_str(self) -> &'static str {
        match self {
            ErrorType::FileTooLarge => "file_too_large",
            ErrorType::EstimatedTooManyChunks => "estimated_too_many_chunks",
            ErrorType::TooManyChunks => "too_many_chunks",
            ErrorType::ProcessingError => "processing_error",
            ErrorType::UnsupportedFormat => "unsupported_format",
            ErrorType::Unknown => "unknown",
        }
    }
}

impl From<crate::error::SkipReason> for ErrorType {
    fn from(reason: crate::error::SkipReason) -> Self {
        match reason {
            crate::error::SkipReason::FileTooLarge => ErrorType::FileTooLarge,
            crate::error::SkipReason::EstimatedTooManyChunks => ErrorType::EstimatedTooManyChunks,
            crate::error::SkipReason::TooManyChunks => ErrorType::TooManyChunks,
        }
    }
}

#[derive(Serialize)]
struct ErrorLogRecord<'a> {
    timestamp: i64,
    #[serde(rename = "filePath")]
    file_path: &'a str,
    #[serde(rename = "errorType")]
    error_type: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum IngestLogRecord<'a> {
    SessionStart {
        timestamp: i64,
        #[serde(rename = "repositoryName")]
        repository_name: &'a str,
    },
    FileStart {
        timestamp: i64,
        #[serde(rename = "filePath")]
        file_path: &'a str,
    },
    FileDone {
        timestamp: i64,
        #[serde(rename = "filePath")]
        file_path: &'a str,
        #[serde(rename = "chunkCount")]
        chunk_count: usize,
    },
    FileSkip {
        timestamp: i64,
        #[serde(rename = "filePath")]
        file_path: &'a str,
        reason: &'static str,
    },
    FileError {
        timestamp: i64,
        #[serde(rename = "filePath")]
        file_path: &'a str,
        message: &'a str,
    },
    SessionEnd {
        timestamp: i64,
        summary: &'a crate::types::IngestSummary,
    },
}

/// An explicit, per-run logging handle, per spec §9's re-architecture of
/// "global mutable error-logger state". One instance is constructed by
/// the orchestrator at the start of a run and threaded by reference
/// through the per-file loop.
pub struct IngestLogger {
    log_dir: PathBuf,
    repository_slug: String,
    error_log: Option<File>,
    ingest_log: Option<File>,
}

impl IngestLogger {
    /// Open (creating if absent) today's error log and a fresh per-session
    /// ingestion log under `log_dir`. If either file cannot be opened, the
    /// logger degrades to a no-op for that sink rather than failing the
    /// run — logging-subsystem failures never abort ingestion (spec §7).
    #[must_use]
    pub fn open(log_dir: &Path, repository_slug: &str) -> Self {
        let today = today_date_string();
        let error_log_path = log_dir.join(format!("{repository_slug}-errors-{today}.log"));
        let ingest_log_path = log_dir.join(format!("{repository_slug}-ingest-{today}-{}.log", now_unix()));

        if let Err(e) = std::fs::create_dir_all(log_dir) {
            tracing::error!(error = %e, dir = %log_dir.display(), "failed to create log directory");
        }

        let error_log = open_append(&error_log_path);
        let ingest_log = open_append(&ingest_log_path);

        IngestLogger {
            log_dir: log_dir.to_path_buf(),
            repository_slug: repository_slug.to_string(),
            error_log,
            ingest_log,
        }
    }

    /// Append one error-log record.
    pub fn log_error(&mut self, file_path: &str, error_type: ErrorType, message: &str, details: Option<&serde_json::Value>) {
        let record = ErrorLogRecord { timestamp: now_unix(), file_path, error_type: error_type.as_str(), message, details };
        self.write_error_line(&record);
    }

    /// Append a session-start record.
    pub fn session_start(&mut self, repository_name: &str) {
        let record = IngestLogRecord::SessionStart { timestamp: now_unix(), repository_name };
        self.write_ingest_line(&record);
    }

    /// Append a file-start record.
    pub fn file_start(&mut self, file_path: &str) {
        self.write_ingest_line(&IngestLogRecord::FileStart { timestamp: now_unix(), file_path });
    }

    /// Append a file-done record.
    pub fn file_done(&mut self, file_path: &str, chunk_count: usize) {
        self.write_ingest_line(&IngestLogRecord::FileDone { timestamp: now_unix(), file_path, chunk_count });
    }

    /// Append a file-skip record, and mirror it to the error log per
    /// spec §6 (skip reasons are recorded in both places).
    pub fn file_skip(&mut self, file_path: &str, reason: crate::error::SkipReason) {
        self.write_ingest_line(&IngestLogRecord::FileSkip { timestamp: now_unix(), file_path, reason: reason.as_str() });
        self.log_error(file_path, ErrorType::from(reason), reason.as_str(), None);
    }

    /// Append a file-error record, and mirror it to the error log.
    pub fn file_error(&mut self, file_path: &str, message: &str) {
        self.write_ingest_line(&IngestLogRecord::FileError { timestamp: now_unix(), file_path, message });
        self.log_error(file_path, ErrorType::ProcessingError, message, None);
    }

    /// Append a session-end record.
    pub fn session_end(&mut self, summary: &crate::types::IngestSummary) {
        self.write_ingest_line(&IngestLogRecord::SessionEnd { timestamp: now_unix(), summary });
    }

    /// The directory this logger writes under.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// The slug used in this logger's file names.
    #[must_use]
    pub fn repository_slug(&self) -> &str {
        &self.repository_slug
    }

    fn write_error_line(&mut self, record: &ErrorLogRecord<'_>) {
        let Some(file) = self.error_log.as_mut() else { return };
        if let Err(e) = write_json_line(file, record) {
            tracing::error!(error = %e, "failed to write error log line");
        }
    }

    fn write_ingest_line(&mut self, record: &IngestLogRecord<'_>) {
        let Some(file) = self.ingest_log.as_mut() else { return };
        if let Err(e) = write_json_line(file, record) {
            tracing::error!(error = %e, "failed to write ingestion log line");
        }
    }
}

fn open_append(path: &Path) -> Option<File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "failed to open log file");
            None
        }
    }
}

fn write_json_line<T: Serialize>(file: &mut File, record: &T) -> std::io::Result<()> {
    let line = serde_json::to_string(record).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(file, "{line}")
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `YYYY-MM-DD` in UTC, computed from scratch to avoid a `chrono`
/// dependency the rest of the workspace doesn't otherwise need.
fn today_date_string() -> String {
    let days_since_epoch = now_unix() / 86_400;
    let (year, month, day) = civil_from_days(days_since_epoch);
    format!("{year:04}-{month:02}-{day:02}")
}

/// Howard Hinnant's `civil_from_days` algorithm: days-since-epoch to
/// proleptic-Gregorian (year, month, day), good for any date this program
/// will ever log.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_matches_known_epoch() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_000), (2022, 1, 10));
    }

    #[test]
    fn error_log_writes_one_json_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = IngestLogger::open(dir.path(), "demo-repo");
        logger.log_error("a.rs", ErrorType::ProcessingError, "boom", None);
        logger.log_error("b.rs", ErrorType::FileTooLarge, "too big", None);

        let today = today_date_string();
        let path = dir.path().join(format!("demo-repo-errors-{today}.log"));
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["errorType"], "processing_error");
        assert_eq!(first["filePath"], "a.rs");
    }

    #[test]
    fn file_skip_mirrors_into_the_error_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = IngestLogger::open(dir.path(), "demo-repo2");
        logger.file_skip("huge.txt", crate::error::SkipReason::FileTooLarge);

        let today = today_date_string();
        let path = dir.path().join(format!("demo-repo2-errors-{today}.log"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let record: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(record["errorType"], "file_too_large");
    }

    #[test]
    fn session_records_round_trip_as_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = IngestLogger::open(dir.path(), "demo-repo3");
        logger.session_start("demo-repo3");
        logger.file_start("a.rs");
        logger.file_done("a.rs", 4);
        logger.session_end(&crate::types::IngestSummary::default());
        // No panic and the logger's accessors reflect construction args.
        assert_eq!(logger.repository_slug(), "demo-repo3");
        assert_eq!(logger.log_dir(), dir.path());
    }
}
