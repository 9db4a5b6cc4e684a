//! Schema migration runner.
//!
//! Migrations are embedded at compile time (no filesystem scan at
//! runtime), but behave per spec §4.6: sequential integer versions,
//! applied in order inside one transaction each, already-applied versions
//! skipped, migration 000 idempotently creates `schema_version` itself.

use rusqlite::Connection;

use crate::error::{IndexError, IndexResult};

struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 0,
        description: "schema_version",
        sql: include_str!("migrations/000_schema_version.sql"),
    },
    Migration {
        version: 1,
        description: "initial_schema",
        sql: include_str!("migrations/001_initial_schema.sql"),
    },
];

/// Apply every migration not yet recorded in `schema_version`, each inside
/// its own transaction. Migration errors are fatal and abort the whole
/// run (per spec §7, startup-only).
pub fn run(conn: &mut Connection) -> IndexResult<()> {
    // Migration 000 must run unconditionally first since schema_version
    // itself doesn't exist until it does.
    let tx = conn.transaction()?;
    tx.execute_batch(MIGRATIONS[0].sql)?;
    record_if_missing(&tx, MIGRATIONS[0].version, MIGRATIONS[0].description)?;
    tx.commit()?;

    for migration in &MIGRATIONS[1..] {
        if is_applied(conn, migration.version)? {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            IndexError::Storage {
                details: format!("migration {} ({}) failed: {e}", migration.version, migration.description),
            }
        })?;
        record_if_missing(&tx, migration.version, migration.description)?;
        tx.commit()?;
    }

    Ok(())
}

fn is_applied(conn: &Connection, version: i64) -> IndexResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM schema_version WHERE version = ?1)",
        [version],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn record_if_missing(tx: &rusqlite::Transaction<'_>, version: i64, description: &str) -> IndexResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![version, description, now_unix()],
    )?;
    Ok(())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
