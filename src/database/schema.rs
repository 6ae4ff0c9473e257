/*!
 * Table layout of the state database and its version stamp.
 */

use anyhow::{Context, Result, bail};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

/// Bumped whenever a table below changes shape
pub const SCHEMA_VERSION: i32 = 1;

const TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        version INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );

    -- monotonic service counters, one row per counter name
    CREATE TABLE IF NOT EXISTS stats_counters (
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS translation_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        media_id TEXT NOT NULL,
        title TEXT NOT NULL,
        from_lang TEXT NOT NULL,
        to_lang TEXT NOT NULL,
        status TEXT NOT NULL,
        lines_translated INTEGER NOT NULL DEFAULT 0,
        cost_usd REAL NOT NULL DEFAULT 0,
        model TEXT NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_history_created ON translation_history(created_at);

    -- write-through copy of the approval queue
    CREATE TABLE IF NOT EXISTS pending_translations (
        id TEXT PRIMARY KEY,
        media_id TEXT NOT NULL,
        from_lang TEXT NOT NULL,
        to_lang TEXT NOT NULL,
        status TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(media_id, from_lang, to_lang)
    );
"#;

/// Create missing tables and stamp the version. Refuses databases written
/// by a newer schema.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    match stored_version(conn)? {
        None => {
            info!("Creating state database schema v{}", SCHEMA_VERSION);
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn.execute_batch(TABLES).context("Failed to create state tables")?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
                [SCHEMA_VERSION],
            )?;
        }
        Some(version) if version > SCHEMA_VERSION => {
            bail!("State database uses schema v{}, this build understands up to v{}", version, SCHEMA_VERSION)
        }
        Some(version) => debug!("State database schema v{} is current", version),
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> Result<Option<i32>> {
    let has_table: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to inspect state database")?;
    if !has_table {
        return Ok(None);
    }
    Ok(conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| row.get(0))
        .optional()?)
}
