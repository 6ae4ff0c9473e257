/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 */

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::connection::DatabaseConnection;
use super::models::{HistoryRecord, HistoryStatus, ServiceStats, StatCounter};
use crate::translation::PendingTranslationRequest;

/// Number of history rows kept; older rows are trimmed on insert
pub const HISTORY_CAPACITY: i64 = 200;

/// Repository for database operations
#[derive(Clone, Debug)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Add `amount` to a counter, creating it at zero first if needed
    pub async fn increment_stat(&self, counter: StatCounter, amount: i64) -> Result<()> {
        let name = counter.as_str();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO stats_counters (name, value) VALUES (?1, ?2)
                    ON CONFLICT(name) DO UPDATE SET value = value + excluded.value
                    "#,
                    params![name, amount],
                )?;
                Ok(())
            })
            .await
    }

    /// Snapshot of every counter; missing counters read as zero
    pub async fn get_stats(&self) -> Result<ServiceStats> {
        self.db
            .execute_async(|conn| {
                let read = |counter: StatCounter| -> Result<i64> {
                    let value = conn
                        .query_row(
                            "SELECT value FROM stats_counters WHERE name = ?1",
                            [counter.as_str()],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(value.unwrap_or(0))
                };

                Ok(ServiceStats {
                    total_downloads: read(StatCounter::Downloads)?,
                    total_skipped: read(StatCounter::Skipped)?,
                    total_translations: read(StatCounter::Translations)?,
                    total_translation_lines: read(StatCounter::TranslationLines)?,
                    total_syncs: read(StatCounter::Syncs)?,
                    total_failures: read(StatCounter::Failures)?,
                })
            })
            .await
    }

    // =========================================================================
    // Translation History
    // =========================================================================

    /// Record a terminal translation outcome and trim the oldest rows
    pub async fn add_history(&self, record: &HistoryRecord) -> Result<()> {
        let record = record.clone();

        self.db
            .transaction_async(move |tx| {
                tx.execute(
                    r#"
                    INSERT INTO translation_history (
                        request_id, media_id, title, from_lang, to_lang, status,
                        lines_translated, cost_usd, model, error, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                    params![
                        record.request_id,
                        record.media_id,
                        record.title,
                        record.from_lang,
                        record.to_lang,
                        record.status.to_string(),
                        record.lines_translated,
                        record.cost_usd,
                        record.model,
                        record.error,
                        record.created_at,
                    ],
                )?;

                let trimmed = tx.execute(
                    r#"
                    DELETE FROM translation_history WHERE id NOT IN (
                        SELECT id FROM translation_history ORDER BY id DESC LIMIT ?1
                    )
                    "#,
                    [HISTORY_CAPACITY],
                )?;

                if trimmed > 0 {
                    debug!("Trimmed {} old history rows", trimmed);
                }
                Ok(())
            })
            .await
    }

    /// Most recent history rows, newest first
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let limit = limit as i64;

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT request_id, media_id, title, from_lang, to_lang, status,
                           lines_translated, cost_usd, model, error, created_at
                    FROM translation_history ORDER BY id DESC LIMIT ?1
                    "#,
                )?;

                let records = stmt
                    .query_map([limit], |row| {
                        Ok(HistoryRecord {
                            request_id: row.get(0)?,
                            media_id: row.get(1)?,
                            title: row.get(2)?,
                            from_lang: row.get(3)?,
                            to_lang: row.get(4)?,
                            status: row
                                .get::<_, String>(5)?
                                .parse()
                                .unwrap_or(HistoryStatus::Failed),
                            lines_translated: row.get(6)?,
                            cost_usd: row.get(7)?,
                            model: row.get(8)?,
                            error: row.get(9)?,
                            created_at: row.get(10)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(records)
            })
            .await
    }

    // =========================================================================
    // Pending Queue
    // =========================================================================

    /// Persist a live request, replacing any row for the same language pair
    pub async fn upsert_pending(&self, request: &PendingTranslationRequest) -> Result<()> {
        let payload = serde_json::to_string(request).context("Failed to serialize pending request")?;
        let request = request.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "DELETE FROM pending_translations WHERE media_id = ?1 AND from_lang = ?2 AND to_lang = ?3 AND id != ?4",
                    params![request.media_id, request.from_lang, request.to_lang, request.id],
                )?;
                conn.execute(
                    r#"
                    INSERT INTO pending_translations (
                        id, media_id, from_lang, to_lang, status, payload, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(id) DO UPDATE SET
                        status = excluded.status,
                        payload = excluded.payload,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        request.id,
                        request.media_id,
                        request.from_lang,
                        request.to_lang,
                        request.status.to_string(),
                        payload,
                        request.created_at.to_rfc3339(),
                        request.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Drop a request once it reaches a terminal state
    pub async fn delete_pending(&self, request_id: &str) -> Result<bool> {
        let request_id = request_id.to_string();

        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute("DELETE FROM pending_translations WHERE id = ?1", [&request_id])?;
                Ok(deleted > 0)
            })
            .await
    }

    /// Load all persisted requests, oldest first. Rows that no longer
    /// deserialize are skipped.
    pub async fn load_pending(&self) -> Result<Vec<PendingTranslationRequest>> {
        self.db
            .execute_async(|conn| Self::load_pending_sync(conn))
            .await
    }

    fn load_pending_sync(conn: &Connection) -> Result<Vec<PendingTranslationRequest>> {
        let mut stmt = conn.prepare("SELECT id, payload FROM pending_translations ORDER BY created_at ASC")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let requests = rows
            .into_iter()
            .filter_map(|(id, payload)| match serde_json::from_str(&payload) {
                Ok(request) => Some(request),
                Err(e) => {
                    debug!("Skipping unreadable pending request {}: {}", id, e);
                    None
                }
            })
            .collect();

        Ok(requests)
    }
}
