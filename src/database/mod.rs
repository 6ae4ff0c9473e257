/*!
 * Database module for persistent service state.
 *
 * This module provides SQLite-based persistence for:
 * - Service counters (downloads, skips, translations, syncs)
 * - Translation history, capped to the most recent entries
 * - The pending translation queue, so approvals survive restarts
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::DatabaseConnection;
pub use models::{HistoryRecord, HistoryStatus, ServiceStats, StatCounter};
pub use repository::{Repository, HISTORY_CAPACITY};
