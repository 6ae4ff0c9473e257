/*!
 * SQLite handle shared by the repository.
 *
 * One connection behind a mutex; every query runs on tokio's blocking pool.
 */

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

const APP_DIR: &str = "subpilot";
const DB_FILE: &str = "subpilot.db";

/// Cloneable handle to the state database
#[derive(Clone)]
pub struct DatabaseConnection {
    location: PathBuf,
    inner: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection").field("location", &self.location).finish()
    }
}

impl DatabaseConnection {
    /// Open (or create) the database under the user's data directory
    pub fn new_default() -> Result<Self> {
        Self::new(Self::default_database_path()?)
    }

    /// Open (or create) the database file at `path`, creating parent directories
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let location = path.as_ref().to_path_buf();
        if let Some(dir) = location.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create state directory {}", dir.display()))?;
        }

        info!("Using state database {}", location.display());
        let conn = Connection::open(&location)
            .with_context(|| format!("Cannot open state database {}", location.display()))?;
        Self::prepare(conn, location)
    }

    /// Throwaway database that lives as long as the handle
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory state database");
        let conn = Connection::open_in_memory().context("Cannot open in-memory database")?;
        Self::prepare(conn, PathBuf::from(":memory:"))
    }

    fn prepare(conn: Connection, location: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            location,
            inner: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<data dir>/subpilot/subpilot.db`, falling back to `~/.local/share`
    pub fn default_database_path() -> Result<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .ok_or_else(|| anyhow!("No data directory available for the state database"))?;
        Ok(base.join(APP_DIR).join(DB_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Run `f` against the connection on the blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner.lock()))
            .await
            .context("State database task panicked")?
    }

    /// Like `execute_async`, inside a transaction committed when `f` succeeds
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner.lock();
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
        .context("State database task panicked")?
    }
}
