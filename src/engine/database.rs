//! Database registry and query entry point

use super::job::QueryJob;
use super::worker::WorkerPool;
use crate::config::EngineConfig;
use crate::query::{Query, QueryKind, QueryResult};
use crate::table::Table;
use crate::{LemonError, Result};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Shared, lockable slot for one registered table
pub type TableCell = RwLock<Table>;

/// Process-wide registry of tables plus the worker pool feeding query
/// tasks.
///
/// One global instance is available through [`Database::global`];
/// independent instances can be created for embedding and tests.
pub struct Database {
    tables: RwLock<AHashMap<String, Arc<TableCell>>>,
    pool: Mutex<Option<WorkerPool>>,
}

static GLOBAL: Lazy<Database> = Lazy::new(Database::new);

impl Database {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(AHashMap::new()),
            pool: Mutex::new(None),
        }
    }

    /// The process-wide instance, initialized on first use
    pub fn global() -> &'static Database {
        &GLOBAL
    }

    /// Start the worker pool; a no-op when already running
    pub fn start(&self, config: EngineConfig) {
        let mut pool = self.pool.lock();
        if pool.is_none() {
            log::info!("starting worker pool with {} workers", config.workers);
            *pool = Some(WorkerPool::start(config.workers));
        }
    }

    /// Stop the worker pool, draining queued tasks in abort mode and
    /// joining workers. Queries still waiting combine to the aborted
    /// result.
    pub fn stop(&self) {
        if let Some(pool) = self.pool.lock().take() {
            pool.stop();
            log::info!("worker pool stopped");
        }
    }

    /// Whether the worker pool is running
    pub fn is_running(&self) -> bool {
        self.pool.lock().is_some()
    }

    /// Create an empty table from a schema declaration
    pub fn create<S: Into<String>>(
        &self,
        name: &str,
        fields: impl IntoIterator<Item = S>,
    ) -> Result<()> {
        let table = Table::new(name, fields)?;
        self.register(table).map(|_| ())
    }

    /// Register an existing table (e.g. from a bulk load)
    pub fn register(&self, table: Table) -> Result<Arc<TableCell>> {
        let name = table.name().to_string();
        let mut tables = self.tables.write();
        if tables.contains_key(&name) {
            return Err(LemonError::DuplicateTable(name));
        }
        let cell = Arc::new(RwLock::new(table));
        tables.insert(name, Arc::clone(&cell));
        Ok(cell)
    }

    /// Remove a table from the registry
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.tables
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| LemonError::TableNotFound(name.to_string()))
    }

    /// Remove all rows of a table, returning the prior row count
    pub fn truncate(&self, name: &str) -> Result<usize> {
        let cell = self.get(name)?;
        let count = cell.write().clear();
        Ok(count)
    }

    /// Look up a table by name
    pub fn get(&self, name: &str) -> Result<Arc<TableCell>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LemonError::TableNotFound(name.to_string()))
    }

    /// Registered table names, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute one query to completion and return its final result.
    ///
    /// Planning runs on the calling thread; partitioned work is fanned
    /// out to the worker pool and the call blocks until combine.
    /// Failures come back as the error result, never as a panic.
    pub fn run(&self, query: Query) -> QueryResult {
        let qname = query.qname();
        let table_name = query.table.clone();
        log::debug!("{}", query);
        match self.dispatch(query) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("{} on \"{}\" failed: {}", qname, table_name, err);
                QueryResult::error(qname, table_name, &err)
            }
        }
    }

    fn dispatch(&self, query: Query) -> Result<QueryResult> {
        match query.kind {
            QueryKind::Nop => Ok(QueryResult::Null),
            QueryKind::Insert { key, values } => {
                let cell = self.get(&query.table)?;
                cell.write().insert_by_index(key, values)?;
                Ok(QueryResult::Null)
            }
            _ => {
                if !self.is_running() {
                    return Err(LemonError::Internal(
                        "worker pool is not running".to_string(),
                    ));
                }
                let is_duplicate = matches!(query.kind, QueryKind::Duplicate);
                let cell = self.get(&query.table)?;
                let (tasks, reply) = QueryJob::plan(Arc::clone(&cell), query)?;
                {
                    let pool = self.pool.lock();
                    match pool.as_ref() {
                        Some(pool) => {
                            for task in tasks {
                                // A concurrent stop() closed the queue;
                                // drive completion through the abort path.
                                if let Err(task) = pool.submit(task) {
                                    task.abort();
                                }
                            }
                        }
                        None => {
                            for task in tasks {
                                task.abort();
                            }
                        }
                    }
                }
                let result = reply
                    .recv()
                    .map_err(|_| LemonError::Internal("query reply channel closed".to_string()))?;
                // Promote the pending-duplicate buffer here rather than
                // in combine: a worker thread must never wait on another
                // query's table lease.
                if is_duplicate && !result.is_error() {
                    cell.write().merge_duplicates()?;
                }
                Ok(result)
            }
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.stop();
    }
}
