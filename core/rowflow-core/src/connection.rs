//! Connection Resource — scoped store connections
//!
//! [`ConnectionPool`] is the injectable connection factory: it owns the store
//! and the bootstrap DDL that runs on every acquisition. [`ConnectionHandle`]
//! closes its connection exactly once, on explicit `release()` or on drop,
//! whichever comes first, so every exit path releases.

use crate::error::{FlowError, FlowResult};
use crate::storage::{Executed, Record, ScalarValue, Store, StoreConnection};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

#[derive(Default)]
struct PoolCounters {
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Acquire/release counters of a [`ConnectionPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
}

impl PoolStats {
    /// Handles acquired and not yet released.
    ///
    /// Saturates at zero: under concurrent release the two counters are read
    /// at different moments.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

/// Connection factory shared by every stream and pipeline.
///
/// Cloning shares the store, bootstrap statements and counters.
#[derive(Clone)]
pub struct ConnectionPool {
    store: Arc<dyn Store>,
    bootstrap: Arc<[String]>,
    counters: Arc<PoolCounters>,
}

impl ConnectionPool {
    pub fn new<S: Store + 'static>(store: S) -> Self {
        Self::from_store(Arc::new(store))
    }

    pub fn from_store(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            bootstrap: Arc::from(Vec::<String>::new()),
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Statements run (and committed) on every acquisition.
    ///
    /// They must be idempotent, e.g. `CREATE TABLE IF NOT EXISTS`.
    pub fn with_bootstrap<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bootstrap = statements.into_iter().map(Into::into).collect();
        self
    }

    /// Opens a connection, running the bootstrap statements first.
    ///
    /// Fails with [`FlowError::Connection`] when the store is unreachable.
    pub fn acquire(&self) -> FlowResult<ConnectionHandle> {
        let conn = self.store.connect()?;
        let id = self.counters.acquired.fetch_add(1, Ordering::Relaxed) + 1;
        let mut handle = ConnectionHandle {
            conn: Some(conn),
            id,
            counters: Arc::clone(&self.counters),
        };
        if !self.bootstrap.is_empty() {
            for statement in self.bootstrap.iter() {
                handle.execute(statement, &[])?;
            }
            handle.commit()?;
        }
        debug!(connection = id, "connection acquired");
        Ok(handle)
    }

    pub fn stats(&self) -> PoolStats {
        // released first, so a racing release cannot push it past acquired
        let released = self.counters.released.load(Ordering::Acquire);
        let acquired = self.counters.acquired.load(Ordering::Acquire);
        PoolStats { acquired, released }
    }
}

/// One acquired connection. Not `Sync`: a handle serves one unit of work.
pub struct ConnectionHandle {
    conn: Option<Box<dyn StoreConnection>>,
    id: u64,
    counters: Arc<PoolCounters>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn conn(&mut self) -> FlowResult<&mut dyn StoreConnection> {
        match self.conn.as_mut() {
            Some(conn) => Ok(conn.as_mut()),
            None => Err(FlowError::Connection(format!(
                "connection {} already released",
                self.id
            ))),
        }
    }

    pub fn execute(&mut self, query: &str, params: &[ScalarValue]) -> FlowResult<Executed> {
        self.conn()?.execute(query, params)
    }

    pub fn fetch_one(&mut self) -> FlowResult<Option<Record>> {
        self.conn()?.fetch_one()
    }

    pub fn fetch_many(&mut self, n: usize) -> FlowResult<Vec<Record>> {
        self.conn()?.fetch_many(n)
    }

    pub fn fetch_all(&mut self) -> FlowResult<Vec<Record>> {
        self.conn()?.fetch_all()
    }

    /// Executes a row-returning statement and reads every row.
    pub fn query(&mut self, query: &str, params: &[ScalarValue]) -> FlowResult<Vec<Record>> {
        match self.execute(query, params)? {
            Executed::Rows => self.fetch_all(),
            Executed::Affected(_) => Err(FlowError::InvalidArgument(format!(
                "statement returns no rows: {query}"
            ))),
        }
    }

    pub fn commit(&mut self) -> FlowResult<()> {
        self.conn()?.commit()
    }

    pub fn rollback(&mut self) -> FlowResult<()> {
        self.conn()?.rollback()
    }

    /// Closes the connection now and reports a failing close.
    pub fn release(mut self) -> FlowResult<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> FlowResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        self.counters.released.fetch_add(1, Ordering::Release);
        debug!(connection = self.id, "connection released");
        conn.close()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            warn!(connection = self.id, error = %e, "closing connection failed");
        }
    }
}

/// Result of [`ExecuteQuery::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Record>),
    Affected(usize),
}

/// One-shot parameterized statement: acquire, execute, read or commit,
/// release.
///
/// ```rust
/// use rowflow_core::{ConnectionPool, ExecuteQuery, MemoryStore};
///
/// # fn main() -> rowflow_core::FlowResult<()> {
/// let pool = ConnectionPool::new(MemoryStore::new())
///     .with_bootstrap(["CREATE TABLE IF NOT EXISTS users (name TEXT, age INTEGER)"]);
/// ExecuteQuery::new("INSERT INTO users (name, age) VALUES (?, ?)")
///     .bind("Alice")
///     .bind(28)
///     .run(&pool)?;
/// let outcome = ExecuteQuery::new("SELECT * FROM users WHERE age > ?")
///     .bind(25)
///     .run(&pool)?;
/// assert!(matches!(outcome, rowflow_core::QueryOutcome::Rows(rows) if rows.len() == 1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ExecuteQuery {
    sql: String,
    params: Vec<ScalarValue>,
}

impl ExecuteQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Positional parameter (`?` / `$N`)
    pub fn bind<V: Into<ScalarValue>>(mut self, value: V) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn run(self, pool: &ConnectionPool) -> FlowResult<QueryOutcome> {
        let mut handle = pool.acquire()?;
        let outcome = match handle.execute(&self.sql, &self.params) {
            Ok(Executed::Rows) => handle.fetch_all().map(QueryOutcome::Rows),
            Ok(Executed::Affected(n)) => handle.commit().map(|_| QueryOutcome::Affected(n)),
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome
            && let Err(rollback) = handle.rollback()
        {
            warn!(
                connection = handle.id(),
                error = %e,
                rollback_error = %rollback,
                "rollback failed"
            );
        }
        if outcome.is_ok() {
            handle.release()?;
        }
        // on failure the handle drops here; a failing close is only logged
        outcome
    }
}
