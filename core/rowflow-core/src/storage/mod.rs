//! Storage module — the store collaborator interface.
//!
//! The streaming layer depends only on the [`Store`] / [`StoreConnection`]
//! traits. [`memory::MemoryStore`] is the in-process reference store used by
//! the tests and examples.
//!
//! # Contract
//!
//! - `execute`: runs one statement. Row-returning statements open a cursor on
//!   the connection (replacing any previous one); mutations report the
//!   affected-row count.
//! - `fetch_one`: next row of the active cursor, `None` once exhausted.
//! - `fetch_many`: up to `n` rows, shorter only at the end of the cursor.
//! - `commit` / `rollback`: end the implicit transaction begun when the
//!   connection was opened (a new one begins immediately).
//! - `close`: releases the connection; idempotent.

pub mod memory;
pub mod seed;
pub mod sql;
pub mod value;

pub use memory::{FaultPoint, MemoryStore, StoreStats};
pub use value::{Record, ScalarValue};

use crate::error::FlowResult;

/// Outcome of [`StoreConnection::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executed {
    /// A cursor is open; read it with `fetch_*`.
    Rows,
    /// A mutation ran and touched this many rows.
    Affected(usize),
}

/// Connection factory, one per backing store.
pub trait Store: Send + Sync {
    /// Open a new connection. Fails with `FlowError::Connection` when the
    /// store is unreachable.
    fn connect(&self) -> FlowResult<Box<dyn StoreConnection>>;
}

/// One store connection with DB-API style cursor access.
pub trait StoreConnection: Send {
    fn execute(&mut self, query: &str, params: &[ScalarValue]) -> FlowResult<Executed>;

    fn fetch_one(&mut self) -> FlowResult<Option<Record>>;

    /// Default implementation calls `fetch_one()` until `n` rows or exhaustion.
    fn fetch_many(&mut self, n: usize) -> FlowResult<Vec<Record>> {
        let mut rows = Vec::with_capacity(n.min(1024));
        while rows.len() < n {
            match self.fetch_one()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn fetch_all(&mut self) -> FlowResult<Vec<Record>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn commit(&mut self) -> FlowResult<()>;

    fn rollback(&mut self) -> FlowResult<()>;

    fn close(&mut self) -> FlowResult<()>;
}
