//! Batch Stream — fixed-size record groups over `LIMIT/OFFSET`

use super::{base_query, check_size, window_query};
use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::error::FlowResult;
use crate::storage::{Record, ScalarValue};
use std::iter::FusedIterator;
use tracing::debug;

/// Lazy sequence of batches, one bounded query per batch.
///
/// Every yielded batch holds exactly `batch_size` records except the last,
/// which may be shorter. An empty batch ends the stream and is not yielded.
/// One connection serves every batch of a traversal; it is acquired on the
/// first pull and released when the stream ends or is dropped.
pub struct BatchStream {
    pool: ConnectionPool,
    base: String,
    params: Vec<ScalarValue>,
    batch_size: usize,
    offset: usize,
    handle: Option<ConnectionHandle>,
    done: bool,
}

/// Opens a [`BatchStream`] over `query`, which must not carry its own
/// `LIMIT`/`OFFSET`.
///
/// Fails with `InvalidArgument` right away when `batch_size` is zero.
pub fn open_batch_stream(
    pool: &ConnectionPool,
    query: &str,
    batch_size: usize,
) -> FlowResult<BatchStream> {
    BatchStream::with_params(pool, query, Vec::new(), batch_size)
}

impl BatchStream {
    pub fn with_params(
        pool: &ConnectionPool,
        query: &str,
        params: Vec<ScalarValue>,
        batch_size: usize,
    ) -> FlowResult<Self> {
        check_size("batch_size", batch_size)?;
        Ok(Self {
            pool: pool.clone(),
            base: base_query(query)?,
            params,
            batch_size,
            offset: 0,
            handle: None,
            done: false,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Offset of the next batch.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn fetch_batch(&mut self) -> FlowResult<Vec<Record>> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => self.pool.acquire()?,
        };
        let handle = self.handle.insert(handle);
        let sql = window_query(&self.base, self.batch_size, self.offset);
        handle
            .query(&sql, &self.params)
            .map_err(|e| e.into_fetch(&sql))
    }

    fn finish(&mut self) {
        self.done = true;
        // Drop releases.
        self.handle = None;
    }
}

impl Iterator for BatchStream {
    type Item = FlowResult<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fetch_batch() {
            Ok(batch) if batch.is_empty() => {
                debug!(offset = self.offset, "batch stream exhausted");
                self.finish();
                None
            }
            Ok(batch) => {
                debug!(offset = self.offset, rows = batch.len(), "batch fetched");
                self.offset += batch.len();
                if batch.len() < self.batch_size {
                    self.finish();
                }
                Some(Ok(batch))
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for BatchStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::storage::{FaultPoint, MemoryStore};

    fn setup(rows: usize) -> (MemoryStore, ConnectionPool) {
        let store = MemoryStore::new();
        let pool = ConnectionPool::new(store.clone())
            .with_bootstrap(["CREATE TABLE IF NOT EXISTS users (id INTEGER)"]);
        let mut handle = pool.acquire().unwrap();
        for i in 0..rows {
            handle
                .execute("INSERT INTO users (id) VALUES (?)", &[ScalarValue::from(i)])
                .unwrap();
        }
        handle.commit().unwrap();
        (store, pool)
    }

    fn sizes(pool: &ConnectionPool, batch_size: usize) -> Vec<usize> {
        open_batch_stream(pool, "SELECT * FROM users", batch_size)
            .unwrap()
            .map(|b| b.unwrap().len())
            .collect()
    }

    #[test]
    fn test_batch_sizes() {
        let (_store, pool) = setup(10);
        assert_eq!(sizes(&pool, 3), vec![3, 3, 3, 1]);
        assert_eq!(sizes(&pool, 5), vec![5, 5]);
        assert_eq!(sizes(&pool, 50), vec![10]);
    }

    #[test]
    fn test_empty_table_yields_nothing() {
        let (_store, pool) = setup(0);
        assert!(sizes(&pool, 4).is_empty());
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_zero_batch_size_fails_at_call_time() {
        let (store, pool) = setup(3);
        let before = store.stats();
        assert!(matches!(
            open_batch_stream(&pool, "SELECT * FROM users", 0),
            Err(FlowError::InvalidArgument(_))
        ));
        assert_eq!(store.stats(), before);
    }

    #[test]
    fn test_one_connection_per_traversal() {
        let (_store, pool) = setup(9);
        let acquired = pool.stats().acquired;
        assert_eq!(sizes(&pool, 2).len(), 5);
        assert_eq!(pool.stats().acquired - acquired, 1);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_missing_table_fails_as_fetch() {
        let (_store, pool) = setup(0);
        let mut stream = open_batch_stream(&pool, "SELECT * FROM missing", 4).unwrap();
        assert!(matches!(
            stream.next(),
            Some(Err(FlowError::Fetch { source: Some(ref cause), .. }))
                if matches!(**cause, FlowError::TableNotFound(_))
        ));
        assert!(stream.next().is_none());
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_error_ends_stream() {
        let (store, pool) = setup(6);
        let mut stream = open_batch_stream(&pool, "SELECT * FROM users;", 2).unwrap();
        assert_eq!(stream.next().unwrap().unwrap().len(), 2);
        store.fail_next(FaultPoint::Execute, 1);
        assert!(matches!(stream.next(), Some(Err(FlowError::Fetch { .. }))));
        assert!(stream.next().is_none());
        assert_eq!(stream.offset(), 2);
        assert_eq!(pool.stats().outstanding(), 0);
    }
}
