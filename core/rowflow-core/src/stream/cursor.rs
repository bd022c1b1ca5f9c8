//! Cursor Stream — one record per pull

use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::error::{FlowError, FlowResult};
use crate::storage::{Executed, Record, ScalarValue};
use std::iter::FusedIterator;
use tracing::{debug, warn};

enum CursorState {
    /// Nothing touched yet; the query runs on the first pull.
    Pending,
    Open(ConnectionHandle),
    Done,
}

/// Lazy sequence of records from a single query.
///
/// The connection is acquired on the first `next()` and released when the
/// cursor is exhausted, after the first error, or when the stream is
/// dropped. After `None` or an `Err` the stream stays finished.
pub struct CursorStream {
    pool: ConnectionPool,
    query: String,
    params: Vec<ScalarValue>,
    state: CursorState,
    yielded: usize,
}

/// Opens a [`CursorStream`]. No store work happens until the first pull.
pub fn open_cursor_stream(
    pool: &ConnectionPool,
    query: impl Into<String>,
    params: Vec<ScalarValue>,
) -> CursorStream {
    CursorStream {
        pool: pool.clone(),
        query: query.into(),
        params,
        state: CursorState::Pending,
        yielded: 0,
    }
}

impl CursorStream {
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Records yielded so far.
    pub fn rows_yielded(&self) -> usize {
        self.yielded
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, CursorState::Done)
    }

    fn open(&self) -> FlowResult<ConnectionHandle> {
        let mut handle = self.pool.acquire()?;
        let executed = handle
            .execute(&self.query, &self.params)
            .map_err(|e| e.into_fetch(&self.query))?;
        match executed {
            Executed::Rows => {
                debug!(query = %self.query, connection = handle.id(), "cursor opened");
                Ok(handle)
            }
            Executed::Affected(_) => Err(FlowError::InvalidArgument(format!(
                "cursor stream needs a row-returning query: {}",
                self.query
            ))),
        }
    }

    fn finish(&mut self) {
        if let CursorState::Open(handle) = std::mem::replace(&mut self.state, CursorState::Done) {
            debug!(query = %self.query, rows = self.yielded, "cursor closed");
            if let Err(e) = handle.release() {
                warn!(error = %e, "releasing cursor connection failed");
            }
        }
    }
}

impl Iterator for CursorStream {
    type Item = FlowResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                CursorState::Pending => match self.open() {
                    Ok(handle) => self.state = CursorState::Open(handle),
                    Err(e) => {
                        self.state = CursorState::Done;
                        return Some(Err(e));
                    }
                },
                CursorState::Open(handle) => {
                    return match handle.fetch_one() {
                        Ok(Some(record)) => {
                            self.yielded += 1;
                            Some(Ok(record))
                        }
                        Ok(None) => {
                            self.finish();
                            None
                        }
                        Err(e) => {
                            let e = e.into_fetch(&self.query);
                            self.finish();
                            Some(Err(e))
                        }
                    };
                }
                CursorState::Done => return None,
            }
        }
    }
}

impl FusedIterator for CursorStream {}

impl Drop for CursorStream {
    fn drop(&mut self) {
        if matches!(self.state, CursorState::Open(_)) {
            debug!(query = %self.query, rows = self.yielded, "cursor abandoned");
            self.finish();
        }
    }
}
