//! Lazy Paginator — on-demand pages, one connection round trip each

use super::{base_query, check_size, window_query};
use crate::connection::ConnectionPool;
use crate::error::FlowResult;
use crate::storage::Record;
use std::iter::FusedIterator;
use tracing::debug;

/// Fetches one page: `page_size` records starting at `offset`.
///
/// Acquires and releases its own connection.
pub fn paginate(
    pool: &ConnectionPool,
    query: &str,
    page_size: usize,
    offset: usize,
) -> FlowResult<Vec<Record>> {
    check_size("page_size", page_size)?;
    let sql = window_query(&base_query(query)?, page_size, offset);
    let mut handle = pool.acquire()?;
    let page = handle.query(&sql, &[]).map_err(|e| e.into_fetch(&sql))?;
    handle.release()?;
    Ok(page)
}

/// Pages of `query` from offset 0 until the first empty page.
pub fn lazy_paginate(
    pool: &ConnectionPool,
    query: &str,
    page_size: usize,
) -> FlowResult<LazyPaginator> {
    lazy_paginate_from(pool, query, page_size, 0)
}

/// Resumes pagination at `offset`, e.g. one saved from
/// [`LazyPaginator::offset`].
pub fn lazy_paginate_from(
    pool: &ConnectionPool,
    query: &str,
    page_size: usize,
    offset: usize,
) -> FlowResult<LazyPaginator> {
    check_size("page_size", page_size)?;
    Ok(LazyPaginator {
        pool: pool.clone(),
        base: base_query(query)?,
        page_size,
        offset,
        done: false,
    })
}

/// Iterator over pages.
///
/// Pages are read independently, so rows written between two pages may
/// shift the window.
pub struct LazyPaginator {
    pool: ConnectionPool,
    base: String,
    page_size: usize,
    offset: usize,
    done: bool,
}

impl LazyPaginator {
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Offset of the next unread page.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for LazyPaginator {
    type Item = FlowResult<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match paginate(&self.pool, &self.base, self.page_size, self.offset) {
            Ok(page) if page.is_empty() => {
                self.done = true;
                None
            }
            Ok(page) => {
                debug!(offset = self.offset, rows = page.len(), "page fetched");
                self.offset += page.len();
                if page.len() < self.page_size {
                    self.done = true;
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for LazyPaginator {}
