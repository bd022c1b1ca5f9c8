//! Typestate middleware pipeline
//!
//! 레이어는 Connection scope → Transaction → Retry → Cache 순서로만 추가할 수
//! 있으며, 순서 위반은 컴파일 타임에 거부됩니다.
//!
//! ```compile_fail
//! use rowflow_core::{ConnectionPool, MemoryStore, Pipeline, RetryPolicy};
//!
//! let pool = ConnectionPool::new(MemoryStore::new());
//! // retry() then transactional() does not exist
//! let _ = Pipeline::new(&pool).retry(RetryPolicy::default()).transactional();
//! ```
//!
//! At call time the layers nest outermost first:
//! cache lookup, then the retry loop, then one connection scope per attempt
//! with the transaction inside it, then the unit of work.

use super::cache::QueryCache;
use super::policy::RetryPolicy;
use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::error::FlowResult;
use crate::storage::{Executed, Record, ScalarValue};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

mod sealed {
    pub trait Sealed {}
}

/// Builder stage marker.
pub trait Stage: sealed::Sealed {}

/// Connection scope only
pub struct Scoped;

/// Connection scope + transaction
pub struct Transactional;

/// Retry layer added; only `cached()` may follow.
pub struct Retrying;

impl sealed::Sealed for Scoped {}
impl sealed::Sealed for Transactional {}
impl sealed::Sealed for Retrying {}
impl Stage for Scoped {}
impl Stage for Transactional {}
impl Stage for Retrying {}

/// Stages that can still take a retry layer.
pub trait BeforeRetry: Stage {}
impl BeforeRetry for Scoped {}
impl BeforeRetry for Transactional {}

/// One layer of a pipeline, in the order it was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Middleware {
    ConnectionScope,
    Transaction,
    Retry(RetryPolicy),
    Cache,
}

/// Layer list plus the pool; executes a unit of work through every layer
/// except the cache.
#[derive(Clone)]
struct Chain {
    pool: ConnectionPool,
    layers: Vec<Middleware>,
}

impl Chain {
    fn transactional(&self) -> bool {
        self.layers.contains(&Middleware::Transaction)
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.layers.iter().find_map(|layer| match layer {
            Middleware::Retry(policy) => Some(*policy),
            _ => None,
        })
    }

    fn call<T, F>(&self, mut work: F) -> FlowResult<T>
    where
        F: FnMut(&mut ConnectionHandle) -> FlowResult<T>,
    {
        let policy = self.retry_policy();
        let max_attempts = policy.map_or(1, |p| p.max_attempts());
        let mut attempt = 1;
        loop {
            match self.run_scoped(&mut work) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(attempt, max_attempts, error = %e, "attempt failed, retrying");
                    if let Some(p) = policy
                        && !p.delay().is_zero()
                    {
                        std::thread::sleep(p.delay());
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if policy.is_some() {
                        warn!(attempts = attempt, error = %e, "giving up");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One attempt: acquire, run, commit or roll back, release.
    fn run_scoped<T, F>(&self, work: &mut F) -> FlowResult<T>
    where
        F: FnMut(&mut ConnectionHandle) -> FlowResult<T>,
    {
        let mut handle = self.pool.acquire()?;
        let result = work(&mut handle);
        if !self.transactional() {
            return result;
        }
        match result {
            Ok(value) => {
                if let Err(e) = handle.commit() {
                    rollback_quietly(&mut handle);
                    return Err(e);
                }
                info!(connection = handle.id(), "transaction committed");
                Ok(value)
            }
            Err(e) => {
                rollback_quietly(&mut handle);
                info!(connection = handle.id(), error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }
}

fn rollback_quietly(handle: &mut ConnectionHandle) {
    if let Err(e) = handle.rollback() {
        warn!(connection = handle.id(), error = %e, "rollback failed");
    }
}

/// Builder-composed resilience chain around a unit of work.
///
/// ```rust
/// use rowflow_core::{ConnectionPool, MemoryStore, Pipeline, RetryPolicy};
///
/// # fn main() -> rowflow_core::FlowResult<()> {
/// let pool = ConnectionPool::new(MemoryStore::new())
///     .with_bootstrap(["CREATE TABLE IF NOT EXISTS users (id INTEGER, email TEXT)"]);
/// let pipeline = Pipeline::new(&pool)
///     .transactional()
///     .retry(RetryPolicy::immediate(3)?);
/// pipeline.call(|conn| {
///     conn.execute("INSERT INTO users (id, email) VALUES (?, ?)", &[1.into(), "a@x.io".into()])
/// })?;
/// assert_eq!(pipeline.fetch("SELECT * FROM users", &[])?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<S: Stage> {
    chain: Chain,
    _stage: PhantomData<S>,
}

impl Pipeline<Scoped> {
    /// Base pipeline: a fresh connection per call, released on every exit.
    pub fn new(pool: &ConnectionPool) -> Self {
        Self {
            chain: Chain {
                pool: pool.clone(),
                layers: vec![Middleware::ConnectionScope],
            },
            _stage: PhantomData,
        }
    }

    /// Commit on success, roll back on failure.
    pub fn transactional(self) -> Pipeline<Transactional> {
        self.push(Middleware::Transaction)
    }
}

impl<S: BeforeRetry> Pipeline<S> {
    pub fn retry(self, policy: RetryPolicy) -> Pipeline<Retrying> {
        self.push(Middleware::Retry(policy))
    }
}

impl<S: Stage> Pipeline<S> {
    fn push<N: Stage>(mut self, layer: Middleware) -> Pipeline<N> {
        self.chain.layers.push(layer);
        Pipeline {
            chain: self.chain,
            _stage: PhantomData,
        }
    }

    /// Outermost layer: results cached by key.
    pub fn cached<V: Clone>(mut self, cache: Arc<QueryCache<V>>) -> CachedPipeline<V> {
        self.chain.layers.push(Middleware::Cache);
        CachedPipeline {
            chain: self.chain,
            cache,
        }
    }

    /// Layers in the order they were added.
    pub fn layers(&self) -> &[Middleware] {
        &self.chain.layers
    }

    /// Runs `work` through every layer. With retries `work` may run more
    /// than once, each time on a new connection.
    pub fn call<T, F>(&self, work: F) -> FlowResult<T>
    where
        F: FnMut(&mut ConnectionHandle) -> FlowResult<T>,
    {
        self.chain.call(work)
    }

    /// Row-returning `query` through the pipeline.
    pub fn fetch(&self, query: &str, params: &[ScalarValue]) -> FlowResult<Vec<Record>> {
        self.call(|conn| conn.query(query, params))
    }

    /// Any statement through the pipeline; rows read or rows affected.
    pub fn execute(&self, query: &str, params: &[ScalarValue]) -> FlowResult<usize> {
        self.call(|conn| match conn.execute(query, params)? {
            Executed::Rows => conn.fetch_all().map(|rows| rows.len()),
            Executed::Affected(n) => Ok(n),
        })
    }
}

/// Pipeline with the cache layer on top. A hit returns without opening a
/// connection.
pub struct CachedPipeline<V> {
    chain: Chain,
    cache: Arc<QueryCache<V>>,
}

impl<V: Clone> CachedPipeline<V> {
    pub fn layers(&self) -> &[Middleware] {
        &self.chain.layers
    }

    pub fn cache(&self) -> &QueryCache<V> {
        &self.cache
    }

    /// Returns the cached value for `key`, or runs `work` through the
    /// inner layers and caches its success. Failures are not cached.
    pub fn call<F>(&self, key: &str, work: F) -> FlowResult<V>
    where
        F: FnMut(&mut ConnectionHandle) -> FlowResult<V>,
    {
        if let Some(value) = self.cache.get(key) {
            debug!(key, "cache hit");
            return Ok(value);
        }
        debug!(key, "cache miss");
        let value = self.chain.call(work)?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }
}

impl CachedPipeline<Vec<Record>> {
    /// Row-returning `query`, cached under its exact text.
    pub fn fetch(&self, query: &str) -> FlowResult<Vec<Record>> {
        self.call(query, |conn| conn.query(query, &[]))
    }
}
