//! Concurrent Fetch Orchestrator — Rayon-based fan-out with ordered join
//!
//! Each unit of work runs on a worker thread with its own connection.
//! 결과는 완료 순서와 무관하게 입력 순서대로 반환됩니다.

use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::error::{FlowError, FlowResult};
use crate::storage::Record;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Upper bound on the workers a `PerUnit` call spawns; further units queue.
pub const MAX_PER_UNIT_THREADS: usize = 64;

/// Boxed unit of work, for mixing different closures in one call.
pub type FetchUnit<T> = Box<dyn FnOnce(&mut ConnectionHandle) -> FlowResult<T> + Send>;

/// Worker thread policy for [`FetchOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelizationPolicy {
    /// One worker per logical CPU, capped at 16
    #[default]
    Auto,
    /// Use a fixed number of threads
    Fixed(usize),
    /// A fresh pool per call with one worker per unit (at most
    /// [`MAX_PER_UNIT_THREADS`]), so every unit starts immediately
    PerUnit,
}

pub struct FetchOrchestrator {
    connections: ConnectionPool,
    policy: ParallelizationPolicy,
    /// Shared workers; `None` under `PerUnit`.
    workers: Option<Arc<rayon::ThreadPool>>,
}

impl FetchOrchestrator {
    pub fn new(connections: &ConnectionPool, policy: ParallelizationPolicy) -> FlowResult<Self> {
        let workers = match policy {
            ParallelizationPolicy::Auto => Some(build_workers(num_cpus::get().min(16))?),
            ParallelizationPolicy::Fixed(0) => {
                return Err(FlowError::InvalidArgument(
                    "Thread count must be greater than 0".to_string(),
                ));
            }
            ParallelizationPolicy::Fixed(n) => Some(build_workers(n)?),
            ParallelizationPolicy::PerUnit => None,
        };
        Ok(Self {
            connections: connections.clone(),
            policy,
            workers,
        })
    }

    pub fn policy(&self) -> ParallelizationPolicy {
        self.policy
    }

    /// Worker count for a call with `units` units.
    pub fn thread_count(&self, units: usize) -> usize {
        match &self.workers {
            Some(workers) => workers.current_num_threads(),
            None => units.clamp(1, MAX_PER_UNIT_THREADS),
        }
    }

    /// Runs every unit concurrently and returns their results in input
    /// order.
    ///
    /// Waits for all units. If any failed, returns
    /// [`FlowError::AggregateFetch`] carrying the lowest failing index and
    /// discards the other results.
    pub fn fetch_concurrently<T, F>(&self, units: Vec<F>) -> FlowResult<Vec<T>>
    where
        T: Send,
        F: FnOnce(&mut ConnectionHandle) -> FlowResult<T> + Send,
    {
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let count = units.len();
        let connections = &self.connections;
        let run = move || -> Vec<FlowResult<T>> {
            units
                .into_par_iter()
                .map(|unit| -> FlowResult<T> {
                    let mut handle = connections.acquire()?;
                    let value = unit(&mut handle)?;
                    handle.release()?;
                    Ok(value)
                })
                .collect()
        };
        let results = match &self.workers {
            Some(workers) => workers.install(run),
            None => build_workers(self.thread_count(count))?.install(run),
        };
        debug!(units = count, "concurrent fetch joined");

        let mut values = Vec::with_capacity(count);
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(value) => values.push(value),
                Err(e) => {
                    return Err(FlowError::AggregateFetch {
                        index,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(values)
    }

    /// Runs each query on its own connection; rows come back in query order.
    pub fn fetch_queries(&self, queries: &[&str]) -> FlowResult<Vec<Vec<Record>>> {
        let units: Vec<_> = queries
            .iter()
            .map(|&query| move |conn: &mut ConnectionHandle| conn.query(query, &[]))
            .collect();
        self.fetch_concurrently(units)
    }
}

fn build_workers(threads: usize) -> FlowResult<Arc<rayon::ThreadPool>> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("rowflow-fetch-{}", i))
        .build()
        .map(Arc::new)
        .map_err(|e| FlowError::Connection(format!("Failed to create thread pool: {}", e)))
}

/// [`FetchOrchestrator::fetch_concurrently`] under
/// [`ParallelizationPolicy::PerUnit`].
pub fn fetch_concurrently<T, F>(connections: &ConnectionPool, units: Vec<F>) -> FlowResult<Vec<T>>
where
    T: Send,
    F: FnOnce(&mut ConnectionHandle) -> FlowResult<T> + Send,
{
    FetchOrchestrator::new(connections, ParallelizationPolicy::PerUnit)?.fetch_concurrently(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, ScalarValue};
    use std::time::Duration;

    fn setup() -> ConnectionPool {
        let pool = ConnectionPool::new(MemoryStore::new())
            .with_bootstrap(["CREATE TABLE IF NOT EXISTS users (id INTEGER, age INTEGER)"]);
        let mut handle = pool.acquire().unwrap();
        handle
            .execute(
                "INSERT INTO users (id, age) VALUES (1, 25), (2, 45), (3, 52)",
                &[],
            )
            .unwrap();
        handle.commit().unwrap();
        pool
    }

    #[test]
    fn test_fixed_zero_threads() {
        let pool = setup();
        assert!(FetchOrchestrator::new(&pool, ParallelizationPolicy::Fixed(0)).is_err());
    }

    #[test]
    fn test_thread_count() {
        let pool = setup();
        let fixed = FetchOrchestrator::new(&pool, ParallelizationPolicy::Fixed(3)).unwrap();
        assert_eq!(fixed.thread_count(10), 3);
        let per_unit = FetchOrchestrator::new(&pool, ParallelizationPolicy::PerUnit).unwrap();
        assert_eq!(per_unit.thread_count(5), 5);
        assert_eq!(per_unit.thread_count(0), 1);
        assert_eq!(per_unit.thread_count(10_000), MAX_PER_UNIT_THREADS);
        assert_eq!(per_unit.policy(), ParallelizationPolicy::PerUnit);
    }

    #[test]
    fn test_results_keep_input_order() {
        let pool = setup();
        let slow: FetchUnit<&'static str> = Box::new(|conn| {
            std::thread::sleep(Duration::from_millis(50));
            conn.query("SELECT * FROM users", &[]).map(|_| "slow")
        });
        let fast: FetchUnit<&'static str> =
            Box::new(|conn| conn.query("SELECT * FROM users", &[]).map(|_| "fast"));
        assert_eq!(
            fetch_concurrently(&pool, vec![slow, fast]).unwrap(),
            vec!["slow", "fast"]
        );
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_first_failure_by_index() {
        let pool = setup();
        let count = |table: &'static str| -> FetchUnit<usize> {
            Box::new(move |conn| {
                conn.query(&format!("SELECT * FROM {table}"), &[])
                    .map(|rows| rows.len())
            })
        };
        let units = vec![count("users"), count("missing"), count("gone")];
        let err = fetch_concurrently(&pool, units).unwrap_err();
        match err {
            FlowError::AggregateFetch { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, FlowError::TableNotFound(ref t) if t == "missing"));
            }
            other => panic!("Expected AggregateFetch, got {other:?}"),
        }
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_more_units_than_per_unit_cap() {
        let pool = setup();
        let units: Vec<_> = (0..MAX_PER_UNIT_THREADS * 3)
            .map(|i| {
                move |conn: &mut ConnectionHandle| conn.query("SELECT id FROM users", &[]).map(|_| i)
            })
            .collect();
        let results = fetch_concurrently(&pool, units).unwrap();
        assert_eq!(results, (0..MAX_PER_UNIT_THREADS * 3).collect::<Vec<_>>());
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_fetch_queries() {
        let pool = setup();
        let orchestrator = FetchOrchestrator::new(&pool, ParallelizationPolicy::Fixed(2)).unwrap();
        let results = orchestrator
            .fetch_queries(&[
                "SELECT * FROM users",
                "SELECT * FROM users WHERE age > 40",
            ])
            .unwrap();
        assert_eq!(results[0].len(), 3);
        assert_eq!(results[1].len(), 2);
        assert_eq!(results[1][0].get("id"), Some(&ScalarValue::Integer(2)));
    }
}
