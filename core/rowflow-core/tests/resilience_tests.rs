// 파이프라인 / 동시 조회 통합 테스트

use rowflow_core::storage::FaultPoint;
use rowflow_core::{
    ConnectionPool, ExecuteQuery, FetchUnit, FlowConfig, FlowError, MemoryStore, Pipeline,
    QueryCache, QueryOutcome, Record, RetryPolicy, ScalarValue, fetch_concurrently,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const BOOTSTRAP: &str = "CREATE TABLE IF NOT EXISTS users (id INTEGER, name TEXT, email TEXT)";

fn setup() -> (MemoryStore, ConnectionPool) {
    let store = MemoryStore::new();
    let pool = ConnectionPool::new(store.clone()).with_bootstrap([BOOTSTRAP]);
    ExecuteQuery::new("INSERT INTO users (id, name, email) VALUES (?, ?, ?), (?, ?, ?)")
        .bind(1)
        .bind("Alice")
        .bind("alice@example.com")
        .bind(2)
        .bind("Bob")
        .bind("bob@example.com")
        .run(&pool)
        .unwrap();
    (store, pool)
}

#[test]
fn test_cache_runs_identical_query_once() {
    let (_store, pool) = setup();
    let cache = Arc::new(QueryCache::<Vec<Record>>::new());
    let pipeline = Pipeline::new(&pool).cached(Arc::clone(&cache));
    let runs = AtomicUsize::new(0);
    let fetch = |query: &str| {
        pipeline.call(query, |conn| {
            runs.fetch_add(1, Ordering::SeqCst);
            conn.query(query, &[])
        })
    };

    let first = fetch("SELECT * FROM users").unwrap();
    let second = fetch("SELECT * FROM users").unwrap();
    assert_eq!(first, second);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    fetch("SELECT name FROM users").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);

    cache.invalidate("SELECT * FROM users");
    fetch("SELECT * FROM users").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn test_cache_is_shared_between_pipelines() {
    let (store, pool) = setup();
    let cache = Arc::new(QueryCache::<Vec<Record>>::new());
    let a = Pipeline::new(&pool).cached(Arc::clone(&cache));
    let b = Pipeline::new(&pool)
        .retry(RetryPolicy::immediate(2).unwrap())
        .cached(Arc::clone(&cache));
    a.fetch("SELECT * FROM users").unwrap();
    let connects = store.stats().connects;
    assert_eq!(b.fetch("SELECT * FROM users").unwrap().len(), 2);
    assert_eq!(store.stats().connects, connects);
}

#[test]
fn test_retry_against_store_faults() {
    let (store, pool) = setup();
    let pipeline = Pipeline::new(&pool)
        .transactional()
        .retry(RetryPolicy::immediate(3).unwrap());

    store.fail_next(FaultPoint::Execute, 2);
    let rows = pipeline.fetch("SELECT * FROM users", &[]).unwrap();
    assert_eq!(rows.len(), 2);

    store.fail_next(FaultPoint::Execute, 3);
    assert!(matches!(
        pipeline.fetch("SELECT * FROM users", &[]),
        Err(FlowError::Fetch { .. })
    ));
    assert_eq!(pool.stats().outstanding(), 0);
}

#[test]
fn test_connection_error_is_not_retried() {
    let (store, pool) = setup();
    let pipeline = Pipeline::new(&pool).retry(RetryPolicy::new(5, Duration::from_secs(5)).unwrap());
    store.set_unreachable(true);
    let acquired = pool.stats().acquired;
    assert!(matches!(
        pipeline.fetch("SELECT * FROM users", &[]),
        Err(FlowError::Connection(_))
    ));
    assert_eq!(pool.stats().acquired, acquired);
}

#[test]
fn test_transaction_all_or_nothing() {
    let (store, pool) = setup();
    let pipeline = Pipeline::new(&pool).transactional();

    let result = pipeline.call(|conn| {
        conn.execute(
            "UPDATE users SET email = ? WHERE id = ?",
            &["alice@new.io".into(), 1.into()],
        )?;
        conn.execute("INSERT INTO users (id, name, email) VALUES (3, 'Carol', NULL)", &[])?;
        Err::<(), _>(FlowError::ConstraintViolation("email required".to_string()))
    });
    assert!(matches!(result, Err(FlowError::ConstraintViolation(_))));
    assert_eq!(store.table_len("users"), Some(2));
    let email = pipeline
        .fetch("SELECT email FROM users WHERE id = 1", &[])
        .unwrap();
    assert_eq!(email[0].get("email"), Some(&ScalarValue::from("alice@example.com")));

    pipeline
        .call(|conn| {
            conn.execute(
                "UPDATE users SET email = ? WHERE id = ?",
                &["alice@new.io".into(), 1.into()],
            )?;
            conn.execute("DELETE FROM users WHERE id = 2", &[])
        })
        .unwrap();
    let rows = pipeline.fetch("SELECT * FROM users", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("email"), Some(&ScalarValue::from("alice@new.io")));
}

#[test]
fn test_without_transaction_writes_are_discarded_on_release() {
    let (store, pool) = setup();
    let affected = Pipeline::new(&pool)
        .execute("DELETE FROM users", &[])
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(store.table_len("users"), Some(2));
}

#[test]
fn test_execute_query_rolls_back_failed_mutation() {
    let (store, pool) = setup();
    let result = ExecuteQuery::new("UPDATE users SET missing = 1").run(&pool);
    assert!(matches!(result, Err(FlowError::ColumnNotFound { .. })));
    assert_eq!(store.stats().open_connections(), 0);

    let QueryOutcome::Affected(n) = ExecuteQuery::new("DELETE FROM users WHERE id = ?")
        .bind(2)
        .run(&pool)
        .unwrap()
    else {
        panic!("Expected affected count");
    };
    assert_eq!(n, 1);
    assert_eq!(store.table_len("users"), Some(1));
}

#[test]
fn test_fetch_concurrently_preserves_call_order() {
    let (store, pool) = setup();
    let all_users: FetchUnit<Vec<Record>> = Box::new(|conn| {
        std::thread::sleep(Duration::from_millis(80));
        conn.query("SELECT * FROM users", &[])
    });
    let bob: FetchUnit<Vec<Record>> =
        Box::new(|conn| conn.query("SELECT * FROM users WHERE name = 'Bob'", &[]));

    let results = fetch_concurrently(&pool, vec![all_users, bob]).unwrap();
    assert_eq!(results[0].len(), 2);
    assert_eq!(results[1].len(), 1);
    assert_eq!(store.stats().open_connections(), 0);
}

#[test]
fn test_fetch_concurrently_runs_units_in_parallel() {
    let (_store, pool) = setup();
    let units: Vec<_> = (0..4)
        .map(|_| {
            |conn: &mut rowflow_core::ConnectionHandle| {
                std::thread::sleep(Duration::from_millis(100));
                conn.query("SELECT id FROM users", &[])
            }
        })
        .collect();
    let started = std::time::Instant::now();
    let results = fetch_concurrently(&pool, units).unwrap();
    assert_eq!(results.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(390));
}

#[test]
fn test_pipeline_from_config() {
    let (_store, pool) = setup();
    let mut config = FlowConfig::default();
    config
        .apply_overrides(|name| match name {
            "ROWFLOW_RETRY_MAX_ATTEMPTS" => Some("2".to_string()),
            "ROWFLOW_RETRY_DELAY_MS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
    config.validate().unwrap();

    let calls = AtomicUsize::new(0);
    let pipeline = Pipeline::new(&pool).retry(config.retry_policy().unwrap());
    let result: Result<(), _> = pipeline.call(|_conn| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(FlowError::fetch("flaky", "SELECT 1"))
    });
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
