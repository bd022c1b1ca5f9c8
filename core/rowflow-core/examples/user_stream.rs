//! 스트리밍 계층 사용 예제
//!
//! 실행: RUST_LOG=debug cargo run --example user_stream --features logging

use rowflow_core::storage::seed;
use rowflow_core::{
    ConnectionPool, FetchUnit, FlowConfig, MemoryStore, Pipeline, QueryCache, Record, ScalarValue,
    compute_mean, fetch_concurrently, lazy_paginate, open_batch_stream, open_cursor_stream,
};
use std::sync::Arc;

fn main() -> rowflow_core::FlowResult<()> {
    // 로깅 초기화
    rowflow_core::logging::init();

    let mut config = FlowConfig::default();
    config.apply_env()?;
    config.validate()?;

    println!("=== rowflow 스트리밍 예제 ===\n");

    let store = MemoryStore::new();
    seed::create_table(&store, "user_data", &["user_id", "name", "email", "age"])?;
    let users: Vec<Record> = [
        ("Alice", 25),
        ("Bob", 35),
        ("Carol", 45),
        ("Dan", 30),
        ("Eve", 42),
        ("Frank", 38),
    ]
    .iter()
    .enumerate()
    .map(|(i, (name, age))| {
        Record::from_pairs([
            ("user_id", ScalarValue::from(format!("u-{i}"))),
            ("name", ScalarValue::from(*name)),
            ("email", ScalarValue::from(format!("{}@example.com", name.to_lowercase()))),
            ("age", ScalarValue::from(*age)),
        ])
    })
    .collect();
    seed::insert_many(&store, "user_data", &users)?;
    let pool = ConnectionPool::new(store.clone());

    println!("첫 3명:");
    for user in open_cursor_stream(&pool, "SELECT * FROM user_data", vec![]).take(3) {
        println!("  {}", serde_json::to_string(&user?)?);
    }

    println!("\n배치 (batch_size = {}):", config.batch_size.min(4));
    for batch in open_batch_stream(&pool, "SELECT name, age FROM user_data", config.batch_size.min(4))? {
        let batch = batch?;
        let over_25: Vec<String> = batch
            .iter()
            .filter(|u| u.get("age").and_then(ScalarValue::as_i64).is_some_and(|a| a > 25))
            .map(|u| u.get("name").map(ToString::to_string).unwrap_or_default())
            .collect();
        println!("  {} rows, over 25: {:?}", batch.len(), over_25);
    }

    println!("\n페이지 (page_size = 2):");
    for (i, page) in lazy_paginate(&pool, "SELECT name FROM user_data", 2)?.enumerate() {
        println!("  page {}: {} rows", i + 1, page?.len());
    }

    println!(
        "\n평균 나이: {:.2}",
        compute_mean(&pool, "SELECT age FROM user_data", "age")?
    );

    let cache = Arc::new(QueryCache::<Vec<Record>>::new());
    let pipeline = Pipeline::new(&pool)
        .transactional()
        .retry(config.retry_policy()?)
        .cached(Arc::clone(&cache));
    pipeline.fetch("SELECT * FROM user_data")?;
    pipeline.fetch("SELECT * FROM user_data")?;
    println!("\n캐시: {:?}", cache.stats());

    let everyone: FetchUnit<Vec<Record>> =
        Box::new(|conn| conn.query("SELECT * FROM user_data", &[]));
    let seniors: FetchUnit<Vec<Record>> =
        Box::new(|conn| conn.query("SELECT * FROM user_data WHERE age > 40", &[]));
    let results = fetch_concurrently(&pool, vec![everyone, seniors]);
    match results {
        Ok(sets) => println!("동시 조회: {:?}", sets.iter().map(Vec::len).collect::<Vec<_>>()),
        Err(e) => println!("동시 조회 실패: {e}"),
    }

    println!("\n연결 통계: {:?}", store.stats());
    Ok(())
}
