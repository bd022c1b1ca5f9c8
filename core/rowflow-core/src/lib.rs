//! # rowflow — Streaming Row Access
//!
//! rowflow는 결과 집합 전체를 메모리에 올리지 않고 저장소의 행을 읽는
//! 스트리밍 데이터 접근 계층입니다. 행 / 배치 / 페이지 단위의 지연 스트림과
//! 스트림 위의 온라인 집계, 그리고 연결 · 트랜잭션 · 재시도 · 캐시를 고정된
//! 순서로 감싸는 파이프라인을 제공합니다.
//!
//! ## 주요 특징
//!
//! - **Lazy streams**: [`CursorStream`], [`BatchStream`], [`LazyPaginator`]
//! - **Online aggregation**: O(1) 메모리의 [`Accumulator`] (Sum, Count, Min, Max, Mean)
//! - **Resilience pipeline**: Typestate 빌더로 레이어 순서를 컴파일 타임에 보장
//! - **Concurrent fetch**: Rayon 스레드 풀, 입력 순서대로 결과 결합
//!
//! ## 빠른 시작
//!
//! ```rust
//! use rowflow_core::{ConnectionPool, MemoryStore, open_batch_stream, compute_mean};
//!
//! # fn main() -> rowflow_core::FlowResult<()> {
//! let pool = ConnectionPool::new(MemoryStore::new())
//!     .with_bootstrap(["CREATE TABLE IF NOT EXISTS user_data (name TEXT, age INTEGER)"]);
//!
//! let mut conn = pool.acquire()?;
//! conn.execute(
//!     "INSERT INTO user_data (name, age) VALUES ('Alice', 25), ('Bob', 35), ('Carol', 45)",
//!     &[],
//! )?;
//! conn.commit()?;
//! conn.release()?;
//!
//! // 배치 스트림
//! for batch in open_batch_stream(&pool, "SELECT * FROM user_data", 2)? {
//!     assert!(batch?.len() <= 2);
//! }
//!
//! // 온라인 평균
//! assert_eq!(compute_mean(&pool, "SELECT age FROM user_data", "age")?, 35.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## 모듈 구조
//!
//! - [`connection`] — 연결 리소스 ([`ConnectionPool`], [`ConnectionHandle`])
//! - [`stream`] — 커서 / 배치 / 페이지 스트림
//! - [`aggregate`] — 온라인 집계
//! - [`resilience`] — 파이프라인, 재시도 정책, 쿼리 캐시
//! - [`orchestrator`] — 동시 조회
//! - [`storage`] — 저장소 트레이트와 인메모리 참조 저장소
//! - [`config`] — [`FlowConfig`]

pub mod aggregate;
pub mod config;
pub mod connection;
pub mod error;
pub mod orchestrator;
pub mod resilience;
pub mod storage;
pub mod stream;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use aggregate::{Accumulator, Count, Max, Mean, Min, Sum, aggregate, compute_mean};
pub use config::{FlowConfig, RetryConfig};
pub use connection::{ConnectionHandle, ConnectionPool, ExecuteQuery, PoolStats, QueryOutcome};
pub use error::{FlowError, FlowResult};
pub use orchestrator::{FetchOrchestrator, FetchUnit, ParallelizationPolicy, fetch_concurrently};
pub use resilience::{CachedPipeline, Middleware, Pipeline, QueryCache, RetryPolicy};
pub use storage::{Executed, MemoryStore, Record, ScalarValue, Store, StoreConnection};
pub use stream::{
    BatchStream, CursorStream, LazyPaginator, lazy_paginate, lazy_paginate_from,
    open_batch_stream, open_cursor_stream, paginate,
};
