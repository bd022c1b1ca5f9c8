//! Resilience Chain — connection scope, transaction, retry and cache layers
//!
//! See [`Pipeline`] for the builder and [`QueryCache`] for the cache
//! component it shares with other pipelines.

pub mod cache;
pub mod pipeline;
pub mod policy;

pub use cache::{CacheStats, QueryCache};
pub use pipeline::{
    BeforeRetry, CachedPipeline, Middleware, Pipeline, Retrying, Scoped, Stage, Transactional,
};
pub use policy::RetryPolicy;
