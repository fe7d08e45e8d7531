//! Connection pooling and retry
//!
//! Bounds the number of concurrent connections per Solr host and repeats
//! sends that failed below the HTTP layer.

mod connection_pool;
mod retry;

pub use connection_pool::{AcquireMode, ConnectionPool, PoolConfig, PoolGuard, PoolStats};
pub use retry::RetryPolicy;
