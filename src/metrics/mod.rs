//! Metrics collection module
//!
//! Tracks query counts, error kinds and latency per collection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Number of latency samples kept per collection
const LATENCY_WINDOW: usize = 100;

/// Query metrics collector
pub struct Metrics {
    /// Total query count
    pub total_queries: AtomicU64,
    /// Queries per collection
    queries: RwLock<HashMap<String, u64>>,
    /// Response times per collection (rolling window in ms)
    response_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Failed queries per collection
    errors: RwLock<HashMap<String, u64>>,
    /// Successful queries per collection
    successes: RwLock<HashMap<String, u64>>,
    /// Failures by error kind
    error_kinds: RwLock<HashMap<&'static str, u64>>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_queries: AtomicU64::new(0),
            queries: RwLock::new(HashMap::new()),
            response_times: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
            successes: RwLock::new(HashMap::new()),
            error_kinds: RwLock::new(HashMap::new()),
        }
    }

    /// Record a query against a collection
    pub fn record_query(&self, collection: &str) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        let mut queries = self.queries.write().unwrap();
        *queries.entry(collection.to_string()).or_insert(0) += 1;
    }

    /// Record a response time
    pub fn record_response_time(&self, collection: &str, time_ms: u64) {
        let mut times = self.response_times.write().unwrap();
        let entry = times.entry(collection.to_string()).or_default();

        if entry.len() >= LATENCY_WINDOW {
            entry.remove(0);
        }
        entry.push(time_ms);
    }

    /// Record a failed query
    pub fn record_error(&self, collection: &str, kind: &'static str) {
        {
            let mut errors = self.errors.write().unwrap();
            *errors.entry(collection.to_string()).or_insert(0) += 1;
        }
        let mut kinds = self.error_kinds.write().unwrap();
        *kinds.entry(kind).or_insert(0) += 1;
    }

    /// Record a successful query
    pub fn record_success(&self, collection: &str) {
        let mut successes = self.successes.write().unwrap();
        *successes.entry(collection.to_string()).or_insert(0) += 1;
    }

    /// Get total queries
    pub fn get_total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    /// Get number of failures of one error kind
    pub fn get_error_count(&self, kind: &str) -> u64 {
        *self.error_kinds.read().unwrap().get(kind).unwrap_or(&0)
    }

    /// Get average response time for a collection
    pub fn get_avg_response_time(&self, collection: &str) -> Option<u64> {
        let times = self.response_times.read().unwrap();
        times.get(collection).and_then(|t| {
            if t.is_empty() {
                None
            } else {
                Some(t.iter().sum::<u64>() / t.len() as u64)
            }
        })
    }

    /// Get reliability percentage for a collection
    pub fn get_reliability(&self, collection: &str) -> f64 {
        let errors = self.errors.read().unwrap();
        let successes = self.successes.read().unwrap();

        let error_count = *errors.get(collection).unwrap_or(&0);
        let success_count = *successes.get(collection).unwrap_or(&0);

        let total = error_count + success_count;
        if total == 0 {
            100.0
        } else {
            (success_count as f64 / total as f64) * 100.0
        }
    }

    /// Get statistics for every queried collection
    pub fn get_collection_stats(&self) -> HashMap<String, CollectionStats> {
        let queries = self.queries.read().unwrap();
        let mut stats = HashMap::new();

        for (collection, count) in queries.iter() {
            stats.insert(
                collection.clone(),
                CollectionStats {
                    queries: *count,
                    avg_response_time: self.get_avg_response_time(collection),
                    reliability: self.get_reliability(collection),
                },
            );
        }

        stats
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a single collection
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub queries: u64,
    pub avg_response_time: Option<u64>,
    pub reliability: f64,
}
