//! Bounded, per-host connection pool with retrying sends

use super::retry::RetryPolicy;
use crate::config::Settings;
use crate::network::{Connection, RawResponse, Transport, TransportError, TransportRequest};
use crate::search::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// What `acquire` does when every connection for a host is in use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireMode {
    /// Wait for a connection to be released
    #[default]
    Block,
    /// Fail immediately with a pool-exhausted error
    FailFast,
}

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections per scheme/host/port
    pub max_size: usize,
    /// Behaviour when the pool is exhausted
    pub acquire_mode: AcquireMode,
    /// Upper bound for a blocking acquire
    pub acquire_timeout: Option<Duration>,
    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Option<Duration>,
    /// Retry policy for sends
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: crate::DEFAULT_POOL_SIZE,
            acquire_mode: AcquireMode::Block,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(90)),
            retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Build pool configuration from settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_size: settings.pool.max_size,
            acquire_mode: settings.pool.acquire_mode,
            acquire_timeout: settings.pool.acquire_timeout_secs.map(Duration::from_secs_f64),
            idle_timeout: settings.pool.idle_timeout_secs.map(Duration::from_secs_f64),
            retry: RetryPolicy {
                max_retries: settings.retry.max_retries,
                initial_backoff: Duration::from_millis(settings.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(settings.retry.max_backoff_ms),
                jitter: settings.retry.jitter,
            },
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_acquire_mode(mut self, mode: AcquireMode) -> Self {
        self.acquire_mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Snapshot of one host's pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub key: String,
    pub max_size: usize,
    /// Guards currently handed out
    pub in_use: usize,
    /// Connections waiting for reuse
    pub idle: usize,
    /// Connections opened over the pool's lifetime
    pub opened: u64,
    /// Connections closed because they failed or were abandoned mid-request
    pub evicted: u64,
    /// Sends repeated after a transport failure
    pub retries: u64,
}

/// An idle connection with the time it was returned
struct IdleConnection {
    connection: Box<dyn Connection>,
    idle_since: Instant,
}

/// Connections for a single scheme/host/port
struct HostPool {
    key: String,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    opened: AtomicU64,
    evicted: AtomicU64,
    retries: AtomicU64,
}

impl HostPool {
    fn new(key: String, max_size: usize) -> Self {
        Self {
            key,
            semaphore: Arc::new(Semaphore::new(max_size)),
            idle: Mutex::new(VecDeque::new()),
            opened: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recently used idle connection that has not expired
    fn take_idle(&self, idle_timeout: Option<Duration>) -> Option<Box<dyn Connection>> {
        let mut idle = self.idle();
        while let Some(entry) = idle.pop_back() {
            let expired = idle_timeout.is_some_and(|t| entry.idle_since.elapsed() > t);
            if !expired {
                return Some(entry.connection);
            }
            debug!("Closing expired connection {} to {}", entry.connection.id(), self.key);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    fn put_idle(&self, connection: Box<dyn Connection>) {
        self.idle().push_back(IdleConnection {
            connection,
            idle_since: Instant::now(),
        });
    }
}

/// Connection pool shared by all queries of a client
///
/// Each scheme/host/port gets its own bound of `max_size` connections. A
/// [`PoolGuard`] owns one slot until it is released or dropped; dropping it
/// in the middle of a request (timeout, cancellation, panic) closes the
/// connection instead of returning it.
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    config: PoolConfig,
    hosts: Mutex<HashMap<String, Arc<HostPool>>>,
}

impl ConnectionPool {
    /// Create a pool on top of `transport`
    ///
    /// # Panics
    ///
    /// Panics if `config.max_size` is zero.
    pub fn new(transport: Arc<dyn Transport>, config: PoolConfig) -> Self {
        assert!(config.max_size > 0, "pool max_size must be greater than zero");
        Self {
            transport,
            config,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn host(&self, endpoint: &Endpoint) -> Arc<HostPool> {
        let key = endpoint.pool_key();
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .entry(key.clone())
            .or_insert_with(|| Arc::new(HostPool::new(key, self.config.max_size)))
            .clone()
    }

    /// Reserve a connection slot for `endpoint`
    ///
    /// Reuses an idle connection when one is available; otherwise the
    /// connection is opened on the first send.
    pub async fn acquire(&self, endpoint: &Endpoint) -> Result<PoolGuard, TransportError> {
        let host = self.host(endpoint);
        let exhausted = || {
            TransportError::pool_exhausted(
                endpoint.select_url(),
                format!("all {} connections to {} are in use", self.config.max_size, host.key),
            )
        };

        let permit = match (self.config.acquire_mode, self.config.acquire_timeout) {
            (AcquireMode::FailFast, _) => host
                .semaphore
                .clone()
                .try_acquire_owned()
                .map_err(|_| exhausted())?,
            (AcquireMode::Block, Some(limit)) => {
                tokio::time::timeout(limit, host.semaphore.clone().acquire_owned())
                    .await
                    .map_err(|_| exhausted())?
                    .map_err(|_| exhausted())?
            }
            (AcquireMode::Block, None) => host
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| exhausted())?,
        };

        let connection = host.take_idle(self.config.idle_timeout);
        Ok(PoolGuard {
            host,
            endpoint: endpoint.clone(),
            connection,
            _permit: permit,
        })
    }

    /// Return a slot to the pool
    pub fn release(&self, guard: PoolGuard) {
        drop(guard);
    }

    /// Send `request` over the guarded connection, retrying transport failures
    pub async fn send(
        &self,
        guard: &mut PoolGuard,
        request: &TransportRequest,
    ) -> Result<RawResponse, TransportError> {
        let idempotent = request.method.is_idempotent();
        let policy = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.send_once(guard, request).await {
                Ok(response) => return Ok(response),
                Err(mut err) => {
                    err.attempts = attempt;
                    let retry = attempt <= policy.max_retries && err.kind.is_retryable(idempotent);
                    if !retry {
                        return Err(err);
                    }

                    let delay = policy.backoff(attempt);
                    warn!(
                        "Attempt {} to {} failed ({}), retrying in {:?}",
                        attempt, request.url, err.kind, delay
                    );
                    guard.host.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_once(
        &self,
        guard: &mut PoolGuard,
        request: &TransportRequest,
    ) -> Result<RawResponse, TransportError> {
        let mut connection = match guard.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = self.transport.connect(&guard.endpoint).await?;
                guard.host.opened.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Opened connection {} to {} via {}",
                    connection.id(),
                    guard.host.key,
                    self.transport.name()
                );
                connection
            }
        };

        // If this future is dropped while sending, the connection goes with it.
        let mut in_flight = InFlight {
            host: Arc::clone(&guard.host),
            armed: true,
        };
        let result = connection.send(request).await;
        in_flight.armed = false;

        match result {
            Ok(response) => {
                guard.connection = Some(connection);
                Ok(response)
            }
            Err(err) => {
                debug!("Evicting connection {} after {}", connection.id(), err.kind);
                guard.host.evicted.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Current statistics for the host serving `endpoint`
    pub fn stats(&self, endpoint: &Endpoint) -> PoolStats {
        let host = self.host(endpoint);
        let idle = host.idle().len();
        PoolStats {
            key: host.key.clone(),
            max_size: self.config.max_size,
            in_use: self.config.max_size - host.semaphore.available_permits(),
            idle,
            opened: host.opened.load(Ordering::Relaxed),
            evicted: host.evicted.load(Ordering::Relaxed),
            retries: host.retries.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive use of one pooled connection slot
pub struct PoolGuard {
    host: Arc<HostPool>,
    endpoint: Endpoint,
    connection: Option<Box<dyn Connection>>,
    _permit: OwnedSemaphorePermit,
}

impl PoolGuard {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Id of the held connection, if one is open
    pub fn connection_id(&self) -> Option<u64> {
        self.connection.as_ref().map(|c| c.id())
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.host.put_idle(connection);
        }
        // The permit is released after the connection is back in the idle queue.
    }
}

/// Armed while a request is on the wire
struct InFlight {
    host: Arc<HostPool>,
    armed: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.armed {
            warn!("Connection to {} abandoned mid-request, evicting", self.host.key);
            self.host.evicted.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::{MockReply, MockTransport};
    use crate::network::TransportErrorKind;
    use futures::future::join_all;

    fn endpoint() -> Endpoint {
        Endpoint::new("http://solr.test:8983/solr", "places").unwrap()
    }

    fn pool(mock: &MockTransport, config: PoolConfig) -> ConnectionPool {
        ConnectionPool::new(mock.clone().into_transport(), config)
    }

    fn request() -> TransportRequest {
        TransportRequest::get(endpoint().select_url()).param("q", "berlin")
    }

    #[tokio::test]
    async fn test_reuses_released_connection() {
        let mock = MockTransport::always(200, "{}");
        let pool = pool(&mock, PoolConfig::default());

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        assert!(guard.connection_id().is_none());
        pool.send(&mut guard, &request()).await.unwrap();
        let first = guard.connection_id();
        pool.release(guard);

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        assert_eq!(guard.connection_id(), first);
        pool.send(&mut guard, &request()).await.unwrap();
        drop(guard);

        assert_eq!(mock.connects(), 1);
        let stats = pool.stats(&endpoint());
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.opened, 1);
    }

    #[tokio::test]
    async fn test_retries_idempotent_transport_failures() {
        let mock = MockTransport::new();
        mock.push(MockReply::Fail(TransportErrorKind::Reset))
            .push(MockReply::Fail(TransportErrorKind::Timeout))
            .push(MockReply::json(200, "{}"));
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::immediate(3)));

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        let response = pool.send(&mut guard, &request()).await.unwrap();
        assert_eq!(response.status, 200);
        drop(guard);

        assert_eq!(mock.sends(), 3);
        // each failure evicts its connection
        assert_eq!(mock.connects(), 3);
        let stats = pool.stats(&endpoint());
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.retries, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mock = MockTransport::new();
        for _ in 0..10 {
            mock.push(MockReply::Fail(TransportErrorKind::Timeout));
        }
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::immediate(3)));

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        let err = pool.send(&mut guard, &request()).await.unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::Timeout);
        assert_eq!(err.attempts, 4);
        assert_eq!(mock.sends(), 4);
    }

    #[tokio::test]
    async fn test_connect_failures_are_retried() {
        let mock = MockTransport::always(200, "{}");
        mock.fail_next_connect(TransportErrorKind::Connect)
            .fail_next_connect(TransportErrorKind::Connect);
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::immediate(3)));

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        assert!(pool.send(&mut guard, &request()).await.is_ok());
        assert_eq!(mock.sends(), 1);
    }

    #[tokio::test]
    async fn test_body_errors_are_not_retried() {
        let mock = MockTransport::new();
        mock.push(MockReply::Fail(TransportErrorKind::Body))
            .push(MockReply::json(200, "{}"));
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::immediate(3)));

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        let err = pool.send(&mut guard, &request()).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Body);
        assert_eq!(err.attempts, 1);
        assert_eq!(mock.sends(), 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_not_retried_after_send() {
        let mock = MockTransport::new();
        mock.push(MockReply::Fail(TransportErrorKind::Reset))
            .push(MockReply::json(200, "{}"));
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::immediate(3)));

        let post = TransportRequest::post("http://solr.test:8983/solr/places/update", b"[]".to_vec());
        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        let err = pool.send(&mut guard, &post).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Reset);
        assert_eq!(mock.sends(), 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_retried_on_connect_failure() {
        let mock = MockTransport::always(200, "{}");
        mock.fail_next_connect(TransportErrorKind::Connect);
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::immediate(3)));

        let post = TransportRequest::post("http://solr.test:8983/solr/places/update", b"[]".to_vec());
        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        assert!(pool.send(&mut guard, &post).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_fast_when_exhausted() {
        let mock = MockTransport::always(200, "{}");
        let config = PoolConfig::default()
            .with_max_size(1)
            .with_acquire_mode(AcquireMode::FailFast);
        let pool = pool(&mock, config);

        let held = pool.acquire(&endpoint()).await.unwrap();
        let err = pool.acquire(&endpoint()).await.err().unwrap();
        assert_eq!(err.kind, TransportErrorKind::PoolExhausted);

        drop(held);
        assert!(pool.acquire(&endpoint()).await.is_ok());
    }

    #[tokio::test]
    async fn test_blocking_acquire_times_out() {
        let mock = MockTransport::always(200, "{}");
        let config = PoolConfig {
            max_size: 1,
            acquire_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let pool = pool(&mock, config);

        let _held = pool.acquire(&endpoint()).await.unwrap();
        let err = pool.acquire(&endpoint()).await.err().unwrap();
        assert_eq!(err.kind, TransportErrorKind::PoolExhausted);
    }

    #[tokio::test]
    async fn test_hosts_have_separate_bounds() {
        let mock = MockTransport::always(200, "{}");
        let config = PoolConfig::default()
            .with_max_size(1)
            .with_acquire_mode(AcquireMode::FailFast);
        let pool = pool(&mock, config);

        let other = Endpoint::new("https://solr.test/solr", "places").unwrap();
        let _a = pool.acquire(&endpoint()).await.unwrap();
        assert!(pool.acquire(&other).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_send_evicts_connection() {
        let mock = MockTransport::always(200, "{}").with_delay(Duration::from_secs(5));
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::none()));

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        let result =
            tokio::time::timeout(Duration::from_millis(20), pool.send(&mut guard, &request()))
                .await;
        assert!(result.is_err());
        drop(guard);

        let stats = pool.stats(&endpoint());
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.evicted, 1);
    }

    #[tokio::test]
    async fn test_abandoned_send_counts_even_if_guard_is_reused() {
        let mock = MockTransport::always(200, "{}").with_delay(Duration::from_secs(5));
        let pool = pool(&mock, PoolConfig::default().with_retry(RetryPolicy::none()));

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        let result =
            tokio::time::timeout(Duration::from_millis(20), pool.send(&mut guard, &request()))
                .await;
        assert!(result.is_err());
        assert_eq!(pool.stats(&endpoint()).evicted, 1);

        mock.set_delay(None);
        let response = pool.send(&mut guard, &request()).await.unwrap();
        assert_eq!(response.status, 200);
        drop(guard);

        let stats = pool.stats(&endpoint());
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn test_expired_idle_connections_are_closed() {
        let mock = MockTransport::always(200, "{}");
        let config = PoolConfig {
            idle_timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        let pool = pool(&mock, config);

        let mut guard = pool.acquire(&endpoint()).await.unwrap();
        pool.send(&mut guard, &request()).await.unwrap();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let guard = pool.acquire(&endpoint()).await.unwrap();
        assert!(guard.connection_id().is_none());
        drop(guard);
        assert_eq!(pool.stats(&endpoint()).evicted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounded_concurrency() {
        let mock = MockTransport::always(200, "{}").with_delay(Duration::from_millis(10));
        let pool = Arc::new(pool(&mock, PoolConfig::default().with_max_size(3)));

        let tasks = (0..20).map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut guard = pool.acquire(&endpoint()).await?;
                pool.send(&mut guard, &request()).await
            })
        });

        for result in join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap().status, 200);
        }

        assert!(mock.max_active() <= 3);
        assert!(mock.connects() <= 3);
        assert!(!mock.saw_double_use());
        assert_eq!(pool.stats(&endpoint()).in_use, 0);
    }

    #[test]
    #[should_panic(expected = "max_size")]
    fn test_zero_size_pool_panics() {
        let mock = MockTransport::new();
        let _ = pool(&mock, PoolConfig::default().with_max_size(0));
    }
}
