//! Query execution against a Solr server

use super::models::{Credential, Endpoint, QueryRequest};
use crate::config::Settings;
use crate::metrics::Metrics;
use crate::network::{HttpTransport, RawResponse, TransportError, TransportRequest};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::results::{classify, ClientError, QueryResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Client for the `select` handler of a Solr server
///
/// Cloning is cheap; clones share the connection pool and metrics.
#[derive(Clone)]
pub struct SearchClient {
    /// Base URL, e.g. `http://localhost:8983/solr`
    base_url: Url,
    /// Pooled connections to the server
    pool: Arc<ConnectionPool>,
    /// Query metrics
    metrics: Arc<Metrics>,
    /// Credentials used when a request carries none
    default_auth: Option<Credential>,
    /// Limit for a whole query, including retries
    timeout: Option<Duration>,
}

impl SearchClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: &str, pool: Arc<ConnectionPool>) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            pool,
            metrics: Arc::new(Metrics::new()),
            default_auth: None,
            timeout: None,
        })
    }

    /// Create a client with an HTTP transport configured from settings
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        settings.validate()?;

        let transport = HttpTransport::with_settings(&settings.outgoing, settings.pool.max_size)?;
        let pool = ConnectionPool::new(Arc::new(transport), PoolConfig::from_settings(settings));
        let mut client = Self::new(&settings.solr.url, Arc::new(pool))?;
        client.default_auth = settings.auth.credential();

        info!(
            "Solr client for {} (pool size {}, {} retries)",
            settings.solr.url, settings.pool.max_size, settings.retry.max_retries
        );
        Ok(client)
    }

    /// Share an existing metrics collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Credentials for requests that carry none
    pub fn with_default_auth(mut self, credential: Credential) -> Self {
        self.default_auth = Some(credential);
        self
    }

    /// Bound every query by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Endpoint for a collection on this server
    pub fn endpoint(&self, collection: &str) -> Endpoint {
        Endpoint::from_url(self.base_url.clone(), collection)
    }

    /// Send query `q` to `collection` and return the JSON response.
    ///
    /// `extra` is sent as additional GET parameters. A `q` entry in `extra`
    /// is ignored in favour of the `q` argument. `wt=json` is also sent
    /// unless `extra` sets `wt` itself, so Solr answers with JSON. The query
    /// text is sent as given; use [`crate::query::sanitize`] first for free
    /// user input.
    pub async fn query(
        &self,
        collection: &str,
        q: &str,
        auth: Option<&Credential>,
        extra: &HashMap<String, String>,
    ) -> Result<QueryResult, ClientError> {
        let request = QueryRequest {
            query: q.to_string(),
            collection: collection.to_string(),
            params: extra.clone(),
            auth: auth.cloned(),
        };
        self.execute(&request).await
    }

    /// Execute a prepared request
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, ClientError> {
        match self.timeout {
            Some(limit) => self.query_with_timeout(request, limit).await,
            None => self.run(request).await,
        }
    }

    /// Execute a request, giving up after `limit`
    ///
    /// On expiry the pooled connection in use is closed, not returned.
    pub async fn query_with_timeout(
        &self,
        request: &QueryRequest,
        limit: Duration,
    ) -> Result<QueryResult, ClientError> {
        match tokio::time::timeout(limit, self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                let url = self.endpoint(&request.collection).select_url();
                warn!("Query to {} timed out after {:?}", url, limit);
                let err = ClientError::from(TransportError::timeout(
                    url,
                    format!("query exceeded {:?}", limit),
                ));
                self.metrics.record_error(&request.collection, err.kind());
                Err(err)
            }
        }
    }

    async fn run(&self, request: &QueryRequest) -> Result<QueryResult, ClientError> {
        let start = Instant::now();
        let collection = request.collection.as_str();
        self.metrics.record_query(collection);

        let result = self.dispatch(request).await;

        match result {
            Ok(_) => {
                self.metrics.record_success(collection);
                self.metrics
                    .record_response_time(collection, start.elapsed().as_millis() as u64);
            }
            Err(ref e) => {
                debug!("Query to {} failed: {}", collection, e);
                self.metrics.record_error(collection, e.kind());
            }
        }

        result
    }

    async fn dispatch(&self, request: &QueryRequest) -> Result<QueryResult, ClientError> {
        let endpoint = self.endpoint(&request.collection);
        let transport_request = TransportRequest {
            params: build_params(&request.query, &request.params),
            auth: request.auth.clone().or_else(|| self.default_auth.clone()),
            ..TransportRequest::get(endpoint.select_url())
        };

        debug!("Querying {} with q={:?}", endpoint, request.query);

        let mut guard = self.pool.acquire(&endpoint).await?;
        let response = self.pool.send(&mut guard, &transport_request).await;
        self.pool.release(guard);

        handle_response(response?)
    }
}

/// Merge caller parameters with `q` and defaults
///
/// The `q` argument always wins over a `q` in `extra`.
fn build_params(q: &str, extra: &HashMap<String, String>) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = extra
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    params.entry("wt".to_string()).or_insert_with(|| "json".to_string());

    if let Some(previous) = params.insert("q".to_string(), q.to_string()) {
        if previous != q {
            warn!("Ignoring q={:?} from extra parameters, using q={:?}", previous, q);
        }
    }

    params
}

fn handle_response(response: RawResponse) -> Result<QueryResult, ClientError> {
    if !response.is_success() {
        return Err(classify(&response));
    }

    match serde_json::from_slice(&response.body) {
        Ok(document) => Ok(QueryResult::new(document)),
        Err(e) => Err(ClientError::ServerError {
            message: format!("error calling {}: invalid JSON response: {}", response.url, e),
            status_code: response.status,
            raw_body: response.body,
        }),
    }
}
