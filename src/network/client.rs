//! HTTP transport on top of reqwest

use super::transport::{
    Connection, HttpMethod, RawResponse, Transport, TransportError, TransportErrorKind,
    TransportRequest,
};
use crate::config::OutgoingSettings;
use crate::search::{Credential, Endpoint};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Transport that sends requests with a shared reqwest client
///
/// Sockets are kept alive by reqwest itself; each [`HttpConnection`] is a
/// lease on that keep-alive pool, so the idle socket count per host is
/// bounded by the same `max_size` the gateway pool uses.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    user_agent: String,
    next_id: Arc<AtomicU64>,
}

impl HttpTransport {
    /// Create a new HTTP transport with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(&OutgoingSettings::default(), crate::DEFAULT_POOL_SIZE)
    }

    /// Create a new HTTP transport with custom settings
    pub fn with_settings(settings: &OutgoingSettings, pool_max_size: usize) -> Result<Self> {
        let user_agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(default_user_agent);

        let mut builder = Client::builder()
            .timeout(Duration::from_secs_f64(settings.request_timeout))
            .connect_timeout(Duration::from_secs_f64(settings.connect_timeout))
            .pool_max_idle_per_host(pool_max_size)
            .user_agent(user_agent.clone())
            .gzip(true)
            .brotli(true);

        // SSL verification
        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy settings
        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            user_agent,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Get current user agent
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Opening connection {} to {}", id, endpoint.pool_key());

        Ok(Box::new(HttpConnection {
            id,
            client: self.client.clone(),
        }))
    }
}

/// A pooled lease on the shared reqwest client
pub struct HttpConnection {
    id: u64,
    client: Client,
}

#[async_trait]
impl Connection for HttpConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn send(&mut self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        req_builder = req_builder.header("Accept", "application/json");

        // Add custom headers
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        // Add query parameters
        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        req_builder = match request.auth {
            Some(Credential::Basic {
                ref username,
                ref password,
            }) => req_builder.basic_auth(username, Some(password)),
            Some(Credential::Bearer(ref token)) => req_builder.bearer_auth(token),
            None => req_builder,
        };

        if let Some(ref body) = request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string(), v.to_string());
            }
        }

        // Response bytes have been observed from here on
        let body = response.bytes().await.map_err(|e| {
            TransportError::new(TransportErrorKind::Body, url.clone(), e.to_string())
        })?;

        Ok(RawResponse {
            status,
            url,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Map a reqwest failure onto the retry-relevant categories
fn map_reqwest_error(url: &str, error: reqwest::Error) -> TransportError {
    let kind = if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_request() {
        // hyper reports a peer hang-up before the response head as a request error
        TransportErrorKind::Reset
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, url, error.to_string())
}

fn default_user_agent() -> String {
    format!("solr-gateway/{}", crate::VERSION)
}
