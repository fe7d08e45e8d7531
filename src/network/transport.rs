//! Transport traits and wire-level types
//!
//! Everything below the HTTP semantic layer (sockets, TLS, redirects) lives
//! behind [`Transport`] and [`Connection`]. The pool only ever talks to
//! these traits, so tests can script a transport without a server.

use crate::search::{Credential, Endpoint};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Whether repeating the request is harmless
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A single request handed to a [`Connection`]
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL without query string
    pub url: String,
    /// Query parameters
    pub params: BTreeMap<String, String>,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// Credentials to attach
    pub auth: Option<Credential>,
    /// Raw request body
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            params: BTreeMap::new(),
            headers: HashMap::new(),
            auth: None,
            body: None,
        }
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            params: BTreeMap::new(),
            headers: HashMap::new(),
            auth: None,
            body: Some(body),
        }
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Attach credentials
    pub fn auth(mut self, credential: Option<Credential>) -> Self {
        self.auth = credential;
        self
    }
}

/// Status, headers and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Final request URL, including the query string
    pub url: String,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body bytes
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Category of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// DNS failure, refused or unreachable; nothing was sent
    Connect,
    /// No response arrived in time
    Timeout,
    /// Connection dropped before any response bytes arrived
    Reset,
    /// Failure while reading a response that had already started
    Body,
    /// No pooled connection could be obtained
    PoolExhausted,
    /// Anything else (invalid request, builder errors)
    Other,
}

impl TransportErrorKind {
    /// Whether a failed attempt may be repeated.
    ///
    /// Non-idempotent requests are only repeated when the connection never
    /// came up. Once response bytes were observed nothing is repeated.
    pub fn is_retryable(&self, idempotent: bool) -> bool {
        match self {
            Self::Connect => true,
            Self::Timeout | Self::Reset => idempotent,
            Self::Body | Self::PoolExhausted | Self::Other => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Reset => "reset",
            Self::Body => "body",
            Self::PoolExhausted => "pool_exhausted",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Connect => "connection failed",
            Self::Timeout => "request timed out",
            Self::Reset => "connection reset",
            Self::Body => "failed reading response",
            Self::PoolExhausted => "connection pool exhausted",
            Self::Other => "transport error",
        };
        f.write_str(text)
    }
}

/// Failure below the HTTP semantic layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} calling {url} (attempts: {attempts}): {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub url: String,
    /// Underlying cause of the last attempt
    pub message: String,
    /// Number of attempts made before giving up
    pub attempts: u32,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn timeout(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, url, message)
    }

    pub fn pool_exhausted(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::PoolExhausted, url, message)
    }
}

/// Opens connections to a Solr endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name, used in logs
    fn name(&self) -> &str;

    /// Establish a new connection usable for `endpoint`
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;
}

/// A reusable connection owned by the pool between requests
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identifier unique within the transport
    fn id(&self) -> u64;

    /// Send one request and wait for the complete response
    async fn send(&mut self, request: &TransportRequest) -> Result<RawResponse, TransportError>;
}
