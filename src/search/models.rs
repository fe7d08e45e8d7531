//! Query request and endpoint models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// A Solr collection reachable under a base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: Url,
    collection: String,
}

impl Endpoint {
    /// Create an endpoint from a base URL such as `http://localhost:8983/solr`
    pub fn new(base_url: &str, collection: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(Url::parse(base_url)?, collection))
    }

    /// Create an endpoint from an already parsed base URL
    pub fn from_url(base_url: Url, collection: impl Into<String>) -> Self {
        Self {
            base_url,
            collection: collection.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// `{base}/{collection}/select`, with the collection percent-encoded
    /// as a single path segment
    pub fn select_url(&self) -> String {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push(&self.collection).push("select");
            }
            // cannot-be-a-base URLs such as `data:` have no path segments
            Err(()) => {
                return format!(
                    "{}/{}/select",
                    self.base_url.as_str().trim_end_matches('/'),
                    self.collection
                )
            }
        }
        url.into()
    }

    /// Connections are shared between all endpoints with the same key
    pub fn pool_key(&self) -> String {
        format!(
            "{}://{}:{}",
            self.base_url.scheme(),
            self.base_url.host_str().unwrap_or_default(),
            self.base_url.port_or_known_default().unwrap_or_default()
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.select_url())
    }
}

/// Credentials sent with a query
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    /// HTTP basic authentication
    Basic { username: String, password: String },
    /// Bearer token
    Bearer(String),
}

impl Credential {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
        }
    }
}

/// A single query against one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query text, sent as `q`
    pub query: String,
    /// Target collection
    pub collection: String,
    /// Additional GET parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Credentials, if the collection is protected
    #[serde(default)]
    pub auth: Option<Credential>,
}

impl QueryRequest {
    /// Create a new request
    pub fn new(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            collection: collection.into(),
            params: HashMap::new(),
            auth: None,
        }
    }

    /// Add a GET parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add several GET parameters
    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.params.extend(params);
        self
    }

    /// Attach credentials
    pub fn auth(mut self, credential: Credential) -> Self {
        self.auth = Some(credential);
        self
    }
}
