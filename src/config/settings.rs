//! Settings structures for solr-gateway configuration

use crate::pool::AcquireMode;
use crate::search::Credential;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure, loaded from `settings.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub solr: SolrSettings,
    pub pool: PoolSettings,
    pub retry: RetrySettings,
    pub outgoing: OutgoingSettings,
    pub auth: AuthSettings,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Merge with environment variables (SOLR_GATEWAY_* prefix)
    pub fn merge_env(&mut self) {
        self.merge_vars(|name| std::env::var(name).ok());
    }

    fn merge_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("SOLR_GATEWAY_URL") {
            self.solr.url = val;
        }
        if let Some(val) = var("SOLR_GATEWAY_COLLECTION") {
            self.solr.default_collection = Some(val);
        }
        if let Some(val) = var("SOLR_GATEWAY_POOL_MAX_SIZE") {
            if let Ok(size) = val.parse() {
                self.pool.max_size = size;
            }
        }
        if let Some(val) = var("SOLR_GATEWAY_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.retry.max_retries = retries;
            }
        }
        if let Some(val) = var("SOLR_GATEWAY_REQUEST_TIMEOUT") {
            if let Ok(timeout) = val.parse() {
                self.outgoing.request_timeout = timeout;
            }
        }
        if let Some(val) = var("SOLR_GATEWAY_USERNAME") {
            self.auth.username = Some(val);
        }
        if let Some(val) = var("SOLR_GATEWAY_PASSWORD") {
            self.auth.password = Some(val);
        }
        if let Some(val) = var("SOLR_GATEWAY_TOKEN") {
            self.auth.token = Some(val);
        }
    }

    /// Reject settings the client cannot work with
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = url::Url::parse(&self.solr.url) {
            bail!("solr.url {:?} is not a valid URL: {}", self.solr.url, e);
        }
        if self.pool.max_size == 0 {
            bail!("pool.max_size must be greater than zero");
        }
        let timeouts = [
            ("pool.acquire_timeout_secs", self.pool.acquire_timeout_secs),
            ("pool.idle_timeout_secs", self.pool.idle_timeout_secs),
            ("outgoing.request_timeout", Some(self.outgoing.request_timeout)),
            ("outgoing.connect_timeout", Some(self.outgoing.connect_timeout)),
        ];
        for (name, secs) in timeouts {
            if let Some(secs) = secs {
                if !is_valid_timeout(secs) {
                    bail!("{} must be a positive, finite number of seconds (got {})", name, secs);
                }
            }
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            bail!("retry.initial_backoff_ms must not exceed retry.max_backoff_ms");
        }
        if self.auth.password.is_some() && self.auth.username.is_none() {
            bail!("auth.password is set without auth.username");
        }
        Ok(())
    }
}

/// Converts to a `Duration` without panicking
fn is_valid_timeout(secs: f64) -> bool {
    secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

/// Solr server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolrSettings {
    /// Base URL, e.g. `http://localhost:8983/solr`
    pub url: String,
    /// Collection used when none is given
    pub default_collection: Option<String>,
}

impl Default for SolrSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8983/solr".to_string(),
            default_collection: None,
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum connections per scheme/host/port
    pub max_size: usize,
    /// `block` or `fail_fast`
    pub acquire_mode: AcquireMode,
    /// Maximum wait for a connection in blocking mode
    pub acquire_timeout_secs: Option<f64>,
    /// Close idle connections after this many seconds
    pub idle_timeout_secs: Option<f64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: crate::DEFAULT_POOL_SIZE,
            acquire_mode: AcquireMode::Block,
            acquire_timeout_secs: Some(30.0),
            idle_timeout_secs: Some(90.0),
        }
    }
}

/// Retry settings for transport failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: crate::DEFAULT_MAX_RETRIES,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
            jitter: true,
        }
    }
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Request timeout in seconds
    pub request_timeout: f64,
    /// Connect timeout in seconds
    pub connect_timeout: f64,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Custom user agent
    pub user_agent: Option<String>,
    /// Proxy settings
    pub proxies: ProxySettings,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 10.0,
            connect_timeout: 3.0,
            verify_ssl: true,
            user_agent: None,
            proxies: ProxySettings::default(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Default credentials attached to every query
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl AuthSettings {
    /// Token wins over basic credentials
    pub fn credential(&self) -> Option<Credential> {
        if let Some(ref token) = self.token {
            return Some(Credential::bearer(token.clone()));
        }
        self.username.as_ref().map(|username| {
            Credential::basic(username.clone(), self.password.clone().unwrap_or_default())
        })
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}
