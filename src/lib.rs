//! solr-gateway: a resilient client layer for Solr search servers
//!
//! Sends queries to the `select` handler of a Solr collection through a
//! bounded connection pool, retries transport failures, and turns every
//! failure into a typed [`ClientError`].
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use solr_gateway::{query::sanitize, Settings, SearchClient};
//! use std::collections::HashMap;
//!
//! let client = SearchClient::from_settings(&Settings::default())?;
//! let q = sanitize("Berlin-Mitte (Rosenthaler Str.)");
//! let result = client.query("places", &q, None, &HashMap::new()).await?;
//! println!("{:?} hits", result.num_found());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod network;
pub mod pool;
pub mod query;
pub mod results;
pub mod search;

pub use config::Settings;
pub use pool::{ConnectionPool, PoolConfig};
pub use results::{ClientError, QueryResult};
pub use search::{Credential, Endpoint, QueryRequest, SearchClient};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of connections per host
pub const DEFAULT_POOL_SIZE: usize = 100;

/// Default number of retries after a transport failure
pub const DEFAULT_MAX_RETRIES: u32 = 3;
