//! Search module
//!
//! The Solr query client and its request models.

mod executor;
mod models;

pub use executor::SearchClient;
pub use models::{Credential, Endpoint, QueryRequest};
