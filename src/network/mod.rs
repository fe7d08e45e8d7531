//! HTTP networking module
//!
//! Provides the transport boundary used by the connection pool and the
//! reqwest-backed implementation of it.

mod client;
#[cfg(test)]
pub(crate) mod mock;
mod transport;

pub use client::{HttpConnection, HttpTransport};
pub use transport::{
    Connection, HttpMethod, RawResponse, Transport, TransportError, TransportErrorKind,
    TransportRequest,
};
