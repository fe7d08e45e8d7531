//! Typed errors returned from queries

use crate::network::{TransportError, TransportErrorKind};

/// Every way a query can fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The server answered 401
    #[error("unauthenticated request to {url}")]
    Unauthenticated { url: String },

    /// The server answered with a non-2xx status or with a body that is not JSON
    #[error("{message}")]
    ServerError {
        message: String,
        status_code: u16,
        raw_body: Vec<u8>,
    },

    /// The request never produced a complete response
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// HTTP status, if a response was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthenticated { .. } => Some(401),
            Self::ServerError { status_code, .. } => Some(*status_code),
            Self::Transport(_) => None,
        }
    }

    /// Whether the whole-call timeout or the transport timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.kind == TransportErrorKind::Timeout)
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::ServerError { .. } => "server_error",
            Self::Transport(e) => e.kind.as_str(),
        }
    }
}

/// Convenience alias for query results
pub type Result<T> = std::result::Result<T, ClientError>;
