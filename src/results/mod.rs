//! Query results and error classification

mod classify;
mod error;
mod types;

pub use classify::classify;
pub use error::{ClientError, Result};
pub use types::QueryResult;
