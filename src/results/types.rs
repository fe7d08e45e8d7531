//! Parsed query response

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Deref;

/// The JSON document returned by a successful `select` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryResult(Value);

impl QueryResult {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    /// Take ownership of the underlying document
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// `response.numFound`, if present
    pub fn num_found(&self) -> Option<u64> {
        self.0.pointer("/response/numFound").and_then(Value::as_u64)
    }

    /// `response.docs`, or an empty slice
    pub fn docs(&self) -> &[Value] {
        self.0
            .pointer("/response/docs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Deref for QueryResult {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

impl PartialEq<Value> for QueryResult {
    fn eq(&self, other: &Value) -> bool {
        &self.0 == other
    }
}

impl From<QueryResult> for Value {
    fn from(result: QueryResult) -> Self {
        result.0
    }
}
