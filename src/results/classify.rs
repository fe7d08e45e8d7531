//! Turn failed Solr responses into typed errors

use super::error::ClientError;
use crate::network::RawResponse;
use serde_json::Value;

/// Classify a non-successful response.
///
/// 401 is always [`ClientError::Unauthenticated`]. Anything else becomes a
/// [`ClientError::ServerError`] whose message names the request URL and,
/// when the body is a Solr error document, the message Solr reported.
/// Classification never fails, whatever the body contains.
pub fn classify(response: &RawResponse) -> ClientError {
    if response.status == 401 {
        return ClientError::Unauthenticated {
            url: response.url.clone(),
        };
    }

    let detail = error_detail(response).unwrap_or_else(|| response.text());

    ClientError::ServerError {
        message: format!("error calling {}: {}", response.url, detail),
        status_code: response.status,
        raw_body: response.body.clone(),
    }
}

/// Message extracted from a Solr error document, if the body is one
fn error_detail(response: &RawResponse) -> Option<String> {
    let doc: Value = response.json().ok()?;

    // {"error": {"msg": "...", "code": 400}}
    if let Some(error) = doc.get("error").and_then(Value::as_object) {
        return error.get("msg").and_then(Value::as_str).map(String::from);
    }

    // {"errors": [{"errorMessages": ["...", ...]}, ...]} from the schema and config APIs
    if let Some(errors) = doc.get("errors").and_then(Value::as_array) {
        let joined = errors
            .iter()
            .map(|e| {
                e.get("errorMessages")
                    .and_then(Value::as_array)
                    .map(|messages| {
                        messages
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(";")
                    })
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(";");
        return Some(joined);
    }

    None
}
