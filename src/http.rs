//! Request plumbing shared by submission, polling and download.

use reqwest::{RequestBuilder, Response};
use serde_json::Value;

use crate::error::{FluxError, Result};
use crate::types::ApiKey;

pub(crate) fn normalize(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

pub(crate) fn authorized(request: RequestBuilder, key: &ApiKey) -> RequestBuilder {
    request
        .header("accept", "application/json")
        .header("x-key", key.expose())
}

pub(crate) async fn send(request: RequestBuilder, context: impl Into<String>) -> Result<Response> {
    request.send().await.map_err(|e| FluxError::Network {
        context: context.into(),
        source: e,
    })
}

/// Read a success body as JSON. A body that fails to arrive is a network
/// error; one that arrives but is not JSON is an invalid response.
pub(crate) async fn json_body(resp: Response, what: &str) -> Result<Value> {
    let text = resp.text().await.map_err(|e| FluxError::Network {
        context: format!("Failed to read FLUX {} response", what),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| {
        FluxError::InvalidResponse(format!("Malformed FLUX {} response: {}", what, e))
    })
}

/// Drain a non-success response into `(status, best-effort message)`.
pub(crate) async fn failure(resp: Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    (status, failure_message(status, &text))
}

/// Best-effort error text from an error body. Structured bodies yield their
/// `detail`, `error` or `message` field; anything else gets a generic message.
pub(crate) fn failure_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            ["detail", "error", "message"]
                .iter()
                .find_map(|key| json.get(*key).and_then(describe))
        })
        .unwrap_or_else(|| format!("request failed with HTTP {}", status))
}

/// Render an error field. Validation errors arrive as
/// `[{"loc": [...], "msg": "..."}]`, so arrays yield their first `msg`.
pub(crate) fn describe(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Array(items) => items
            .first()
            .and_then(|first| first.get("msg").and_then(describe).or_else(|| describe(first))),
        Value::Object(map) => map
            .get("msg")
            .or_else(|| map.get("message"))
            .and_then(describe)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}
