//! Interpretation of status responses.
//!
//! The API family does not promise one response schema, so a ready body is
//! searched by an ordered chain of small extractors, each handling one shape.

use serde_json::Value;

use crate::http::describe;
use crate::types::{ImageLocator, PollOutcome, ProgressUpdate};

/// A single response-shape extractor.
pub type Extractor = fn(&Value) -> Option<ImageLocator>;

/// Extractors in priority order.
pub const EXTRACTORS: &[Extractor] = &[
    result_sample,
    first_output_url,
    top_level_url,
    result_object_keys,
    first_result_url,
];

/// Keys scanned inside a nested `result` object.
const RESULT_KEYS: &[&str] = &["url", "image_url", "imageUrl", "sample", "image"];

/// Statuses that always end a job as failed.
const FAILURE_STATUSES: &[&str] = &["error", "failed"];

fn locator(value: Option<&Value>) -> Option<ImageLocator> {
    value.and_then(Value::as_str).and_then(ImageLocator::from_raw)
}

/// `{"result": {"sample": "..."}}`
pub fn result_sample(body: &Value) -> Option<ImageLocator> {
    locator(body.pointer("/result/sample"))
}

/// `{"outputs": [{"url": "..."}]}`
pub fn first_output_url(body: &Value) -> Option<ImageLocator> {
    locator(body.pointer("/outputs/0/url"))
}

/// `{"url": "..."}`
pub fn top_level_url(body: &Value) -> Option<ImageLocator> {
    locator(body.get("url"))
}

/// `{"result": {"image_url": "..."}}` and friends.
pub fn result_object_keys(body: &Value) -> Option<ImageLocator> {
    let result = body.get("result")?.as_object()?;
    RESULT_KEYS.iter().find_map(|key| locator(result.get(*key)))
}

/// `{"result": [{"url": "..."}]}`
pub fn first_result_url(body: &Value) -> Option<ImageLocator> {
    locator(body.pointer("/result/0/url"))
}

/// Run the extractor chain over a ready body.
pub fn extract_locator(body: &Value) -> Option<ImageLocator> {
    EXTRACTORS.iter().find_map(|extract| extract(body))
}

/// Classify one status response.
///
/// Unrecognized status values are treated as pending so new intermediate
/// states added by the API do not break polling.
pub fn interpret(body: &Value) -> PollOutcome {
    interpret_with(body, &[])
}

/// Like [`interpret`], additionally failing on any of `extra_failures`
/// (compared case-insensitively), e.g. `"Content Moderated"`.
pub fn interpret_with(body: &Value, extra_failures: &[String]) -> PollOutcome {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    let lowered = status.to_ascii_lowercase();
    let is_failure = FAILURE_STATUSES.contains(&lowered.as_str())
        || extra_failures
            .iter()
            .any(|s| !status.is_empty() && s.trim().eq_ignore_ascii_case(status));

    match lowered.as_str() {
        "ready" | "succeeded" => match extract_locator(body) {
            Some(found) => PollOutcome::Ready(found),
            None => PollOutcome::Unlocatable,
        },
        _ if is_failure => PollOutcome::Failed(failure_reason(body, status)),
        _ => PollOutcome::Pending(ProgressUpdate {
            status: if status.is_empty() {
                "Pending".to_string()
            } else {
                status.to_string()
            },
            percent: progress_percent(body),
        }),
    }
}

fn failure_reason(body: &Value, status: &str) -> String {
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| body.get(*key).and_then(describe))
        .unwrap_or_else(|| match status.to_ascii_lowercase().as_str() {
            "error" | "failed" => "unknown error".to_string(),
            _ => status.to_string(),
        })
}

/// Progress as a percentage. Non-integer values up to 1.0 (`0.4`, `"0.4"`)
/// are read as fractions; integers and `%` strings are already percentages.
fn progress_percent(body: &Value) -> Option<f32> {
    let (raw, fractional) = match body.get("progress")? {
        Value::Number(n) => (n.as_f64()?, n.is_f64()),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => (pct.trim().parse().ok()?, false),
                None => (s.parse().ok()?, s.contains('.')),
            }
        }
        _ => return None,
    };
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let percent = if fractional && raw <= 1.0 { raw * 100.0 } else { raw };
    Some(percent.min(100.0) as f32)
}

/// A relocated polling URL, if the body names one.
pub fn next_polling_url(body: &Value) -> Option<&str> {
    body.get("polling_url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
