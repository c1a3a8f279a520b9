use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Pulls the JSON payload out of a model reply.
///
/// Looks for a ```json fenced block first, then any fenced block, and otherwise
/// takes the whole reply.
pub fn extract_json(reply: &str) -> &str {
    if let Some(start) = reply.find(JSON_FENCE) {
        return fenced_body(&reply[start + JSON_FENCE.len()..]);
    }

    if let Some(start) = reply.find(FENCE) {
        let body = fenced_body(&reply[start + FENCE.len()..]);
        return strip_language_tag(body);
    }

    reply.trim()
}

fn fenced_body(after_open: &str) -> &str {
    let end = after_open.find(FENCE).unwrap_or(after_open.len());
    after_open[..end].trim()
}

// ```JSON or ```javascript on the opening line
fn strip_language_tag(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first, rest))
            if !first.is_empty() && first.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            rest.trim()
        }
        _ => body,
    }
}

/// Parses a model reply into `T`, surfacing failures as [`AppError::Parse`]
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> AppResult<T> {
    serde_json::from_str(extract_json(reply)).map_err(|e| AppError::Parse(e.to_string()))
}
