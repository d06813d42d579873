//! Raw answer extraction from the analysis tool's output.
//!
//! The tool is asked for JSON, but older versions and error paths print plain
//! text. Parse failures are not errors; we recover whatever text is there.

use serde_json::Value;

/// Substituted when a JSON payload carries no usable text.
pub const NO_RESPONSE: &str = "No response";

/// Substituted when the tool printed nothing at all.
pub const EMPTY_RESPONSE: &str = "Empty response";

/// Turn the stdout/stderr of a successful run into raw answer text.
pub fn extract_response(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();

    match serde_json::from_str::<Value>(stdout) {
        Ok(payload) => {
            let text = text_from_payload(&payload);
            if text.trim().is_empty() {
                NO_RESPONSE.to_string()
            } else {
                text
            }
        }
        Err(e) => {
            tracing::debug!("Analysis output is not JSON ({e}), using plain text");
            if !stdout.is_empty() {
                stdout.to_string()
            } else if !stderr.trim().is_empty() {
                stderr.trim().to_string()
            } else {
                EMPTY_RESPONSE.to_string()
            }
        }
    }
}

/// Pick the primary text field of a structured payload.
///
/// Order: `result` (only when `type == "result"`), `response`, `content`,
/// `text`, then the whole payload pretty-printed. A structured field value
/// is pretty-printed on its own.
fn text_from_payload(payload: &Value) -> String {
    let Some(object) = payload.as_object() else {
        return match payload {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => pretty(other),
        };
    };

    // Non-string values of a chosen field are shown rather than skipped.
    let field = |key: &str| match object.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(pretty(other)),
    };

    if object.get("type").and_then(Value::as_str) == Some("result") {
        return field("result").unwrap_or_default();
    }

    field("response")
        .or_else(|| field("content"))
        .or_else(|| field("text"))
        .unwrap_or_else(|| pretty(payload))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
