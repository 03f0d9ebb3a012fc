use serde_json::Value;

/// Render a tool result (or any JSON value) as message content. The chat API only
/// accepts strings, so structured results are sent JSON-encoded.
pub fn ensure_string_content(value: &Value) -> String {
    match value {
        Value::Null => "[No content]".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
