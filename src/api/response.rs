use crate::error::{ChatError, Result};
use serde_json::{json, Value};
use uuid::Uuid;

fn first_message(response_json: &Value) -> Result<&Value> {
    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ChatError::Other("No choices in response".to_string()))?;

    let first_choice = choices
        .first()
        .ok_or_else(|| ChatError::Other("Empty choices array".to_string()))?;

    first_choice
        .get("message")
        .ok_or_else(|| ChatError::Other("No message in response".to_string()))
}

/// Tool calls requested by the first choice, if any.
///
/// The legacy single `function_call` field is normalised into the `tool_calls`
/// shape with a generated id so the caller only deals with one format.
pub fn parse_tool_calls(response_json: &Value) -> Result<Option<Vec<Value>>> {
    let message = first_message(response_json)?;

    if let Some(tool_calls) = message.get("tool_calls").and_then(|tc| tc.as_array()) {
        if !tool_calls.is_empty() {
            return Ok(Some(tool_calls.clone()));
        }
    }

    if let Some(function_call) = message.get("function_call").filter(|f| f.is_object()) {
        return Ok(Some(vec![json!({
            "id": format!("call_{}", Uuid::new_v4().simple()),
            "type": "function",
            "function": function_call,
        })]));
    }

    Ok(None)
}

pub fn extract_content(response_json: &Value) -> Result<Option<String>> {
    let message = first_message(response_json)?;
    Ok(message
        .get("content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string()))
}

/// Azure reports content-filter hits as `finish_reason: "content_filter"`.
pub fn finish_reason(response_json: &Value) -> Option<String> {
    response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("finish_reason"))
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
}
