use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Message;

#[derive(Debug, Clone, Serialize)]
pub struct RequestBody {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl RequestBody {
    /// `tool_choice` is only valid alongside a non-empty tool list.
    pub fn new(model: impl Into<String>, messages: Vec<Message>, tools: Option<Vec<Value>>) -> Self {
        let tools = tools.filter(|t| !t.is_empty());
        Self {
            model: model.into(),
            messages,
            stream: false,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
        }
    }

    pub fn has_tools(&self) -> bool {
        self.tools.is_some()
    }
}

#[derive(Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct Choice {
    pub delta: Option<Delta>,
}

#[derive(Deserialize)]
pub struct StreamResponse {
    pub choices: Option<Vec<Choice>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_tools_omits_tool_fields() {
        let body = RequestBody::new("gpt-4", vec![Message::user("hi")], None);
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
        assert_eq!(value["messages"][0], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_empty_tool_list_is_dropped() {
        let body = RequestBody::new("gpt-4", vec![], Some(vec![]));
        assert!(!body.has_tools());
        assert!(body.tool_choice.is_none());
    }

    #[test]
    fn test_tools_set_auto_choice() {
        let tools = vec![json!({"type": "function", "function": {"name": "add"}})];
        let body = RequestBody::new("gpt-4", vec![], Some(tools));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"][0]["function"]["name"], "add");
    }
}
