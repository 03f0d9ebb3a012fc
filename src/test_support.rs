//! Shared fixtures for unit tests.

use crate::api::{ChatBackend, RequestBody};
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays canned responses and records every request.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<RequestBody>>,
    pub streamed_answer: String,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            streamed_answer: "streamed answer".to_string(),
        }
    }

    pub fn requests(&self) -> Vec<RequestBody> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &RequestBody) -> Result<Value> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::Other("no scripted response left".to_string()))
    }

    async fn stream(
        &self,
        request: &RequestBody,
        on_delta: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        for word in self.streamed_answer.split_inclusive(' ') {
            on_delta(word);
        }
        Ok(self.streamed_answer.clone())
    }
}

pub fn answer(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]})
}

pub fn tool_calls(calls: Value) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": null, "tool_calls": calls}, "finish_reason": "tool_calls"}]})
}
