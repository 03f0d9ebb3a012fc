use crate::api::response::{extract_content, finish_reason, parse_tool_calls};
use crate::api::{ChatBackend, RequestBody};
use crate::attachments::Attachments;
use crate::config::{default_max_rounds, Config};
use crate::error::Result;
use crate::models::{ensure_string_content, Message, Session, ToolCall};
use crate::session::{ensure_system_message, trim_conversation_history};
use crate::tools::ToolRegistry;
use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Receives progress while a turn is being answered.
pub trait ChatObserver: Send {
    fn on_tool_call(&mut self, _name: &str, _arguments: &str) {}

    fn on_tool_result(&mut self, _name: &str, _result: &str, _is_error: bool) {}

    fn on_delta(&mut self, _text: &str) {}

    /// Whether the final answer should be streamed to this observer.
    fn wants_stream(&self) -> bool {
        false
    }
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl ChatObserver for SilentObserver {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
    /// What was sent back to the model.
    pub result: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_invocations: Vec<ToolInvocation>,
    /// The answer was already delivered through `on_delta`.
    pub streamed: bool,
}

/// How a session's history is prepared before each turn.
#[derive(Debug, Clone, Copy)]
pub struct HistorySettings<'a> {
    pub system_prompt: Option<&'a str>,
    /// User turns kept in the history.
    pub turns: usize,
}

impl<'a> HistorySettings<'a> {
    pub fn from_config(config: &'a Config) -> Self {
        Self {
            system_prompt: config.system_prompt.as_deref(),
            turns: config.history_turns,
        }
    }
}

/// Runs one user turn against the model, executing requested tools until the
/// model answers or the round limit is reached.
pub struct Orchestrator<'a> {
    backend: &'a dyn ChatBackend,
    registry: Option<&'a ToolRegistry>,
    model: String,
    max_rounds: usize,
    stream: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn ChatBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            registry: None,
            model: model.into(),
            max_rounds: default_max_rounds(),
            stream: false,
        }
    }

    /// Model, streaming and round limit from the configuration. Tools are
    /// offered only when a registry is given.
    pub fn from_config(
        backend: &'a dyn ChatBackend,
        registry: Option<&'a ToolRegistry>,
        config: &Config,
    ) -> Self {
        let orchestrator =
            Self::new(backend, config.api.model.clone()).with_streaming(config.api.stream);
        match registry {
            Some(registry) => orchestrator.with_tools(registry, config.tools.max_rounds),
            None => orchestrator,
        }
    }

    pub fn with_tools(mut self, registry: &'a ToolRegistry, max_rounds: usize) -> Self {
        self.registry = Some(registry);
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// `messages` holds the history including the new user message. Tool
    /// traffic and the final assistant message are appended to it.
    pub async fn run_turn(
        &self,
        messages: &mut Vec<Message>,
        attachments: Option<&Attachments>,
        observer: &mut dyn ChatObserver,
    ) -> Result<ChatOutcome> {
        let tools = self
            .registry
            .map(|registry| registry.format_tools_for_llm())
            .filter(|tools| !tools.is_empty());

        let mut invocations = Vec::new();
        let mut round = 0;

        loop {
            let offer_tools = tools.is_some() && round < self.max_rounds;
            let request_messages = match attachments {
                Some(attachments) => attachments.apply(messages),
                None => messages.clone(),
            };
            let request = RequestBody::new(
                self.model.clone(),
                request_messages,
                if offer_tools { tools.clone() } else { None },
            );

            debug!(
                "[AI] round {} (tools offered: {}, history: {} messages)",
                round,
                offer_tools,
                messages.len()
            );

            if !request.has_tools() && self.stream && observer.wants_stream() {
                let content = self
                    .backend
                    .stream(&request, &mut |delta: &str| observer.on_delta(delta))
                    .await?;
                messages.push(Message::assistant(content.clone()));
                return Ok(ChatOutcome {
                    content,
                    tool_invocations: invocations,
                    streamed: true,
                });
            }

            let response = self.backend.complete(&request).await?;

            if offer_tools {
                if let Some(calls) = parse_tool_calls(&response)? {
                    let content = extract_content(&response)?.filter(|c| !c.is_empty());
                    let calls = normalize_calls(&calls);

                    messages.push(Message::assistant_tool_calls(
                        content,
                        calls.iter().map(|c| c.call.clone()).collect(),
                    ));

                    for pending in calls {
                        let invocation = self.execute(pending, observer).await;
                        messages.push(Message::tool(&invocation.id, &invocation.result));
                        invocations.push(invocation);
                    }

                    round += 1;
                    continue;
                }
            }

            let content = match extract_content(&response)? {
                Some(content) => content,
                None if finish_reason(&response).as_deref() == Some("content_filter") => {
                    warn!("response was blocked by the content filter");
                    "[Response blocked by content filter]".to_string()
                }
                None => String::new(),
            };

            messages.push(Message::assistant(content.clone()));
            return Ok(ChatOutcome {
                content,
                tool_invocations: invocations,
                streamed: false,
            });
        }
    }

    /// Answer `prompt` within `session`. History is only updated when the
    /// turn succeeds.
    pub async fn run_session_turn(
        &self,
        session: &mut Session,
        prompt: &str,
        history: &HistorySettings<'_>,
        attachments: Option<&Attachments>,
        observer: &mut dyn ChatObserver,
    ) -> Result<ChatOutcome> {
        let mut messages = session.messages.clone();
        ensure_system_message(&mut messages, history.system_prompt);
        messages.push(Message::user(prompt));
        trim_conversation_history(&mut messages, history.turns);

        let outcome = self.run_turn(&mut messages, attachments, observer).await?;

        session.messages = messages;
        session.last_updated = Local::now();
        Ok(outcome)
    }

    async fn execute(&self, pending: PendingCall, observer: &mut dyn ChatObserver) -> ToolInvocation {
        let PendingCall { call, problem } = pending;
        let name = call.function.name.clone();
        let arguments = call.function.arguments.clone();

        observer.on_tool_call(&name, &arguments);

        let outcome = match problem {
            Some(problem) => Err(problem),
            None => self.dispatch(&name, &arguments).await,
        };

        let (result, is_error) = match outcome {
            Ok(result) => (result, false),
            Err(error) => (error, true),
        };

        debug!("[tools] {} -> {} (error: {})", name, result, is_error);
        observer.on_tool_result(&name, &result, is_error);

        ToolInvocation {
            id: call.id,
            name,
            arguments,
            result,
            is_error,
        }
    }

    async fn dispatch(&self, name: &str, raw_arguments: &str) -> std::result::Result<String, String> {
        let registry = self
            .registry
            .filter(|registry| registry.get(name).is_some())
            .ok_or_else(|| format!("Error: Tool '{}' not found", name))?;

        let arguments: Value = if raw_arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw_arguments).map_err(|e| {
                format!("Error: failed to parse arguments for tool '{}': {}", name, e)
            })?
        };

        registry
            .validate_arguments(name, &arguments)
            .map_err(|e| format!("Error: Invalid arguments for tool '{}': {}", name, e))?;

        registry
            .call(name, &arguments)
            .await
            .map(|value| ensure_string_content(&value))
            .map_err(|e| format!("Error: {}", e))
    }
}

struct PendingCall {
    call: ToolCall,
    /// Set when the call is malformed; reported back instead of running it.
    problem: Option<String>,
}

/// Turn raw tool-call JSON into typed calls. Every call keeps a usable id so
/// the tool message can always answer it.
fn normalize_calls(raw_calls: &[Value]) -> Vec<PendingCall> {
    raw_calls
        .iter()
        .map(|raw| {
            let id = raw.get("id").and_then(|v| v.as_str()).map(str::to_string);
            let function = raw.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let arguments = match function.and_then(|f| f.get("arguments")) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            };

            let problem = match (&id, &name, &arguments) {
                (None, _, _) => Some("Error: Tool call missing required 'id' field".to_string()),
                (_, None, _) => Some("Error: Tool call missing required 'function.name' field".to_string()),
                (_, _, None) => {
                    Some("Error: Tool call missing required 'function.arguments' field".to_string())
                }
                _ => None,
            };

            PendingCall {
                call: ToolCall::function(
                    id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                    name.unwrap_or_default(),
                    arguments.unwrap_or_else(|| "{}".to_string()),
                ),
                problem,
            }
        })
        .collect()
}
