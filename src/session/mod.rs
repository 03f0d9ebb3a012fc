mod filesystem;
mod memory;
mod storage;

pub use filesystem::{FilesystemSessionStore, SESSION_EXPIRY_MINUTES};
pub use memory::MemorySessionStore;
pub use storage::SessionStore;

use crate::config::Config;
use crate::models::{Message, Session};
use chrono::Local;
use uuid::Uuid;

/// Keep system messages plus the conversation from the `turns`-th most recent
/// user message onward. Cutting at a user message means the kept history never
/// opens with a tool result or a tool-calling assistant message.
pub fn trim_conversation_history(messages: &mut Vec<Message>, turns: usize) {
    let turns = turns.max(1);

    let user_positions: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == "user")
        .map(|(i, _)| i)
        .collect();

    if user_positions.len() <= turns {
        return;
    }
    let cut = user_positions[user_positions.len() - turns];

    let trimmed: Vec<Message> = messages
        .drain(..)
        .enumerate()
        .filter(|(i, m)| m.role == "system" || *i >= cut)
        .map(|(_, m)| m)
        .collect();
    *messages = trimmed;
}

pub fn create_new_session() -> Session {
    Session {
        session_id: Uuid::new_v4().to_string(),
        last_updated: Local::now(),
        messages: vec![],
    }
}

/// Today's date, followed by the configured system prompt if any.
pub fn system_prompt(configured: Option<&str>) -> String {
    let date_prompt = format!("Today's date is {}.", Config::get_current_date());
    match configured {
        Some(prompt) if !prompt.trim().is_empty() => format!("{}\n\n{}", date_prompt, prompt),
        _ => date_prompt,
    }
}

/// Make sure the history opens with a system message.
pub fn ensure_system_message(messages: &mut Vec<Message>, configured: Option<&str>) {
    if messages.first().map(|m| m.role.as_str()) != Some("system") {
        messages.insert(0, Message::system(system_prompt(configured)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolCall;

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("sys"),
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
            Message::assistant_tool_calls(None, vec![ToolCall::function("c1", "add", "{}")]),
            Message::tool("c1", "3"),
            Message::assistant("a2"),
            Message::user("q3"),
            Message::assistant("a3"),
        ]
    }

    #[test]
    fn test_trim_keeps_system_and_last_turns() {
        let mut messages = conversation();
        trim_conversation_history(&mut messages, 2);

        let contents: Vec<Option<&str>> = messages.iter().map(|m| m.content.as_deref()).collect();
        assert_eq!(
            contents,
            vec![Some("sys"), Some("q2"), None, Some("3"), Some("a2"), Some("q3"), Some("a3")]
        );
    }

    #[test]
    fn test_trim_never_starts_with_tool_message() {
        let mut messages = conversation();
        trim_conversation_history(&mut messages, 1);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn test_trim_short_history_untouched() {
        let mut messages = conversation();
        trim_conversation_history(&mut messages, 10);
        assert_eq!(messages.len(), 9);
    }

    #[test]
    fn test_system_prompt_and_ensure() {
        assert!(system_prompt(None).starts_with("Today's date is "));
        assert!(system_prompt(Some("Be brief.")).ends_with("\n\nBe brief."));

        let mut messages = vec![Message::user("hi")];
        ensure_system_message(&mut messages, Some("Be brief."));
        assert_eq!(messages[0].role, "system");
        ensure_system_message(&mut messages, None);
        assert_eq!(messages.len(), 2);
    }
}
