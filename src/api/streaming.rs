use crate::api::models::StreamResponse;
use crate::error::{ChatError, Result};
use futures::StreamExt;
use tokio::time::{timeout, Duration};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental Server-Sent Events decoder. Network chunks may end mid-line or
/// inside a multi-byte character, so bytes are buffered and only complete
/// lines are decoded; the tail waits for the next chunk.
#[derive(Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        decode_lines(&complete)
    }

    /// Interpret whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.pending);
        decode_lines(&rest)
    }
}

fn decode_lines(bytes: &[u8]) -> Vec<SseEvent> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let (field, value) = match line.find(':') {
        Some(pos) => (&line[..pos], line[pos + 1..].trim_start()),
        None => (line, ""),
    };

    match field.trim() {
        "data" if value == "[DONE]" => Some(SseEvent::Done),
        "data" => Some(SseEvent::Data(value.to_string())),
        other => {
            debug!("ignoring SSE field {}: {}", other, value);
            None
        }
    }
}

/// Content text carried by one `data:` payload. Azure sends an initial chunk
/// with empty `choices` (prompt filter results); it yields nothing.
pub fn delta_content(data: &str) -> Option<String> {
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(parsed) => {
            let text: String = parsed
                .choices
                .unwrap_or_default()
                .into_iter()
                .filter_map(|choice| choice.delta.and_then(|d| d.content))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        Err(e) => {
            debug!("stream JSON parse error: {}", e);
            None
        }
    }
}

/// Drain a streaming chat-completion response, forwarding every content delta
/// and returning the full answer.
pub async fn process_streaming_response(
    response: reqwest::Response,
    timeout_secs: u64,
    on_delta: &mut (dyn for<'s> FnMut(&'s str) + Send),
) -> Result<String> {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut assistant_response = String::new();
    let chunk_timeout = Duration::from_secs(timeout_secs);

    loop {
        let (events, ended) = match timeout(chunk_timeout, stream.next()).await {
            Ok(Some(chunk)) => {
                let chunk = chunk?;
                (decoder.push(&chunk), false)
            }
            Ok(None) => (decoder.finish(), true),
            Err(_) => {
                debug!("no stream data for {} seconds", timeout_secs);
                return Err(ChatError::Timeout);
            }
        };

        for event in events {
            match event {
                SseEvent::Done => return Ok(assistant_response),
                SseEvent::Data(data) => {
                    if let Some(content) = delta_content(&data) {
                        on_delta(&content);
                        assistant_response.push_str(&content);
                    }
                }
            }
        }

        // Stream closed without [DONE]; keep what arrived
        if ended {
            return Ok(assistant_response);
        }
    }
}
