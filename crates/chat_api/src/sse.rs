use serde_json::Value;

use crate::events::{ChatStreamEvent, FinishReason};

/// Incremental parser for chat-completions SSE streams.
///
/// Bytes are buffered until a full frame (`\n\n`) is available, so multi-byte
/// characters split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ChatStreamEvent> {
        self.buffer
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
        let mut events = Vec::new();

        while let Some(split) = find_frame_end(&self.buffer) {
            let frame = String::from_utf8_lossy(&self.buffer[..split]).into_owned();
            self.buffer.drain(0..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                events.push(ChatStreamEvent::Done);
                continue;
            }

            match serde_json::from_str::<Value>(&payload) {
                Ok(value) => map_chunk(&value, &mut events),
                Err(error) => {
                    tracing::warn!(%error, bytes = payload.len(), "dropping unparseable stream frame");
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<ChatStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_chunk(value: &Value, events: &mut Vec<ChatStreamEvent>) {
    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        let code = error
            .get("code")
            .and_then(|value| value.as_str())
            .map(ToString::to_string);
        let message = error
            .get("message")
            .and_then(|value| value.as_str())
            .map(ToString::to_string);
        events.push(ChatStreamEvent::Error { code, message });
        return;
    }

    // Azure sends a leading frame with only `prompt_filter_results` and no choices.
    let Some(choice) = value
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
    else {
        return;
    };

    let delta = choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(|value| value.as_str())
        .unwrap_or("");
    if !delta.is_empty() {
        events.push(ChatStreamEvent::ContentDelta {
            delta: delta.to_owned(),
        });
    }

    if let Some(raw) = choice.get("finish_reason").and_then(|value| value.as_str()) {
        let reason = FinishReason::parse(raw);
        if reason.is_none() {
            tracing::warn!(finish_reason = raw, "unrecognized finish_reason");
        }
        events.push(ChatStreamEvent::Finished { reason });
    }
}
