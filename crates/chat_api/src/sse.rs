use serde_json::Value;

use crate::events::ChatStreamEvent;

const DONE_SENTINEL: &str = "[DONE]";

/// Incremental parser for `data:` line streams.
///
/// Bytes are buffered until a full line is available so that a line, or a multi-byte
/// character inside it, may be split across network chunks.
#[derive(Debug, Default)]
pub struct ChatStreamParser {
    buffer: Vec<u8>,
}

impl ChatStreamParser {
    /// Feed arbitrary bytes into the parser and drain events for every complete line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ChatStreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            parse_line(&String::from_utf8_lossy(&line), &mut events);
        }

        events
    }

    /// Parse whatever is left in the buffer as a final line.
    pub fn finish(&mut self) -> Vec<ChatStreamEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            parse_line(&String::from_utf8_lossy(&line), &mut events);
        }
        events
    }

    /// Parse a complete stream body in one shot.
    pub fn parse_lines(input: &str) -> Vec<ChatStreamEvent> {
        let mut parser = Self::default();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn parse_line(line: &str, events: &mut Vec<ChatStreamEvent>) {
    let Some(payload) = extract_data_payload(line) else {
        return;
    };
    if payload == DONE_SENTINEL {
        events.push(ChatStreamEvent::Done);
        return;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => map_event(&value, events),
        Err(error) => tracing::debug!(%error, "skipping malformed stream line"),
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    let payload = line
        .trim_end_matches(['\r', '\n'])
        .strip_prefix("data:")?
        .trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

fn map_event(value: &Value, events: &mut Vec<ChatStreamEvent>) {
    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(value_as_string);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        events.push(ChatStreamEvent::Error { code, message });
        return;
    }

    let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    else {
        return;
    };

    if let Some(text) = choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
    {
        events.push(ChatStreamEvent::ContentDelta {
            text: text.to_owned(),
        });
    }

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        events.push(ChatStreamEvent::FinishReason {
            reason: reason.to_owned(),
        });
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::ChatStreamParser;
    use crate::events::ChatStreamEvent;

    #[test]
    fn parse_lines_incrementally() {
        let mut parser = ChatStreamParser::default();
        let mut events = Vec::new();

        events.extend(parser.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n"));
        assert_eq!(events.len(), 1);

        events.extend(parser.feed(b"data: [DONE]\n"));
        assert_eq!(events.last(), Some(&ChatStreamEvent::Done));
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn finish_flushes_a_trailing_line_without_newline() {
        let mut parser = ChatStreamParser::default();
        assert!(parser.feed(b"data: [DONE]").is_empty());
        assert_eq!(parser.finish(), vec![ChatStreamEvent::Done]);
        assert!(parser.finish().is_empty());
    }
}
