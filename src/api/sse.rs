//! Incremental decoder for `text/event-stream` bodies.

/// Collects bytes until blank-line terminated events are complete.
///
/// Only `data:` fields matter to the dashboard; `event:`, `id:`, `retry:` and
/// comment lines are dropped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk, get back the data payload of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"type\":").is_empty());
        assert!(decoder.push(b" \"connected\"}\n").is_empty());
        let events = decoder.push(b"\n");
        assert_eq!(events, vec![r#"{"type": "connected"}"#.to_string()]);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keepalive\r\nevent: update\r\ndata: a\r\ndata: b\r\n\r\ndata: c\n\n");
        assert_eq!(events, vec!["a\nb".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_utf8_split_mid_character() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: Scrapování\n\n".as_bytes();
        let (head, tail) = bytes.split_at(14);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["Scrapování".to_string()]);
    }
}
