//! Incremental decoder for the newline-delimited stream frame format.
//!
//! A raw frame is a blank-line-terminated set of `field: value` lines.
//! Recognized fields are `id`, `event`, `data` (repeated lines
//! concatenate with `\n`), and `retry` (milliseconds). Lines starting
//! with `:` are comments. Unknown fields are ignored. A malformed frame
//! is dropped and reported as a parse error; the connection stays open.
//!
//! The decoder remembers the identifier of the last successfully decoded
//! frame so a client can replay it as a resume hint on reconnect.

use veilchat_types::error::StreamError;
use veilchat_types::transport::StreamFrame;

/// Streaming frame decoder over arbitrary byte chunks.
///
/// Feed chunks as they arrive; complete frames come out as they are
/// terminated by a blank line. Input split anywhere -- mid-line,
/// mid-UTF-8 sequence -- is handled because buffering happens at the
/// byte level and lines only break on `\n`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    current: StreamFrame,
    /// First malformation seen in the current frame; poisons dispatch.
    poisoned: Option<String>,
    last_event_id: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the most recent successfully decoded frame that
    /// carried an `id` field.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Consume a chunk of bytes, returning every frame completed by it.
    ///
    /// Malformed frames surface as `Err(StreamError::Parse)` entries in
    /// arrival position; decoding continues with the next frame.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamFrame, StreamError>> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            // Strip the terminator and an optional preceding CR.
            let mut line = &line[..line.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(result) = self.process_line(&line) {
                out.push(result);
            }
        }
        out
    }

    /// Handle one complete line. Returns a frame (or parse error) when
    /// the line is the blank frame terminator.
    fn process_line(&mut self, line: &str) -> Option<Result<StreamFrame, StreamError>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None; // comment
        }

        let Some((field, value)) = split_field(line) else {
            self.poison(format!("line without field separator: {line:?}"));
            return None;
        };

        match field {
            "id" => self.current.id = Some(value.to_string()),
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
            }
            "retry" => match value.parse::<u64>() {
                Ok(ms) => self.current.retry = Some(ms),
                Err(_) => self.poison(format!("invalid retry value: {value:?}")),
            },
            _ => {
                // Unknown field: ignored, not an error.
                tracing::trace!(field, "ignoring unknown frame field");
            }
        }
        None
    }

    fn poison(&mut self, reason: String) {
        if self.poisoned.is_none() {
            self.poisoned = Some(reason);
        }
    }

    /// Terminate the current frame: emit it, or the parse error that
    /// poisoned it. Empty frames (e.g. consecutive blank lines) emit
    /// nothing.
    fn dispatch(&mut self) -> Option<Result<StreamFrame, StreamError>> {
        let frame = std::mem::take(&mut self.current);
        if let Some(reason) = self.poisoned.take() {
            return Some(Err(StreamError::Parse(reason)));
        }
        if frame.is_empty() {
            return None;
        }
        if let Some(id) = &frame.id {
            self.last_event_id = Some(id.clone());
        }
        Some(Ok(frame))
    }
}

/// Split `field: value`, trimming the single optional space after the
/// colon as the format prescribes.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let field = &line[..colon];
    let value = line[colon + 1..].strip_prefix(' ').unwrap_or(&line[colon + 1..]);
    Some((field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(decoder: &mut FrameDecoder, input: &str) -> Vec<Result<StreamFrame, StreamError>> {
        decoder.feed(input.as_bytes())
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "id: 7\nevent: message\ndata: {\"x\":1}\n\n");
        assert_eq!(out.len(), 1);
        let frame = out[0].as_ref().unwrap();
        assert_eq!(frame.id.as_deref(), Some("7"));
        assert_eq!(frame.event.as_deref(), Some("message"));
        assert_eq!(frame.data, "{\"x\":1}");
    }

    #[test]
    fn test_data_lines_concatenate_with_newline() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "data: first\ndata: second\n\n");
        let frame = out[0].as_ref().unwrap();
        assert_eq!(frame.data, "first\nsecond");
    }

    #[test]
    fn test_chunk_split_mid_line() {
        let mut decoder = FrameDecoder::new();
        assert!(frames(&mut decoder, "data: hel").is_empty());
        assert!(frames(&mut decoder, "lo\n").is_empty());
        let out = frames(&mut decoder, "\n");
        assert_eq!(out[0].as_ref().unwrap().data, "hello");
    }

    #[test]
    fn test_unknown_field_ignored() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "data: x\nfancy: value\n\n");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());
    }

    #[test]
    fn test_comment_line_ignored() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, ": keepalive\ndata: x\n\n");
        assert_eq!(out[0].as_ref().unwrap().data, "x");
    }

    #[test]
    fn test_malformed_retry_poisons_frame() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "retry: soon\ndata: x\n\n");
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(StreamError::Parse(_))));
    }

    #[test]
    fn test_line_without_separator_poisons_frame() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "garbage\ndata: x\n\n");
        assert!(matches!(out[0], Err(StreamError::Parse(_))));
    }

    #[test]
    fn test_decoding_continues_after_malformed_frame() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "retry: NaN\n\ndata: ok\n\n");
        assert_eq!(out.len(), 2);
        assert!(out[0].is_err());
        assert_eq!(out[1].as_ref().unwrap().data, "ok");
    }

    #[test]
    fn test_last_event_id_tracks_successful_frames_only() {
        let mut decoder = FrameDecoder::new();
        frames(&mut decoder, "id: 1\ndata: a\n\n");
        assert_eq!(decoder.last_event_id(), Some("1"));

        // Poisoned frame must not advance the resume hint.
        frames(&mut decoder, "id: 2\nretry: NaN\n\n");
        assert_eq!(decoder.last_event_id(), Some("1"));

        frames(&mut decoder, "id: 3\ndata: b\n\n");
        assert_eq!(decoder.last_event_id(), Some("3"));
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "data: x\r\n\r\n");
        assert_eq!(out[0].as_ref().unwrap().data, "x");
    }

    #[test]
    fn test_consecutive_blank_lines_emit_nothing() {
        let mut decoder = FrameDecoder::new();
        assert!(frames(&mut decoder, "\n\n\n").is_empty());
    }

    #[test]
    fn test_retry_field_parsed() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "retry: 2500\ndata: x\n\n");
        assert_eq!(out[0].as_ref().unwrap().retry, Some(2500));
    }

    #[test]
    fn test_value_space_trimming_is_single() {
        let mut decoder = FrameDecoder::new();
        let out = frames(&mut decoder, "data:  two spaces\ndata:none\n\n");
        // Only one leading space is stripped; absent space is fine too.
        assert_eq!(out[0].as_ref().unwrap().data, " two spaces\nnone");
    }
}
