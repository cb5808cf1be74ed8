//! Incremental decoding of the chat completion event stream.
//!
//! The backend sends `data:`-prefixed frames over a chunked body. Chunk
//! boundaries fall anywhere, including inside a multi-byte UTF-8
//! sequence or in the middle of a frame, so the decoder buffers bytes
//! until they form complete lines and re-decodes the remainder on the
//! next chunk.

use serde::Deserialize;
use tracing::warn;

use crate::ChatError;

#[derive(Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Turns raw body chunks into ordered text deltas.
///
/// Finite and not restartable: build a fresh decoder per response.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes held back because they end in a partial UTF-8 sequence.
    byte_buf: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    line_buf: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning every content delta completed by it.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<String> {
        self.byte_buf.extend_from_slice(chunk);

        // Decode as much valid UTF-8 as the buffer holds; keep a
        // trailing partial sequence for the next chunk.
        let (text, rest) = match std::str::from_utf8(&self.byte_buf) {
            Ok(s) => (s.to_string(), Vec::new()),
            Err(e) => {
                let valid = e.valid_up_to();
                let s = std::str::from_utf8(&self.byte_buf[..valid])
                    .unwrap_or_default()
                    .to_string();
                (s, self.byte_buf[valid..].to_vec())
            }
        };
        self.byte_buf = rest;
        self.line_buf.push_str(&text);

        let mut deltas = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            if let Some(delta) = Self::decode_line(line.trim()) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flush the final unterminated line once the upstream completes.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.line_buf);
        self.byte_buf.clear();
        Self::decode_line(line.trim())
    }

    /// Decode one frame line into at most one content delta.
    fn decode_line(line: &str) -> Option<String> {
        let payload = line.strip_prefix("data:")?.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return None;
        }
        match serde_json::from_str::<StreamFrame>(payload) {
            Ok(frame) => frame
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|s| !s.is_empty()),
            Err(e) => {
                // One bad frame must not abort the stream.
                let err = ChatError::MalformedFrame(e.to_string());
                warn!("skipping stream frame: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n"
        )
    }

    #[test]
    fn decodes_complete_frames() {
        let mut dec = FrameDecoder::new();
        let deltas = dec.push_bytes(frame("hello").as_bytes());
        assert_eq!(deltas, vec!["hello".to_string()]);
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut dec = FrameDecoder::new();
        let full = frame("split frame");
        let (a, b) = full.as_bytes().split_at(17);
        assert!(dec.push_bytes(a).is_empty());
        assert_eq!(dec.push_bytes(b), vec!["split frame".to_string()]);
    }

    #[test]
    fn multibyte_utf8_split_across_chunks() {
        let mut dec = FrameDecoder::new();
        let full = frame("こんにちは");
        let bytes = full.as_bytes();
        // Cut inside the first multi-byte character of the content.
        let cut = full.find('こ').unwrap() + 1;
        assert!(dec.push_bytes(&bytes[..cut]).is_empty());
        assert_eq!(dec.push_bytes(&bytes[cut..]), vec!["こんにちは".to_string()]);
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let mut dec = FrameDecoder::new();
        let mut input = String::from("data: {not json}\n");
        input.push_str(&frame("after"));
        let deltas = dec.push_bytes(input.as_bytes());
        assert_eq!(deltas, vec!["after".to_string()]);
    }

    #[test]
    fn done_sentinel_and_blank_lines_ignored() {
        let mut dec = FrameDecoder::new();
        let deltas = dec.push_bytes(b"data: [DONE]\n\ndata:\n");
        assert!(deltas.is_empty());
        assert!(dec.finish().is_none());
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut dec = FrameDecoder::new();
        let full = frame("tail");
        let line = full.trim_end();
        assert!(dec.push_bytes(line.as_bytes()).is_empty());
        assert_eq!(dec.finish(), Some("tail".to_string()));
    }

    #[test]
    fn two_frames_in_one_chunk() {
        let mut dec = FrameDecoder::new();
        let input = format!("{}{}", frame("one"), frame("two"));
        let deltas = dec.push_bytes(input.as_bytes());
        assert_eq!(deltas, vec!["one".to_string(), "two".to_string()]);
    }
}
