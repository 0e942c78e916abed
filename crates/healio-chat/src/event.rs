//! Line-level classification of the chat completion event stream.
//!
//! Each relevant line looks like
//! `data: {"choices":[{"delta":{"content":"<fragment>"}}]}` and the stream may
//! end with `data: [DONE]`.

/// Prefix that marks a data line. The trailing space is part of the prefix.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const CONTENT_POINTER: &str = "/choices/0/delta/content";

/// What a single stream line means to the reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Non-empty content fragment to append to the reply.
    Delta { text: String },
    /// End-of-stream sentinel.
    Terminal,
    /// Blank line or `:` comment (keep-alive).
    CommentOrBlank,
    /// Line without the data prefix, or a record carrying no content.
    Ignored,
    /// Data payload that is not valid JSON.
    Malformed { reason: String },
}

impl StreamEvent {
    /// Classifies one line. A trailing `\r` is stripped first.
    pub fn parse_line(line: &str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() || line.starts_with(':') {
            return Self::CommentOrBlank;
        }
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            return Self::Ignored;
        };
        let payload = rest.trim();
        if payload == DONE_SENTINEL {
            return Self::Terminal;
        }
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => match extract_fragment(&value) {
                Some(text) => Self::Delta {
                    text: text.to_string(),
                },
                None => Self::Ignored,
            },
            Err(e) => Self::Malformed {
                reason: e.to_string(),
            },
        }
    }
}

/// Reads `choices[0].delta.content`; empty and non-string content yield `None`.
pub fn extract_fragment(value: &serde_json::Value) -> Option<&str> {
    value
        .pointer(CONTENT_POINTER)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
