//! Outbound chat request and the byte stream it returns.
//!
//! The session only sees `ChatTransport`; the HTTP client is one
//! implementation and tests substitute their own.
mod config;
mod http;

pub use config::ChatClientConfig;
pub use http::HttpChatTransport;

use crate::errors::ChatError;
use crate::model::ChatMessage;
use crate::reader::ByteStream;

/// Request body sent to the chat endpoint: prior history plus the new user message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// Starts a streamed reply for a chat request.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issues the request and returns the response body as a byte stream.
    ///
    /// Failures before the body is available are `ChatError::Transport`;
    /// failures while reading the body surface through the stream as
    /// `ChatError::StreamRead`.
    async fn start_stream(&self, request: ChatRequest) -> Result<ByteStream, ChatError>;
}
