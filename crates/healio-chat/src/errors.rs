/// Errors surfaced by the chat companion API.
///
/// Malformed stream lines never appear here: the reader drops them and keeps
/// going. Everything below is fatal for the operation that returned it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Reading the response body failed mid-stream (network error or read timeout).
    #[error("stream read error: {message}")]
    StreamRead { message: String },
    /// The chat request could not be started (connect failure, non-2xx status).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
    },
    /// The transcript or conversation store rejected an operation.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// Invalid input to the session API.
    #[error("validation error: {0}")]
    Validation(String),
    /// Invalid or missing client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The turn was aborted by the caller before the reply finished.
    #[error("turn cancelled")]
    Cancelled,
}

impl ChatError {
    /// Creates a stream read error.
    pub fn stream_read(message: impl Into<String>) -> Self {
        Self::StreamRead {
            message: message.into(),
        }
    }

    /// Creates a transport error with an optional HTTP status.
    pub fn transport(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Human-readable text suitable for a user notification.
    ///
    /// Unlike `Display`, this omits the error-kind prefix.
    pub fn user_message(&self) -> String {
        match self {
            Self::StreamRead { message } | Self::Transport { message, .. } => message.clone(),
            Self::Persistence(message) | Self::Validation(message) | Self::Config(message) => {
                message.clone()
            }
            Self::Cancelled => "The reply was cancelled".to_string(),
        }
    }

    /// Returns true when the failure came from the network side of a turn.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::StreamRead { .. } | Self::Transport { .. })
    }
}
