use std::time::Duration;

use crate::errors::ChatError;

/// Environment variable holding the chat endpoint URL.
pub const CHAT_URL_ENV: &str = "HEALIO_CHAT_URL";
/// Environment variable holding the publishable key sent as bearer auth.
pub const CHAT_KEY_ENV: &str = "HEALIO_CHAT_KEY";

/// Configuration for the HTTP chat transport.
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Full URL of the streaming chat function.
    pub endpoint_url: String,
    /// Key used for bearer auth.
    pub api_key: String,
    /// Timeout for establishing the request and receiving response headers.
    pub connect_timeout: Duration,
}

impl ChatClientConfig {
    pub fn new(endpoint_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            api_key: api_key.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Builds a config from `HEALIO_CHAT_URL` and `HEALIO_CHAT_KEY`.
    pub fn from_env() -> Result<Self, ChatError> {
        let url = read_required(CHAT_URL_ENV)?;
        let key = read_required(CHAT_KEY_ENV)?;
        Ok(Self::new(url, key))
    }

    /// Builds the endpoint from a backend base URL and function name,
    /// e.g. `https://x.supabase.co` + `empathic-chat`.
    pub fn for_function(
        base_url: &str,
        function: &str,
        api_key: impl Into<String>,
    ) -> Self {
        let url = format!(
            "{}/functions/v1/{}",
            base_url.trim_end_matches('/'),
            function.trim_start_matches('/')
        );
        Self::new(url, api_key)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChatError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ChatError::Config("chat endpoint_url must not be empty".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ChatError::Config("chat api_key must not be empty".into()));
        }
        Ok(())
    }
}

fn read_required(key: &str) -> Result<String, ChatError> {
    let value = std::env::var(key).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(ChatError::Config(format!("missing {key} for chat transport")));
    }
    Ok(value)
}
