use futures::StreamExt as _;
use tracing::debug;

use crate::errors::ChatError;
use crate::reader::ByteStream;

use super::config::ChatClientConfig;
use super::{ChatRequest, ChatTransport};

const DEFAULT_FAILURE_MESSAGE: &str = "Failed to get response";

/// `ChatTransport` over HTTP: POSTs the history as JSON and streams the body back.
pub struct HttpChatTransport {
    client: reqwest::Client,
    config: ChatClientConfig,
}

impl HttpChatTransport {
    pub fn new(config: ChatClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build chat client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport from `HEALIO_CHAT_URL` / `HEALIO_CHAT_KEY`.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(ChatClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpChatTransport {
    async fn start_stream(&self, request: ChatRequest) -> Result<ByteStream, ChatError> {
        debug!(url = %self.config.endpoint_url, messages = request.messages.len(), "starting chat stream");
        let send = self
            .client
            .post(&self.config.endpoint_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send();
        let response = tokio::time::timeout(self.config.connect_timeout, send)
            .await
            .map_err(|_| {
                ChatError::transport(
                    format!(
                        "chat request timed out after {:?}",
                        self.config.connect_timeout
                    ),
                    None,
                )
            })?
            .map_err(|e| ChatError::transport(format!("chat request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::transport(
                error_message_from_body(&body),
                Some(status.as_u16()),
            ));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::stream_read(format!("chat stream read failed: {e}"))));
        Ok(Box::pin(body))
    }
}

/// Pulls the `error` field out of a JSON error body, falling back to a generic message.
pub(crate) fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|v| v.as_str())
                .map(ToOwned::to_owned)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_field_is_used_when_present() {
        assert_eq!(
            error_message_from_body(r#"{"error":"Rate limits exceeded, please try again later."}"#),
            "Rate limits exceeded, please try again later."
        );
    }

    #[test]
    fn unreadable_bodies_fall_back_to_default() {
        assert_eq!(error_message_from_body("<html>502</html>"), DEFAULT_FAILURE_MESSAGE);
        assert_eq!(error_message_from_body(r#"{"message":"x"}"#), DEFAULT_FAILURE_MESSAGE);
        assert_eq!(error_message_from_body(""), DEFAULT_FAILURE_MESSAGE);
    }

    #[test]
    fn construction_validates_config() {
        let err = HttpChatTransport::new(ChatClientConfig::new("", "key"));
        assert!(matches!(err, Err(ChatError::Config(_))));
    }
}
