// src/oracle.rs - Oracle client for chat-completion providers
// Thin wrapper over an OpenAI-compatible /chat/completions endpoint with
// per-call timeouts and a closed error taxonomy. No retries live here:
// retry policy is the verifier's decision, not the transport's.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// One chat turn sent to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

/// Closed oracle failure taxonomy. The verifier maps every variant to a
/// refusal; `class()` is the only part of an error that ever reaches a
/// client.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle call timed out")]
    Timeout,

    #[error("oracle transport failure: {0}")]
    Transport(String),

    #[error("oracle provider returned status {0}")]
    Provider(u16),

    #[error("oracle response envelope was malformed")]
    Malformed,

    #[error("oracle provider rate limited the call")]
    RateLimited,
}

impl OracleError {
    /// Stable, leak-free error class for diagnostics.
    pub fn class(&self) -> &'static str {
        match self {
            OracleError::Timeout => "timeout",
            OracleError::Transport(_) => "transport",
            OracleError::Provider(_) => "provider_error",
            OracleError::Malformed => "malformed_response",
            OracleError::RateLimited => "rate_limited",
        }
    }
}

/// Completion seam between the verifier and the model provider. The
/// production implementation speaks HTTP; tests script it.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Run one completion and normalize the result to a single content
    /// string, regardless of provider envelope shape.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, OracleError>;
}

/// HTTP oracle against an OpenAI-compatible provider.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpOracle {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

/// Pull the first choice's message content out of a provider envelope.
fn extract_content(envelope: &serde_json::Value) -> Option<String> {
    envelope["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let request_body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": messages,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout
                } else {
                    OracleError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            return Err(OracleError::Provider(status.as_u16()));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|_| OracleError::Malformed)?;

        let content = extract_content(&envelope).ok_or(OracleError::Malformed)?;
        debug!(model, chars = content.len(), "oracle completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content_from_standard_envelope() {
        let envelope = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  42  "}}]
        });
        assert_eq!(extract_content(&envelope).unwrap(), "42");
    }

    #[test]
    fn test_extract_content_rejects_missing_fields() {
        assert!(extract_content(&serde_json::json!({})).is_none());
        assert!(extract_content(&serde_json::json!({"choices": []})).is_none());
        assert!(extract_content(&serde_json::json!({
            "choices": [{"message": {"content": 7}}]
        }))
        .is_none());
    }

    #[test]
    fn test_error_classes_are_stable() {
        assert_eq!(OracleError::Timeout.class(), "timeout");
        assert_eq!(OracleError::Transport("x".into()).class(), "transport");
        assert_eq!(OracleError::Provider(500).class(), "provider_error");
        assert_eq!(OracleError::Malformed.class(), "malformed_response");
        assert_eq!(OracleError::RateLimited.class(), "rate_limited");
    }

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }
}
