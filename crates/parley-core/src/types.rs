//! Shared data types for Parley
//!
//! Defines the chat wire types exchanged with callers and the relay
//! configuration shared by both call modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::rate_limiting::GovernorConfig;
use crate::retry::RetryPlan;

/// A chat request received from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

/// Non-streaming reply, also the shape of every streamed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// A single message in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }
}

/// The role of a message in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("unknown message role: '{}'", other)),
        }
    }
}

/// One element of a streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Text decoded from an upstream frame
    Delta(String),
    /// Synthetic notice produced by the relay itself, e.g. while waiting out a 429
    Status(String),
}

impl StreamChunk {
    pub fn text(&self) -> &str {
        match self {
            StreamChunk::Delta(text) | StreamChunk::Status(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            StreamChunk::Delta(text) | StreamChunk::Status(text) => text,
        }
    }
}

/// Configuration for the outbound relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub governor: GovernorConfig,
    pub completion_retry: RetryPlan,
    pub stream_retry: RetryPlan,
    pub max_concurrent_requests: usize,
}

impl RelayConfig {
    pub const DEFAULT_TEMPERATURE: f64 = 0.7;
    pub const DEFAULT_MAX_TOKENS: u32 = 1000;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: Self::DEFAULT_TEMPERATURE,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            request_timeout: Self::DEFAULT_TIMEOUT,
            governor: GovernorConfig::default(),
            completion_retry: RetryPlan::completion(),
            stream_retry: RetryPlan::streaming(),
            max_concurrent_requests: Self::DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_governor(mut self, governor: GovernorConfig) -> Self {
        self.governor = governor;
        self
    }

    pub fn with_completion_retry(mut self, plan: RetryPlan) -> Self {
        self.completion_retry = plan;
        self
    }

    pub fn with_stream_retry(mut self, plan: RetryPlan) -> Self {
        self.stream_retry = plan;
        self
    }

    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit.max(1);
        self
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash on the base.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_stream_defaults_to_false() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert!(!request.stream);
        assert_eq!(request.messages, vec![ChatMessage::user("hi")]);
    }

    #[test]
    fn test_message_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("be brief")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be brief"}"#);
    }

    #[test]
    fn test_message_role_rejects_unknown_role() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"role":"robot","content":"x"}"#);
        assert!(result.is_err());
        assert!("robot".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_message_role_round_trips_through_str() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            assert_eq!(role.as_str().parse::<MessageRole>().unwrap(), role);
        }
    }

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::new("https://api.example.com/v1", "key", "model-a");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.completion_retry.max_attempts, 5);
        assert_eq!(config.stream_retry.max_attempts, 3);
        assert_eq!(config.governor.min_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        let config = RelayConfig::new("https://api.example.com/v1/", "key", "m");
        assert_eq!(
            config.completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_max_concurrent_requests_never_zero() {
        let config = RelayConfig::new("http://x", "k", "m").with_max_concurrent_requests(0);
        assert_eq!(config.max_concurrent_requests, 1);
    }

    #[test]
    fn test_stream_chunk_text() {
        assert_eq!(StreamChunk::Delta("a".into()).text(), "a");
        assert_eq!(StreamChunk::Status("wait".into()).into_text(), "wait");
    }
}
