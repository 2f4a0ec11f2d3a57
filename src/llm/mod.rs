//! Model invocation: the `ChatModel` seam and its provider adapters.
//!
//! Every adapter takes role-tagged messages plus a temperature and returns a
//! single string (and, for search-enabled calls, citations). Provider-specific
//! response shapes are normalized here so nothing above this module sees them.

pub mod gemini;
pub mod http;
pub mod mock;
pub mod openai;
pub mod rate_limit;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::LlmSettings;
use crate::error::Result;

pub use gemini::GeminiModel;
pub use mock::MockModel;
pub use openai::OpenAiModel;
pub use rate_limit::{RateLimited, RateLimiter};

// ─────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One call to a text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    /// Ask the provider to ground the answer in live web search.
    pub web_search: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>, temperature: f32) -> Self {
        Self {
            messages,
            temperature,
            web_search: false,
        }
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    /// Content of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatResponse {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl ChatResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }
}

/// A hosted (or mocked) text-generation service.
///
/// `complete` performs exactly one logical call; transport-level retries are
/// the adapter's business.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name, used in errors and logs
    fn name(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// Flatten a message `content` value into text.
///
/// A string is returned as is. A list is joined with newlines: string items
/// verbatim, `{"text": ..}` items by their text, anything else stringified.
/// An object with a string `text` yields that text.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Object(obj) => match obj.get("text") {
                    Some(Value::String(text)) => text.clone(),
                    _ => item.to_string(),
                },
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(obj) => match obj.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => content.to_string(),
        },
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Provider selection
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint
    OpenAi,
    Mock,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" | "deepseek" | "local" => Ok(ProviderKind::OpenAi),
            "mock" => Ok(ProviderKind::Mock),
            _ => Err(format!(
                "Unknown provider '{}'. Valid: gemini, openai, deepseek, local, mock",
                s
            )),
        }
    }
}

/// Build the configured model, wrapped in a rate limiter when one is set.
pub fn build_model(settings: &LlmSettings) -> Result<Arc<dyn ChatModel>> {
    let kind = settings.provider_kind()?;

    let model: Arc<dyn ChatModel> = match kind {
        ProviderKind::Gemini => Arc::new(GeminiModel::from_settings(settings)?),
        ProviderKind::OpenAi => Arc::new(OpenAiModel::from_settings(settings)?),
        ProviderKind::Mock => {
            let mock = MockModel::new();
            if let Some(ref reply) = settings.mock_response {
                mock.set_default_response(reply.clone());
            }
            Arc::new(mock)
        }
    };

    info!(provider = %kind, model = %settings.model, "Model adapter created");

    if settings.requests_per_minute > 0 && kind != ProviderKind::Mock {
        return Ok(Arc::new(RateLimited::new(
            model,
            RateLimiter::per_minute(settings.requests_per_minute),
        )));
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_string() {
        assert_eq!(flatten_content(&json!("hello")), "hello");
    }

    #[test]
    fn test_flatten_parts() {
        let content = json!([
            {"type": "text", "text": "first"},
            "second",
            {"type": "image", "url": "x"},
            42
        ]);
        assert_eq!(
            flatten_content(&content),
            "first\nsecond\n{\"type\":\"image\",\"url\":\"x\"}\n42"
        );
    }

    #[test]
    fn test_flatten_object_and_null() {
        assert_eq!(flatten_content(&json!({"text": "only"})), "only");
        assert_eq!(flatten_content(&Value::Null), "");
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("DeepSeek".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("mock".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
        assert!("watson".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_last_user_message() {
        let request = ChatRequest::new(
            vec![
                Message::system("preamble"),
                Message::user("first"),
                Message::assistant("reply"),
                Message::user("second"),
            ],
            0.3,
        );
        assert_eq!(request.last_user_message(), Some("second"));
    }

    #[test]
    fn test_build_mock_model() {
        let settings = LlmSettings {
            provider: "mock".to_string(),
            mock_response: Some("canned".to_string()),
            ..LlmSettings::default()
        };
        let model = build_model(&settings).unwrap();
        assert_eq!(model.name(), "mock");

        let response = tokio_test::block_on(
            model.complete(ChatRequest::new(vec![Message::user("hi")], 0.2)),
        )
        .unwrap();
        assert_eq!(response.text, "canned");
    }

    #[test]
    fn test_build_gemini_without_key_succeeds() {
        let settings = LlmSettings {
            provider: "gemini".to_string(),
            api_key: String::new(),
            requests_per_minute: 0,
            ..LlmSettings::default()
        };
        // A missing key surfaces at call time, not at construction
        let model = build_model(&settings).unwrap();
        assert_eq!(model.name(), "gemini");
    }
}
