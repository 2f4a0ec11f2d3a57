//! OpenAI-compatible chat completions adapter
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, DeepSeek, Ollama, vLLM, LM Studio, etc.).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::{Host, Url};

use super::http::HttpTransport;
use super::{flatten_content, ChatModel, ChatRequest, ChatResponse, Message};
use crate::config::LlmSettings;
use crate::error::{Error, Result};

const PROVIDER: &str = "openai";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const LOCAL_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

pub struct OpenAiModel {
    transport: HttpTransport,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let base_url: String = base_url.into();
        Ok(Self {
            transport: HttpTransport::new(PROVIDER, timeout_secs, max_retries)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// The provider string picks the default endpoint when no base URL is set.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&settings.provider).to_string());

        Self::new(
            base_url,
            settings.model.clone(),
            settings.api_key.clone(),
            settings.timeout_secs,
            settings.max_retries,
        )
    }

    /// Local servers run without credentials.
    fn requires_key(&self) -> bool {
        !is_loopback(&self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.api_key))
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        if self.api_key.is_empty() && self.requires_key() {
            return Err(Error::model_unavailable(
                PROVIDER,
                format!("no API key configured for {}", self.base_url),
            ));
        }

        if request.web_search {
            warn!(
                provider = PROVIDER,
                model = %self.model,
                "Web search is not available on this provider; answering without search or citations"
            );
        }

        let body = serde_json::to_value(ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        })?;

        let mut headers = Vec::new();
        if let Some(auth) = self.auth_header() {
            headers.push(("Authorization", auth));
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, messages = request.messages.len(), "Calling chat completions");

        let response = self.transport.post_json(&url, &headers, &body).await?;
        parse_completion(&response)
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.trim().to_lowercase().as_str() {
        "deepseek" => DEEPSEEK_BASE_URL,
        "local" => LOCAL_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}

fn is_loopback(base_url: &str) -> bool {
    let Ok(url) = Url::parse(base_url) else {
        return false;
    };
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

/// Extract `choices[0].message.content`, which may be a string or a part list.
fn parse_completion(response: &Value) -> Result<ChatResponse> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| Error::model_response(PROVIDER, "No choices in API response"))?;

    let content = message.get("content").unwrap_or(&Value::Null);
    Ok(ChatResponse::text(flatten_content(content)))
}
