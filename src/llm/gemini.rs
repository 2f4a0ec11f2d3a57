//! Google Gemini `generateContent` adapter, with optional Google Search grounding.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::http::HttpTransport;
use super::{ChatModel, ChatRequest, ChatResponse, Citation, Message, Role};
use crate::config::LlmSettings;
use crate::error::{Error, Result};

const PROVIDER: &str = "gemini";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiModel {
    transport: HttpTransport,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiModel {
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

    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Self::new(
            settings
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            settings.model.clone(),
            settings.api_key.clone(),
            settings.timeout_secs,
            settings.max_retries,
        )
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        if self.api_key.is_empty() {
            return Err(Error::model_unavailable(
                PROVIDER,
                "no API key configured (set AGENTDESK_LLM_API_KEY or GEMINI_API_KEY)",
            ));
        }

        let body = build_request_body(&request);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let headers = [("x-goog-api-key", self.api_key.clone())];

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            web_search = request.web_search,
            "Calling generateContent"
        );

        let response = self.transport.post_json(&url, &headers, &body).await?;
        parse_response(&response)
    }
}

/// System messages go to `systemInstruction`; the assistant role is `model`.
fn build_request_body(request: &ChatRequest) -> Value {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(content_entry)
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": { "temperature": request.temperature },
    });

    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    if request.web_search {
        body["tools"] = json!([{ "googleSearch": {} }]);
    }

    body
}

fn content_entry(message: &Message) -> Value {
    let role = match message.role {
        Role::Assistant => "model",
        _ => "user",
    };
    json!({ "role": role, "parts": [{ "text": message.content }] })
}

fn parse_response(response: &Value) -> Result<ChatResponse> {
    let candidate = response.pointer("/candidates/0").ok_or_else(|| {
        let reason = response
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .unwrap_or("no candidates returned");
        Error::model_response(PROVIDER, reason.to_string())
    })?;

    let text = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        text,
        citations: parse_citations(candidate),
    })
}

/// Grounding chunks with both a URI and a title, de-duplicated by URL.
fn parse_citations(candidate: &Value) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();

    let chunks = candidate
        .pointer("/groundingMetadata/groundingChunks")
        .and_then(Value::as_array);

    for chunk in chunks.into_iter().flatten() {
        let web = chunk.get("web");
        let uri = web.and_then(|w| w.get("uri")).and_then(Value::as_str);
        let title = web.and_then(|w| w.get("title")).and_then(Value::as_str);

        if let (Some(uri), Some(title)) = (uri, title) {
            if !citations.iter().any(|c| c.url == uri) {
                citations.push(Citation {
                    title: title.to_string(),
                    url: uri.to_string(),
                });
            }
        }
    }

    citations
}
