//! MCP client over streamable HTTP (JSON-RPC 2.0).
//!
//! Each configured server gets one session, opened lazily with `initialize`.
//! Tool names are discovered with `tools/list` and cached per server; a server
//! that could not be listed is tried again on the next lookup. When two
//! servers offer the same tool, the first configured server wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{extract_tool_text, ToolInvoker};
use crate::config::{McpServerSettings, ToolSettings};
use crate::error::{Error, Result};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SESSION_HEADER: &str = "Mcp-Session-Id";
const ACCEPT: &str = "application/json, text/event-stream";

pub struct McpClient {
    http: Client,
    servers: Vec<McpServerSettings>,
    /// Server index -> session id (`None` for stateless servers)
    sessions: RwLock<HashMap<usize, Option<String>>>,
    /// Server index -> tool names, for servers listed successfully
    listed: RwLock<HashMap<usize, Vec<String>>>,
    next_id: AtomicU64,
}

impl McpClient {
    pub fn new(settings: &ToolSettings) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(settings.timeout_secs));
        if cfg!(test) {
            // Stub servers listen on loopback; host proxy settings must not apply
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            servers: settings.servers.clone(),
            sessions: RwLock::new(HashMap::new()),
            listed: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn has_servers(&self) -> bool {
        !self.servers.is_empty()
    }

    /// Session for a server, opening one on first use.
    async fn session(&self, idx: usize) -> Result<Option<String>> {
        let cached = self.sessions.read().get(&idx).cloned();
        if let Some(existing) = cached {
            return Ok(existing);
        }

        let server = &self.servers[idx];
        info!(server = %server.name, url = %server.url, "Initializing MCP session");

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });
        let (_, session_id) = self
            .post(idx, None, "initialize", Some(params), &server.name)
            .await?;

        // Servers may ignore the notification; failures here are not fatal
        if let Err(e) = self
            .notify(idx, session_id.as_deref(), "notifications/initialized")
            .await
        {
            debug!(server = %server.name, error = %e, "initialized notification failed");
        }

        debug!(server = %server.name, session = ?session_id, "MCP session ready");
        self.sessions.write().insert(idx, session_id.clone());
        Ok(session_id)
    }

    /// One JSON-RPC request; returns the `result` member.
    async fn request(&self, idx: usize, method: &str, params: Value, label: &str) -> Result<Value> {
        let session = self.session(idx).await?;
        let (result, _) = self
            .post(idx, session.as_deref(), method, Some(params), label)
            .await?;
        Ok(result)
    }

    async fn post(
        &self,
        idx: usize,
        session: Option<&str>,
        method: &str,
        params: Option<Value>,
        label: &str,
    ) -> Result<(Value, Option<String>)> {
        let server = &self.servers[idx];
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut body = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if let Some(params) = params {
            body["params"] = params;
        }

        let response = self
            .request_builder(server, session)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::tool_call_failed(label, format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(|e| {
            Error::tool_call_failed(label, format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(Error::tool_call_failed(
                label,
                format!("{} returned HTTP {}: {}", method, status.as_u16(), snippet(&text)),
            ));
        }

        let message = parse_rpc_body(&text).ok_or_else(|| {
            Error::tool_call_failed(label, format!("Unparsable MCP response: {}", snippet(&text)))
        })?;

        if let Some(error) = message.get("error") {
            let detail = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(Error::tool_call_failed(label, detail));
        }

        let result = message.get("result").cloned().unwrap_or(Value::Null);
        Ok((result, session_id))
    }

    async fn notify(&self, idx: usize, session: Option<&str>, method: &str) -> Result<()> {
        let server = &self.servers[idx];
        let body = json!({ "jsonrpc": "2.0", "method": method });
        self.request_builder(server, session)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::tool_call_failed(&server.name, e.to_string()))?;
        Ok(())
    }

    fn request_builder(
        &self,
        server: &McpServerSettings,
        session: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.http.post(&server.url).header("Accept", ACCEPT);
        if let Some(session) = session {
            req = req.header(SESSION_HEADER, session);
        }
        if let Some(ref token) = server.auth_token {
            req = req.header("Authorization", token);
        }
        req
    }

    /// Tool name -> server index over every server listed so far.
    ///
    /// Servers not yet listed are asked first. Fails with the last listing
    /// error only when no server has ever been listed.
    async fn catalog(&self) -> Result<HashMap<String, usize>> {
        let mut last_error = None;

        for idx in 0..self.servers.len() {
            let known = self.listed.read().contains_key(&idx);
            if known {
                continue;
            }

            let server_name = self.servers[idx].name.clone();
            match self.request(idx, "tools/list", json!({}), &server_name).await {
                Ok(result) => {
                    let names = tool_names(&result);
                    info!(server = %server_name, tools = names.len(), "MCP tools listed");
                    self.listed.write().insert(idx, names);
                }
                Err(e) => {
                    warn!(server = %server_name, error = %e, "Failed to list MCP tools");
                    // Reopen the session on the next attempt
                    self.sessions.write().remove(&idx);
                    last_error = Some(e);
                }
            }
        }

        let listed = self.listed.read();
        if listed.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let mut catalog: HashMap<String, usize> = HashMap::new();
        for idx in 0..self.servers.len() {
            for name in listed.get(&idx).into_iter().flatten() {
                catalog.entry(name.clone()).or_insert(idx);
            }
        }
        Ok(catalog)
    }
}

#[async_trait]
impl ToolInvoker for McpClient {
    async fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        let idx = *self
            .catalog()
            .await?
            .get(name)
            .ok_or_else(|| Error::tool_not_found(name))?;

        debug!(tool = name, server = %self.servers[idx].name, "Calling MCP tool");
        let result = self
            .request(
                idx,
                "tools/call",
                json!({ "name": name, "arguments": Value::Object(args) }),
                name,
            )
            .await?;

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(Error::tool_call_failed(name, extract_tool_text(&result)));
        }

        Ok(result)
    }

    async fn list_tools(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.catalog().await?.into_keys().collect();
        names.sort();
        Ok(names)
    }
}

/// `result.tools[].name` of a `tools/list` response.
fn tool_names(result: &Value) -> Vec<String> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a response body that is either plain JSON or SSE `data:` frames.
///
/// For SSE, the last frame that parses as JSON is used.
fn parse_rpc_body(body: &str) -> Option<Value> {
    let frames = sse_data_frames(body);
    if !frames.is_empty() {
        return frames
            .iter()
            .rev()
            .find_map(|frame| serde_json::from_str::<Value>(frame.trim()).ok());
    }
    serde_json::from_str(body.trim()).ok()
}

/// Group consecutive `data:` lines into frames; blank and `event:` lines end a frame.
fn sse_data_frames(body: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let mut current = String::new();
    let mut in_data = false;

    for line in body.lines() {
        let trimmed = line.trim_end_matches('\r').trim_start();
        if let Some(rest) = trimmed.strip_prefix("data:") {
            if in_data {
                current.push('\n');
            }
            current.push_str(rest.trim_start());
            in_data = true;
            continue;
        }
        if in_data && (trimmed.is_empty() || trimmed.starts_with("event:")) {
            frames.push(std::mem::take(&mut current));
            in_data = false;
        }
    }
    if in_data {
        frames.push(current);
    }

    frames.retain(|f| !f.trim().is_empty());
    frames
}

fn snippet(text: &str) -> String {
    text.trim().chars().take(200).collect()
}
