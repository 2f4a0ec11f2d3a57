//! External tool integration: the invocation seam, tool-call parsing and MCP.

pub mod args;
pub mod mcp;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::extract::extract_json_object;

pub use args::prepare_args;
pub use mcp::McpClient;

/// Something that can run a named tool with a JSON argument object.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run `name`; unknown tools fail with `ToolNotFound`.
    async fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value>;

    /// Names of every tool this invoker can run.
    async fn list_tools(&self) -> Result<Vec<String>>;
}

/// A tool invocation requested by a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Map<String, Value>,
}

impl ToolCall {
    /// Parse `{"tool": "<name>", "args": {...}}` out of free text.
    ///
    /// `arguments` is accepted for `args`; missing or non-object args mean `{}`.
    pub fn from_response(text: &str) -> Option<Self> {
        let obj = extract_json_object(text)?;

        let name = obj.get("tool")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }

        let args = obj
            .get("args")
            .or_else(|| obj.get("arguments"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Some(Self {
            name: name.to_string(),
            args,
        })
    }
}

/// The most specific text payload of a tool result.
///
/// Structured results carry a `content` list of `{"type": "text", "text": ..}`
/// items, joined here with newlines. Strings are returned as is and anything
/// else is stringified.
pub fn extract_tool_text(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let texts: Vec<&str> = obj
                .get("content")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get("text").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();

            if texts.is_empty() {
                result.to_string()
            } else {
                texts.join("\n")
            }
        }
        other => other.to_string(),
    }
}
