//! Recording tool invoker for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::ToolInvoker;
use crate::error::{Error, Result};

/// Answers registered tools with fixed results and records every call.
#[derive(Default)]
pub struct MockTools {
    results: RwLock<HashMap<String, std::result::Result<Value, String>>>,
    calls: RwLock<Vec<(String, Map<String, Value>)>>,
}

impl MockTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, name: &str, result: Value) -> Self {
        self.results.write().insert(name.to_string(), Ok(result));
        self
    }

    pub fn with_failure(self, name: &str, message: &str) -> Self {
        self.results
            .write()
            .insert(name.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.read().clone()
    }
}

#[async_trait]
impl ToolInvoker for MockTools {
    async fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        let outcome = self.results.read().get(name).cloned();
        match outcome {
            None => Err(Error::tool_not_found(name)),
            Some(outcome) => {
                self.calls.write().push((name.to_string(), args));
                outcome.map_err(|message| Error::tool_call_failed(name, message))
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.results.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
