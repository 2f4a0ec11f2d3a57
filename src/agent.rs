//! Persona invocation, dispatched on the persona's capability.
//!
//! `text` personas make one model call, `search` personas make one call with
//! live web search, and `tools` personas run a bounded tool-calling loop.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::SideContext;
use crate::error::{Error, Result};
use crate::llm::{ChatModel, ChatRequest, ChatResponse, Message};
use crate::persona::{Capability, Persona};
use crate::tools::{extract_tool_text, prepare_args, ToolCall, ToolInvoker};

/// Reply when the tool loop runs out of steps without a final answer.
pub const TOO_MANY_STEPS: &str =
    "⚠️ Stopped after too many tool steps without reaching a final answer. Try a narrower question.";

pub struct Invoker {
    model: Arc<dyn ChatModel>,
    tools: Option<Arc<dyn ToolInvoker>>,
    document_char_budget: usize,
    max_tool_steps: usize,
}

impl Invoker {
    pub fn new(model: Arc<dyn ChatModel>, document_char_budget: usize, max_tool_steps: usize) -> Self {
        Self {
            model,
            tools: None,
            document_char_budget,
            max_tool_steps,
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    /// Preamble first, then the context block (if any), then `messages`.
    pub fn build_messages(
        &self,
        persona: &Persona,
        messages: Vec<Message>,
        context: &SideContext,
    ) -> Vec<Message> {
        let mut full = Vec::with_capacity(messages.len() + 2);
        full.push(Message::system(persona.preamble.clone()));
        if let Some(block) = context.render(self.document_char_budget) {
            full.push(Message::user(block));
        }
        full.extend(messages);
        full
    }

    pub async fn invoke(
        &self,
        persona: &Persona,
        messages: Vec<Message>,
        context: &SideContext,
    ) -> Result<ChatResponse> {
        let messages = self.build_messages(persona, messages, context);
        debug!(
            persona = %persona.name,
            capability = %persona.capability,
            messages = messages.len(),
            "Invoking persona"
        );

        match persona.capability {
            Capability::Text => {
                self.model
                    .complete(ChatRequest::new(messages, persona.temperature))
                    .await
            }
            Capability::Search => {
                let response = self
                    .model
                    .complete(ChatRequest::new(messages, persona.temperature).with_web_search(true))
                    .await?;
                debug!(persona = %persona.name, citations = response.citations.len(), "Search answer received");
                Ok(response)
            }
            Capability::Tools => self.tool_loop(persona, messages).await,
        }
    }

    /// Call the model until it answers without a tool call, at most `max_tool_steps` times.
    async fn tool_loop(&self, persona: &Persona, mut messages: Vec<Message>) -> Result<ChatResponse> {
        for step in 1..=self.max_tool_steps {
            let response = self
                .model
                .complete(ChatRequest::new(messages.clone(), persona.temperature))
                .await?;

            let Some(call) = ToolCall::from_response(&response.text) else {
                debug!(persona = %persona.name, step, "Final answer from tool loop");
                return Ok(response);
            };

            info!(persona = %persona.name, step, tool = %call.name, "Model requested tool");
            let output = self.run_tool(&call).await?;

            messages.push(Message::assistant(response.text));
            messages.push(Message::user(format!(
                "Tool `{}` result:\n{}",
                call.name, output
            )));
        }

        warn!(persona = %persona.name, max_steps = self.max_tool_steps, "Tool loop hit step limit");
        Ok(ChatResponse::text(TOO_MANY_STEPS))
    }

    async fn run_tool(&self, call: &ToolCall) -> Result<String> {
        let tools = self
            .tools
            .as_ref()
            .ok_or_else(|| Error::tool_not_found(&call.name))?;

        let args = prepare_args(&call.name, &call.args)?;
        let result = tools.call(&call.name, args).await?;
        Ok(extract_tool_text(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Citation, MockModel, Role};
    use crate::persona::PersonaRegistry;
    use crate::tools::mock::MockTools;
    use serde_json::json;

    fn persona(name: &str) -> Arc<Persona> {
        PersonaRegistry::bundled().unwrap().get(name).unwrap()
    }

    #[tokio::test]
    async fn test_text_persona_single_call() {
        let mock = Arc::new(MockModel::with_default_response("译文"));
        let invoker = Invoker::new(mock.clone(), 1000, 5);
        let translator = persona("翻译专家");

        let response = invoker
            .invoke(&translator, vec![Message::user("Hello")], &SideContext::new())
            .await
            .unwrap();

        assert_eq!(response.text, "译文");
        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0], Message::system(translator.preamble.clone()));
        assert_eq!(requests[0].messages.len(), 2);
        assert!((requests[0].temperature - translator.temperature).abs() < f32::EPSILON);
        assert!(!requests[0].web_search);
    }

    #[tokio::test]
    async fn test_context_block_is_second_message() {
        let mock = Arc::new(MockModel::new());
        let invoker = Invoker::new(mock.clone(), 1000, 5);
        let context = SideContext::new().with_document(Some("季度报告"));

        invoker
            .invoke(&persona("文档分析师"), vec![Message::user("总结")], &context)
            .await
            .unwrap();

        let messages = &mock.requests()[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("季度报告"));
        assert_eq!(messages[2].content, "总结");
    }

    #[tokio::test]
    async fn test_search_persona_enables_web_search() {
        let mock = Arc::new(MockModel::new());
        mock.push_full_response(ChatResponse {
            text: "情报".into(),
            citations: vec![Citation {
                title: "T".into(),
                url: "https://t.example".into(),
            }],
        });
        let invoker = Invoker::new(mock.clone(), 1000, 5);

        let response = invoker
            .invoke(&persona("天眼"), vec![Message::user("竞品动态")], &SideContext::new())
            .await
            .unwrap();

        assert!(mock.requests()[0].web_search);
        assert_eq!(response.citations.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_result_back() {
        let mock = Arc::new(MockModel::new());
        mock.push_response(r#"{"tool": "stock_info", "args": {"symbol": "000001.SZ"}}"#);
        mock.push_response("平安银行最新价 10.5 元");

        let tools = Arc::new(MockTools::new().with_result(
            "stock_info",
            json!({"content": [{"type": "text", "text": "price=10.5"}]}),
        ));
        let invoker = Invoker::new(mock.clone(), 1000, 5).with_tools(tools.clone());

        let response = invoker
            .invoke(&persona("行情助手"), vec![Message::user("平安银行股价")], &SideContext::new())
            .await
            .unwrap();

        assert_eq!(response.text, "平安银行最新价 10.5 元");

        let calls = tools.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["symbol"], json!("000001"));
        assert_eq!(calls[0].1["market"], json!("A"));

        let second = &mock.requests()[1].messages;
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "Tool `stock_info` result:\nprice=10.5");
        assert_eq!(second[second.len() - 2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_tool_loop_terminates_at_step_limit() {
        let mock = Arc::new(MockModel::with_default_response(
            r#"{"tool": "search", "args": {"keyword": "平安"}}"#,
        ));
        let tools = Arc::new(MockTools::new().with_result("search", json!("hit")));
        let invoker = Invoker::new(mock.clone(), 1000, 5).with_tools(tools.clone());

        let response = invoker
            .invoke(&persona("行情助手"), vec![Message::user("找平安")], &SideContext::new())
            .await
            .unwrap();

        assert_eq!(response.text, TOO_MANY_STEPS);
        assert_eq!(mock.call_count(), 5);
        assert_eq!(tools.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let mock = Arc::new(MockModel::with_default_response(r#"{"tool": "teleport"}"#));
        let invoker =
            Invoker::new(mock.clone(), 1000, 5).with_tools(Arc::new(MockTools::new()));

        let err = invoker
            .invoke(&persona("行情助手"), vec![Message::user("x")], &SideContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ToolNotFound { .. }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_stops_loop() {
        let mock = Arc::new(MockModel::with_default_response(
            r#"{"tool": "stock_news", "args": {"symbol": "600000"}}"#,
        ));
        let tools = Arc::new(MockTools::new().with_failure("stock_news", "upstream down"));
        let invoker = Invoker::new(mock.clone(), 1000, 5).with_tools(tools);

        let err = invoker
            .invoke(&persona("行情助手"), vec![Message::user("新闻")], &SideContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ToolCallFailed { .. }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_tool_args_fail() {
        let mock = Arc::new(MockModel::with_default_response(r#"{"tool": "stock_news"}"#));
        let tools = Arc::new(MockTools::new().with_result("stock_news", json!("n")));
        let invoker = Invoker::new(mock, 1000, 5).with_tools(tools.clone());

        let err = invoker
            .invoke(&persona("行情助手"), vec![Message::user("新闻")], &SideContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ToolArgs { .. }));
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_without_invoker() {
        let mock = Arc::new(MockModel::with_default_response(r#"{"tool": "stock_info"}"#));
        let invoker = Invoker::new(mock, 1000, 5);

        let err = invoker
            .invoke(&persona("行情助手"), vec![Message::user("x")], &SideContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_text_persona_ignores_tool_json() {
        let mock = Arc::new(MockModel::with_default_response(r#"{"tool": "stock_info"}"#));
        let invoker = Invoker::new(mock.clone(), 1000, 5);

        let response = invoker
            .invoke(&persona("数据专家"), vec![Message::user("x")], &SideContext::new())
            .await
            .unwrap();
        assert_eq!(response.text, r#"{"tool": "stock_info"}"#);
        assert_eq!(mock.call_count(), 1);
    }
}
