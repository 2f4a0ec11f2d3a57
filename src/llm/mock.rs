//! Mock model for offline runs and testing
//!
//! Answers with a fixed reply when one is set, otherwise echoes the last
//! user message. Tests can queue a FIFO script of replies and errors that
//! is consumed first. Every request is recorded.

#[cfg(test)]
use std::collections::VecDeque;

use async_trait::async_trait;
#[cfg(test)]
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::trace;

use super::{ChatModel, ChatRequest, ChatResponse};
#[cfg(test)]
use crate::error::Error;
use crate::error::Result;

#[cfg(test)]
enum Scripted {
    Reply(ChatResponse),
    Fail(Error),
}

/// Scripted implementation of `ChatModel` for tests and offline runs
#[derive(Default)]
pub struct MockModel {
    #[cfg(test)]
    script: Mutex<VecDeque<Scripted>>,
    default_response: RwLock<Option<String>>,
    requests: RwLock<Vec<ChatRequest>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default_response(&self, reply: impl Into<String>) {
        *self.default_response.write() = Some(reply.into());
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().len()
    }
}

#[cfg(test)]
impl MockModel {
    /// Model whose every unscripted call answers `reply`.
    pub fn with_default_response(reply: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.set_default_response(reply);
        mock
    }

    /// Queue a reply for the next unanswered call.
    pub fn push_response(&self, reply: impl Into<String>) {
        self.script
            .lock()
            .push_back(Scripted::Reply(ChatResponse::text(reply)));
    }

    /// Queue a reply carrying citations.
    pub fn push_full_response(&self, response: ChatResponse) {
        self.script.lock().push_back(Scripted::Reply(response));
    }

    /// Queue a failure for the next unanswered call.
    pub fn push_error(&self, error: Error) {
        self.script.lock().push_back(Scripted::Fail(error));
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.read().clone()
    }

    pub fn reset(&self) {
        self.script.lock().clear();
        self.requests.write().clear();
    }
}

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let echo = request.last_user_message().unwrap_or_default().to_string();
        self.requests.write().push(request);
        trace!(calls = self.call_count(), "Mock model called");

        #[cfg(test)]
        if let Some(next) = self.script.lock().pop_front() {
            return match next {
                Scripted::Reply(response) => Ok(response),
                Scripted::Fail(error) => Err(error),
            };
        }

        if let Some(ref reply) = *self.default_response.read() {
            return Ok(ChatResponse::text(reply.clone()));
        }

        Ok(ChatResponse::text(echo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new(vec![Message::system("p"), Message::user(text)], 0.3)
    }

    #[tokio::test]
    async fn test_script_then_echo() {
        let mock = MockModel::new();
        mock.push_response("first");
        mock.push_error(Error::model_call_failed("mock", Some(500), "boom"));

        assert_eq!(mock.complete(request("a")).await.unwrap().text, "first");
        assert!(mock.complete(request("b")).await.is_err());
        assert_eq!(mock.complete(request("c")).await.unwrap().text, "c");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_default_response() {
        let mock = MockModel::with_default_response("fixed");
        assert_eq!(mock.complete(request("x")).await.unwrap().text, "fixed");
        assert_eq!(mock.complete(request("y")).await.unwrap().text, "fixed");
    }

    #[tokio::test]
    async fn test_records_requests() {
        let mock = MockModel::new();
        mock.complete(request("hello").with_web_search(true)).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].web_search);
        assert_eq!(requests[0].last_user_message(), Some("hello"));

        mock.reset();
        assert_eq!(mock.call_count(), 0);
    }
}
