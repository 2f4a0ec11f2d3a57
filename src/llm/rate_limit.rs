//! Client-side sliding-window rate limiting for model calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{ChatModel, ChatRequest, ChatResponse};
use crate::error::Result;

/// At most `max_calls` acquisitions within any `window`.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_minute(max_calls: u32) -> Self {
        Self::new(max_calls as usize, Duration::from_secs(60))
    }

    /// Record a call now if the window has room, otherwise return how long to wait.
    fn try_acquire(&self, now: Instant) -> Option<Duration> {
        let mut calls = self.calls.lock();

        while let Some(&oldest) = calls.front() {
            if now.duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() < self.max_calls {
            calls.push_back(now);
            return None;
        }

        calls
            .front()
            .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Wait until a call is allowed, then record it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.try_acquire(Instant::now()) {
            debug!(?wait, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls recorded in the current window.
    #[cfg(test)]
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        self.calls
            .lock()
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }
}

/// A model whose calls pass through a `RateLimiter` first.
pub struct RateLimited {
    inner: Arc<dyn ChatModel>,
    limiter: RateLimiter,
}

impl RateLimited {
    pub fn new(inner: Arc<dyn ChatModel>, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl ChatModel for RateLimited {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.limiter.acquire().await;
        self.inner.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, MockModel};

    #[test]
    fn test_window_fills_then_blocks() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.try_acquire(start).is_none());
        assert!(limiter.try_acquire(start).is_none());

        let wait = limiter.try_acquire(start + Duration::from_secs(10)).unwrap();
        assert_eq!(wait, Duration::from_secs(50));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.try_acquire(start).is_none());
        assert!(limiter.try_acquire(start + Duration::from_secs(30)).is_some());
        assert!(limiter.try_acquire(start + Duration::from_secs(60)).is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_model_delegates() {
        let mock = Arc::new(MockModel::with_default_response("ok"));
        let model = RateLimited::new(mock.clone(), RateLimiter::per_minute(10));

        let response = model
            .complete(ChatRequest::new(vec![Message::user("hi")], 0.2))
            .await
            .unwrap();

        assert_eq!(response.text, "ok");
        assert_eq!(model.name(), "mock");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(model.limiter.in_window(), 1);
    }
}
