//! Shared HTTP transport for the hosted model providers.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Maximum number of body characters carried in an error detail.
const DETAIL_CHARS: usize = 200;

/// JSON-over-HTTP POST with retry on transient failures.
///
/// Retries 429, 5xx, timeouts and connect errors up to `max_retries` extra
/// attempts, backing off 500 ms * 2^(attempt-1). Other non-2xx statuses fail
/// immediately.
pub struct HttpTransport {
    client: Client,
    provider: &'static str,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(provider: &'static str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(timeout_secs));
        if cfg!(test) {
            // Stub servers listen on loopback; host proxy settings must not apply
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            timeout_secs,
            max_retries,
        })
    }

    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value> {
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                debug!(provider = self.provider, attempt, ?backoff, "Retrying after error");
                tokio::time::sleep(backoff).await;
            }

            let mut req = self.client.post(url).json(body);
            for (name, value) in headers {
                req = req.header(*name, value);
            }

            let error = match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            Error::model_response(
                                self.provider,
                                format!("Failed to parse response body: {}", e),
                            )
                        });
                    }

                    let body = response.text().await.unwrap_or_default();
                    Error::model_call_failed(
                        self.provider,
                        Some(status.as_u16()),
                        truncate_detail(&body),
                    )
                }
                Err(e) if e.is_timeout() => Error::ModelTimeout {
                    provider: self.provider.to_string(),
                    timeout_secs: self.timeout_secs,
                },
                Err(e) if e.is_connect() => Error::model_call_failed(
                    self.provider,
                    None,
                    format!("Connection error: {}", e),
                ),
                Err(e) => {
                    return Err(Error::model_call_failed(
                        self.provider,
                        None,
                        format!("Request error: {}", e),
                    ));
                }
            };

            if !error.is_retryable() {
                return Err(error);
            }
            warn!(provider = self.provider, attempt, error = %error, "Retryable model call failure");
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            Error::model_call_failed(self.provider, None, "All retry attempts exhausted")
        }))
    }
}

fn truncate_detail(body: &str) -> String {
    body.trim().chars().take(DETAIL_CHARS).collect()
}
