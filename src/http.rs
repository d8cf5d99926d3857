//! JSON-over-HTTP calls to model services, with timeout and backoff.
//!
//! Retry strategy, shared by the embedding and chat providers:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Network errors and timeouts → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! When retries run out the caller gets [`KbError::ServiceUnavailable`]
//! naming the service, the operation and the input that failed.

use serde_json::Value;
use std::time::Duration;

use crate::error::KbError;

pub(crate) struct JsonEndpoint {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
    service: &'static str,
    max_retries: u32,
}

impl JsonEndpoint {
    pub(crate) fn new(
        service: &'static str,
        url: String,
        bearer: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, KbError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| KbError::unavailable(service, "client setup", &url, e))?;
        Ok(Self {
            client,
            url,
            bearer,
            service,
            max_retries,
        })
    }

    pub(crate) fn service(&self) -> &'static str {
        self.service
    }

    /// POST `body` and return the parsed JSON response.
    pub(crate) async fn post(
        &self,
        operation: &str,
        input: &str,
        body: &Value,
    ) -> Result<Value, KbError> {
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(
                    service = self.service,
                    operation,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(token) = &self.bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            KbError::InvalidResponse {
                                service: self.service.to_string(),
                                reason: e.to_string(),
                            }
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("HTTP {}: {}", status, body_text));
                        continue;
                    }

                    return Err(KbError::InvalidResponse {
                        service: self.service.to_string(),
                        reason: format!("HTTP {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    let kind = if e.is_timeout() { "timeout" } else { "connection error" };
                    last_err = Some(format!("{} ({}): {}", kind, self.url, e));
                    continue;
                }
            }
        }

        Err(KbError::unavailable(
            self.service,
            operation,
            input,
            last_err.unwrap_or_else(|| "failed after retries".to_string()),
        ))
    }
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("http://localhost:11434/", "/api/embed"),
            "http://localhost:11434/api/embed"
        );
        assert_eq!(
            join_url("https://api.openai.com", "v1/embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let endpoint =
            JsonEndpoint::new("ollama", "http://127.0.0.1:9/api/embed".into(), None, 2, 0)
                .unwrap();
        let err = endpoint
            .post("embed", "hello", &serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            KbError::ServiceUnavailable {
                service,
                operation,
                input,
                ..
            } => {
                assert_eq!(service, "ollama");
                assert_eq!(operation, "embed");
                assert_eq!(input, "hello");
            }
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
    }
}
