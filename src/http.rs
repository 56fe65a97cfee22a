//! JSON POST with retry, shared by the embedding and language model
//! providers.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

/// Why a request ultimately failed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HttpFailure {
    /// Still rate limited after the last retry.
    RateLimited(String),
    /// 5xx or connection failure after the last retry.
    Unavailable(String),
    /// Non-retryable 4xx.
    Rejected(String),
    /// 2xx whose body was not JSON.
    Decode(String),
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpFailure::RateLimited(m)
            | HttpFailure::Unavailable(m)
            | HttpFailure::Rejected(m)
            | HttpFailure::Decode(m) => f.write_str(m),
        }
    }
}

pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value, HttpFailure> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            tracing::warn!(
                provider = label,
                attempt,
                delay_secs = delay.as_secs(),
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| HttpFailure::Decode(format!("{} response: {}", label, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = format!("{} API error {}: {}", label, status, body_text);

                // Rate limited or server error: retry
                if status.as_u16() == 429 {
                    last_err = Some(HttpFailure::RateLimited(message));
                    continue;
                }
                if status.is_server_error() {
                    last_err = Some(HttpFailure::Unavailable(message));
                    continue;
                }

                // Client error (not 429): no retry
                return Err(HttpFailure::Rejected(message));
            }
            Err(e) => {
                last_err = Some(HttpFailure::Unavailable(format!(
                    "{} connection error ({}): {}",
                    label, url, e
                )));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| HttpFailure::Unavailable(format!("{} failed after retries", label))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(6), Duration::from_secs(32));
        assert_eq!(backoff(9), Duration::from_secs(32));
    }
}
