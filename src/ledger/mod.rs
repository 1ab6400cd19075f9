//! Spreadsheet ledger client.
//!
//! The ledger is a remote workbook reached over the Sheets v4 and Drive v3
//! REST APIs via reqwest. It is the durable, authoritative store; everything
//! local (SQLite mirror, caches) can be rebuilt from it. The provider rate
//! limits aggressively, so every request goes through `send_with_retry`.
//!
//! Modules:
//! - client: the `LedgerBackend` trait and the Sheets-backed implementation
//! - decode: cell-string encoding and decoding for ledger rows
//! - memory: in-process backend for tests

pub mod client;
pub mod decode;
pub mod memory;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Rate limited by the ledger provider")]
    RateLimited,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LedgerError::RateLimited)
    }

    /// Whether a fresh attempt could plausibly succeed. Rate limits and
    /// transient server or transport failures qualify; auth and not-found
    /// do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::RateLimited => true,
            LedgerError::Http(e) => e.is_timeout() || e.is_connect(),
            LedgerError::Api { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }
}

/// Backoff schedule for ledger requests.
///
/// Defaults follow the provider's guidance for per-minute quotas: start at
/// one second and double, capped where a third retry still fits inside a
/// typical quota window.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: reqwest::StatusCode) -> RetryDecision {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying on rate limits, server errors, and transport
/// failures per the policy. The final response (or error) is returned as-is;
/// callers still map non-2xx statuses themselves.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, LedgerError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(LedgerError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                let decision = retry_decision_for_status(status);
                if decision == RetryDecision::Retryable && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "ledger retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "ledger retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(LedgerError::Http(err));
            }
        }
    }

    Err(LedgerError::Api {
        status: 0,
        message: "request exhausted retries".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_decision_rate_limit_and_server_errors() {
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::REQUEST_TIMEOUT),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::SERVICE_UNAVAILABLE),
            RetryDecision::Retryable
        );
    }

    #[test]
    fn test_retry_decision_client_errors_not_retried() {
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::BAD_REQUEST),
            RetryDecision::NonRetryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::UNAUTHORIZED),
            RetryDecision::NonRetryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::NOT_FOUND),
            RetryDecision::NonRetryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::OK),
            RetryDecision::NonRetryable
        );
    }

    #[test]
    fn test_retry_delay_grows_exponentially() {
        let policy = RetryPolicy::default();
        let first = retry_delay(1, &policy, None).as_millis() as u64;
        let second = retry_delay(2, &policy, None).as_millis() as u64;
        let third = retry_delay(3, &policy, None).as_millis() as u64;
        // Jitter adds up to 150ms on top of the base
        assert!((1_000..1_150).contains(&first), "first = {first}");
        assert!((2_000..2_150).contains(&second), "second = {second}");
        assert!((4_000..4_150).contains(&third), "third = {third}");
    }

    #[test]
    fn test_retry_delay_capped_at_max() {
        let policy = RetryPolicy::default();
        let late = retry_delay(10, &policy, None).as_millis() as u64;
        assert!(late < policy.max_backoff_ms + 150);
    }

    #[test]
    fn test_retry_delay_honors_retry_after_header() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("2");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_retry_after_header_clamped() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("3600");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_unparsable_retry_after_falls_back_to_backoff() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT");
        let delay = retry_delay(1, &policy, Some(&header)).as_millis() as u64;
        assert!((1_000..1_150).contains(&delay));
    }

    #[test]
    fn test_error_classification() {
        assert!(LedgerError::RateLimited.is_rate_limited());
        assert!(LedgerError::RateLimited.is_retryable());
        assert!(LedgerError::Api {
            status: 503,
            message: "backend".to_string()
        }
        .is_retryable());
        assert!(!LedgerError::AuthExpired.is_retryable());
        assert!(!LedgerError::NotFound("Master Sheet".to_string()).is_retryable());
        assert!(!LedgerError::Api {
            status: 400,
            message: "bad".to_string()
        }
        .is_retryable());
    }
}
