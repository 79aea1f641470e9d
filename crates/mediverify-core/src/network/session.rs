use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::transport::{ApiRequest, ApiResponse, Transport, TransportError, TransportResult};

/// Server-side statuses worth retrying. Client errors are final.
pub const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_FACTOR: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first try.
    pub max_attempts: u32,
    /// Sleep between attempts is `backoff_factor * 2^(n-1)` seconds.
    pub backoff_factor: f64,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_statuses: RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_factor: 0.0,
            retry_statuses: Vec::new(),
        }
    }

    pub fn with_attempts(max_attempts: u32, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            backoff_factor,
            retry_statuses: RETRY_STATUSES.to_vec(),
        }
    }

    fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    fn backoff(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1);
        Duration::from_secs_f64(self.backoff_factor * f64::from(2_u32.pow(exponent)))
    }
}

/// A transport paired with a retry policy.
///
/// Retries apply only to the listed server-side statuses and to
/// connection-level failures. Timeouts and other statuses are returned
/// immediately; a retryable status on the final attempt is returned as the
/// response so the caller can report the real status code.
pub struct HttpSession {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl HttpSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::none(),
        }
    }

    pub fn with_retries(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn execute(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_connect_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
            }

            match self.transport.execute(request.clone()).await {
                Ok(response)
                    if attempt < attempts && self.policy.is_retryable_status(response.status) =>
                {
                    warn!(
                        status = response.status,
                        attempt,
                        url = %request.url,
                        "retryable status, backing off"
                    );
                }
                Ok(response) => return Ok(response),
                Err(TransportError::Connect(detail)) if attempt < attempts => {
                    warn!(attempt, url = %request.url, "connection failed, backing off: {detail}");
                    last_connect_error = Some(detail);
                }
                Err(other) => return Err(other),
            }
        }

        Err(TransportError::Connect(last_connect_error.unwrap_or_else(
            || "connection retries exhausted".to_string(),
        )))
    }
}
