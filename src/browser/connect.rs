//! Connection establishment with region fallback and backoff.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::{BrowserConnector, RemoteBrowser};
use crate::error::{BrowserError, ExtractError, Result};

/// Retry parameters for one invocation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per endpoint candidate.
    pub attempts_per_endpoint: u32,
    /// Base delay; doubled per attempt.
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay.
    pub max_jitter: Duration,
    /// Cap for a single delay, jitter included.
    pub max_delay: Duration,
    /// Bound for a single connect call.
    pub attempt_timeout: Duration,
    /// Region tokens that can be swapped in the endpoint host.
    pub regions: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_endpoint: 2,
            base_delay: Duration::from_millis(800),
            max_jitter: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(20),
            regions: vec!["production-sfo".to_string(), "production-ams".to_string()],
        }
    }
}

/// How a failed connect attempt is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Transient,
    Fatal,
}

impl FailureClass {
    pub fn is_retriable(&self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "websocket",
    "handshake",
    "socket",
    "closed before",
    "connection reset",
    "connection refused",
    "econnreset",
    "econnrefused",
    "timed out",
    "timeout",
    "broken pipe",
    "unexpected eof",
];

/// Classify a connect failure by its message.
pub fn classify(err: &BrowserError) -> FailureClass {
    if matches!(err, BrowserError::Timeout { .. }) {
        return FailureClass::Transient;
    }
    let message = err.to_string().to_lowercase();
    if message.contains("429") || message.contains("too many requests") {
        FailureClass::RateLimited
    } else if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        FailureClass::Transient
    } else {
        FailureClass::Fatal
    }
}

/// Primary endpoint first, then the same address with its region token
/// swapped for each other known region. Duplicates are removed.
pub fn endpoint_candidates(primary: &str, regions: &[String]) -> Vec<String> {
    let mut candidates = vec![primary.to_string()];
    for region in regions.iter().filter(|r| !r.is_empty()) {
        if !primary.contains(region.as_str()) {
            continue;
        }
        for other in regions.iter().filter(|o| !o.is_empty() && *o != region) {
            let swapped = primary.replace(region.as_str(), other);
            if !candidates.contains(&swapped) {
                candidates.push(swapped);
            }
        }
    }
    candidates
}

/// Exponential backoff with uniform jitter, capped at `max_delay`.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base_ms = policy.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_cap = policy.max_jitter.as_millis() as u64;
    let jitter_ms = if jitter_cap > 0 {
        rand::thread_rng().gen_range(0..=jitter_cap)
    } else {
        0
    };
    Duration::from_millis(exp_ms.saturating_add(jitter_ms)).min(policy.max_delay)
}

/// Endpoint with its query string removed, for logging. Tokens ride in the query.
pub fn redact_endpoint(endpoint: &str) -> String {
    match url::Url::parse(endpoint) {
        Ok(mut url) => {
            if url.query().is_some() {
                url.set_query(Some("token=***"));
            }
            url.to_string()
        }
        Err(_) => endpoint.split('?').next().unwrap_or_default().to_string(),
    }
}

/// Connect to the first candidate that accepts, retrying transient failures.
pub async fn connect_with_retry(
    connector: &dyn BrowserConnector,
    primary: &str,
    policy: &RetryPolicy,
) -> Result<Box<dyn RemoteBrowser>> {
    let candidates = endpoint_candidates(primary, &policy.regions);
    let per_endpoint = policy.attempts_per_endpoint.max(1);
    let total = candidates.len() as u32 * per_endpoint;

    let mut attempts = 0u32;
    let mut last_error = String::from("no endpoint candidates");

    for endpoint in &candidates {
        let shown = redact_endpoint(endpoint);
        for attempt in 0..per_endpoint {
            attempts += 1;
            debug!(endpoint = %shown, attempt = attempts, "Connecting to remote browser");

            let outcome = match tokio::time::timeout(
                policy.attempt_timeout,
                connector.connect(endpoint),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(BrowserError::Timeout {
                    action: "connect".to_string(),
                    timeout_ms: policy.attempt_timeout.as_millis() as u64,
                }),
            };

            let err = match outcome {
                Ok(browser) => {
                    info!(endpoint = %shown, attempts, "Connected to remote browser");
                    return Ok(browser);
                }
                Err(e) => e,
            };

            let class = classify(&err);
            last_error = err.to_string();
            if !class.is_retriable() {
                warn!(endpoint = %shown, "Fatal connection error: {}", last_error);
                return Err(ExtractError::Browser(err));
            }

            if attempts < total {
                let delay = backoff_delay(attempt, policy);
                warn!(
                    endpoint = %shown,
                    class = ?class,
                    "Connect attempt {} failed ({}); retrying in {:?}",
                    attempts,
                    last_error,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(ExtractError::ConnectionExhausted {
        attempts,
        last_error,
    })
}
