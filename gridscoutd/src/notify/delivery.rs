//! The outbound seam to the chat platform, and the retry policy every call
//! through it goes under.

use std::future::Future;
use std::time::Duration;
use async_trait::async_trait;
use rand::Rng;
use crate::config::NotifyConfig;

/// Connection error codes worth another attempt
const TRANSIENT_CODES: [&str; 6] = [
    "ECONNRESET",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "EAI_AGAIN",
    "UND_ERR_CONNECT_TIMEOUT",
    "UND_ERR_HEADERS_TIMEOUT",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("platform returned HTTP {0}")]
    Status(u16),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("{0}")]
    Rejected(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Status(status) => *status >= 500 || *status == 429 || *status == 408,
            DeliveryError::Connection(code) => TRANSIENT_CODES.contains(&code.as_str()),
            DeliveryError::Rejected(_) => false,
        }
    }
}

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn publish_to_channel(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError>;

    /// User id of the tenant's owner
    async fn fetch_owner(&self, tenant_id: &str) -> Result<String, DeliveryError>;

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Delivery that only writes to the log, for running without a bot token
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    async fn publish_to_channel(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        tracing::info!("[channel {}] {}", channel_id, text);
        Ok(())
    }

    async fn fetch_owner(&self, tenant_id: &str) -> Result<String, DeliveryError> {
        Ok(format!("owner:{}", tenant_id))
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        tracing::info!("[dm {}] {}", user_id, text);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            jitter_ms: 75,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay_ms: config.retry_base_delay_ms,
            jitter_ms: config.retry_jitter_ms,
        }
    }

    /// Backoff after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let base = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

/// Run `operation` until it succeeds, fails for good, or runs out of attempts
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && e.is_transient() => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    "{} failed on attempt {} ({}); retrying in {:?}",
                    operation_name,
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::warn!("{} failed after {} attempt(s): {}", operation_name, attempt, e);
                return Err(e);
            }
        }
    }
}
