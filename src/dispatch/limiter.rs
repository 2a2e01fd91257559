//! Outbound rate limiting.

use std::time::Duration;

use async_trait::async_trait;

/// Paces sends. `wait` is called after each confirmed send.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn wait(&self);
}

/// Constant pause between messages.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl RateLimiter for FixedInterval {
    async fn wait(&self) {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }
}
