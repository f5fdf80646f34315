//! Time source used by the limiter.

use async_trait::async_trait;
use tokio::time::Instant;

/// Clock and suspend capability consumed by [`RateLimiter`](super::RateLimiter).
///
/// `sleep_until` must be cancel-safe: dropping the returned future abandons the
/// wait without side effects.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Suspend the calling task until `deadline`.
    async fn sleep_until(&self, deadline: Instant);
}

/// Clock backed by the Tokio timer.
///
/// Under `tokio::time::pause` this clock becomes fully simulated, which is what
/// the limiter tests rely on.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}
