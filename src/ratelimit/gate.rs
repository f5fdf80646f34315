//! Admission gate trait for abstracting over limiter implementations.

use async_trait::async_trait;
use std::sync::Arc;

use super::clock::Clock;
use super::limiter::{Permit, RateLimiter};

/// Trait for anything that hands out permits for a gated action.
///
/// This lets the document client work with the sliding-window `RateLimiter`
/// as well as with test doubles.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Wait for a permit.
    async fn acquire(&self) -> Permit;

    /// Take a permit only if one is available right now.
    fn try_acquire(&self) -> Option<Permit>;
}

#[async_trait]
impl<C: Clock> AdmissionGate for RateLimiter<C> {
    async fn acquire(&self) -> Permit {
        RateLimiter::acquire(self).await
    }

    fn try_acquire(&self) -> Option<Permit> {
        RateLimiter::try_acquire(self)
    }
}

#[async_trait]
impl<G: AdmissionGate + ?Sized> AdmissionGate for Arc<G> {
    async fn acquire(&self) -> Permit {
        (**self).acquire().await
    }

    fn try_acquire(&self) -> Option<Permit> {
        (**self).try_acquire()
    }
}
