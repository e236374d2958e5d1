//! Request pacing for the Elements API
//!
//! Every lookup and update waits on a [`Throttle`] first. Production uses a
//! governor rate limiter allowing one call per interval.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::time::Duration;
use tracing::debug;

/// Paces successive API calls
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Wait until the next call is allowed
    async fn wait(&self);
}

/// One call per `interval`, no bursts
pub struct IntervalThrottle {
    limiter: DefaultDirectRateLimiter,
    interval: Duration,
}

impl IntervalThrottle {
    /// Returns `None` for a zero interval; use [`NoThrottle`] instead
    pub fn new(interval: Duration) -> Option<Self> {
        let quota = Quota::with_period(interval)?;
        Some(Self {
            limiter: RateLimiter::direct(quota),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Throttle for IntervalThrottle {
    async fn wait(&self) {
        if self.limiter.check().is_err() {
            debug!("Rate limiting: waiting up to {:?}", self.interval);
            self.limiter.until_ready().await;
        }
    }
}

/// No pacing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoThrottle;

#[async_trait]
impl Throttle for NoThrottle {
    async fn wait(&self) {}
}

/// Build the throttle for a configured interval in milliseconds
pub fn from_millis(interval_ms: u64) -> Box<dyn Throttle> {
    match IntervalThrottle::new(Duration::from_millis(interval_ms)) {
        Some(throttle) => Box::new(throttle),
        None => Box::new(NoThrottle),
    }
}
