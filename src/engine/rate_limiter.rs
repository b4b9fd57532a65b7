use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::errors::PilotError;

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket bounding outbound tool calls for one scan.
///
/// Replenishes one permit every `1 / rate` seconds and holds at most
/// `max(1, floor(rate))` permits, so fractional rates like `0.5` work.
/// A pool hands the same instance to every worker.
pub struct RateLimiter {
    limiter: DirectLimiter,
    rate: f64,
    issued: AtomicU64,
}

impl RateLimiter {
    pub fn new(rate: f64) -> Result<Self, PilotError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PilotError::Config(format!("rate limit must be positive, got {}", rate)));
        }
        let period = Duration::try_from_secs_f64(1.0 / rate)
            .map_err(|_| PilotError::Config(format!("rate limit {} is too low", rate)))?;
        let burst = NonZeroU32::new(rate.floor().min(u32::MAX as f64) as u32).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .ok_or_else(|| PilotError::Config(format!("rate limit {} is too high", rate)))?
            .allow_burst(burst);
        debug!(rate, burst = burst.get(), "Rate limiter created");
        Ok(Self {
            limiter: GovernorRateLimiter::direct(quota),
            rate,
            issued: AtomicU64::new(0),
        })
    }

    /// Wait for one permit. Returns `Cancelled` if the token fires first;
    /// a cancelled wait does not consume a permit.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), PilotError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PilotError::Cancelled("rate limiter wait".into())),
            _ = self.limiter.until_ready() => {
                self.issued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Permits granted so far, across every holder of this limiter.
    pub fn requests_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}
