//! Token-bucket admission control shared by every outbound call.

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use metrics::counter;
use tracing::debug;

use crate::cancel::CancelToken;

/// Result of waiting for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    Cancelled,
}

impl Admission {
    pub fn is_granted(self) -> bool {
        matches!(self, Admission::Granted)
    }
}

/// One bucket for the whole process: polls and broadcasts draw from the same
/// budget.
pub struct TxRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl TxRateLimiter {
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Waits for a token, or returns `Cancelled` as soon as `cancel` fires.
    /// `stage` only labels the metric.
    pub async fn acquire(&self, cancel: &CancelToken, stage: &'static str) -> Admission {
        if cancel.is_cancelled() {
            counter!("sniper_rate_limit_cancelled_total", "stage" => stage).increment(1);
            return Admission::Cancelled;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(stage, "rate limiter wait cancelled");
                counter!("sniper_rate_limit_cancelled_total", "stage" => stage).increment(1);
                Admission::Cancelled
            }
            _ = self.limiter.until_ready() => Admission::Granted,
        }
    }
}

impl std::fmt::Debug for TxRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxRateLimiter").finish_non_exhaustive()
    }
}
