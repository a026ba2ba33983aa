//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max inbound WebSocket messages per second per connection (twice the tick rate)
pub const ACTION_RATE_LIMIT: u32 = 120;

/// Per-connection inbound message limiter
#[derive(Clone)]
pub struct ActionRateLimiter {
    limiter: Arc<Limiter>,
}

impl ActionRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(ACTION_RATE_LIMIT)
    }

    pub fn with_rate(per_second: u32) -> Self {
        Self {
            limiter: create_limiter(per_second),
        }
    }

    /// Returns true if the message is allowed
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for ActionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
