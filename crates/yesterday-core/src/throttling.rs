use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use serde::Serialize;

use crate::UtcDateTime;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Denied { retry_after: Duration },
}

impl Acquire {
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// How the call budget is replenished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitStrategy {
    /// `limit` calls per window, counted against the caller-supplied clock.
    #[default]
    FixedWindow,
    /// GCRA token bucket on the process clock (burst = `limit`).
    TokenBucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub limit: u32,
    pub strategy: RateLimitStrategy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            limit: 30,
            strategy: RateLimitStrategy::FixedWindow,
        }
    }
}

/// Current fixed-window counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateWindow {
    pub window_start: Option<UtcDateTime>,
    pub count: u32,
    pub limit: u32,
}

impl RateWindow {
    pub const fn remaining(self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

enum Strategy {
    FixedWindow(Mutex<RateWindow>),
    TokenBucket {
        limiter: Mutex<DirectRateLimiter>,
        clock: DefaultClock,
    },
}

/// Bounds outbound calls to the upstream provider.
///
/// Denials are never retried here; the caller decides what to surface.
pub struct RateLimiter {
    config: RateLimitConfig,
    strategy: Strategy,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let limit = config.limit.max(1);
        let config = RateLimitConfig { limit, ..config };
        let strategy = match config.strategy {
            RateLimitStrategy::FixedWindow => Strategy::FixedWindow(Mutex::new(RateWindow {
                window_start: None,
                count: 0,
                limit,
            })),
            RateLimitStrategy::TokenBucket => Strategy::TokenBucket {
                limiter: Mutex::new(token_bucket(config)),
                clock: DefaultClock::default(),
            },
        };
        Self { config, strategy }
    }

    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Takes one call slot if available. A fixed window that `now` has moved
    /// past is reset before the request is counted.
    pub fn try_acquire(&self, now: UtcDateTime) -> Acquire {
        match &self.strategy {
            Strategy::FixedWindow(window) => {
                let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
                let start = self.current_window_start(&window, now);
                if start != window.window_start {
                    window.window_start = start;
                    window.count = 0;
                }

                if window.count < window.limit {
                    window.count += 1;
                    return Acquire::Granted;
                }

                let window_end = start.unwrap_or(now).plus(self.config.window);
                Acquire::Denied {
                    retry_after: window_end.saturating_since(now),
                }
            }
            Strategy::TokenBucket { limiter, clock } => match limiter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .check()
            {
                Ok(()) => Acquire::Granted,
                Err(not_until) => Acquire::Denied {
                    retry_after: not_until.wait_time_from(clock.now()),
                },
            },
        }
    }

    /// Calls still available in the current window without consuming one.
    pub fn remaining(&self, now: UtcDateTime) -> u32 {
        match &self.strategy {
            Strategy::FixedWindow(window) => {
                let window = window.lock().unwrap_or_else(PoisonError::into_inner);
                if self.current_window_start(&window, now) == window.window_start {
                    window.remaining()
                } else {
                    window.limit
                }
            }
            Strategy::TokenBucket { .. } => self.config.limit,
        }
    }

    pub fn snapshot(&self) -> Option<RateWindow> {
        match &self.strategy {
            Strategy::FixedWindow(window) => {
                Some(*window.lock().unwrap_or_else(PoisonError::into_inner))
            }
            Strategy::TokenBucket { .. } => None,
        }
    }

    /// Forgets all consumed quota.
    pub fn reset(&self) {
        match &self.strategy {
            Strategy::FixedWindow(window) => {
                let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
                window.window_start = None;
                window.count = 0;
            }
            Strategy::TokenBucket { limiter, .. } => {
                *limiter.lock().unwrap_or_else(PoisonError::into_inner) = token_bucket(self.config);
            }
        }
    }

    /// A `now` earlier than the window start still belongs to that window.
    /// Callers capture `now` independently, so timestamps can arrive out of
    /// order.
    fn current_window_start(&self, window: &RateWindow, now: UtcDateTime) -> Option<UtcDateTime> {
        match window.window_start {
            Some(start) if now.saturating_since(start) < self.config.window => Some(start),
            _ => Some(now),
        }
    }
}

fn token_bucket(config: RateLimitConfig) -> DirectRateLimiter {
    governor::RateLimiter::direct(quota_from_window(config.window, config.limit))
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit.max(1)).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
