use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::config::RateLimitConfig;

/// Call timestamps inside the active window.
#[derive(Debug)]
struct RateWindow {
    calls: VecDeque<Instant>,
}

impl RateWindow {
    fn evict_expired(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// At most `max_calls` grants in any interval of length `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            state: Mutex::new(RateWindow {
                calls: VecDeque::with_capacity(max_calls as usize),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, config.window())
    }

    /// Check-and-record in one critical section.
    ///
    /// Returns `Duration::ZERO` when the call is granted (and recorded);
    /// otherwise the time until the oldest recorded call leaves the window.
    /// Nothing is recorded for a refused call.
    pub fn acquire(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.evict_expired(now, self.window);

        if state.calls.len() < self.max_calls as usize {
            state.calls.push_back(now);
            return Duration::ZERO;
        }

        match state.calls.front() {
            Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
            None => Duration::ZERO,
        }
    }

    /// Wait until a call is granted. Returns the total time spent waiting.
    pub async fn acquire_slot(&self) -> Duration {
        let start = Instant::now();
        loop {
            let wait = self.acquire();
            if wait.is_zero() {
                return start.elapsed();
            }
            log::debug!("Rate limit window full, waiting {}ms", wait.as_millis());
            sleep(wait).await;
        }
    }

    /// Calls still available in the current window.
    pub fn remaining(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.evict_expired(Instant::now(), self.window);
        self.max_calls.saturating_sub(state.calls.len() as u32)
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_grants_up_to_limit_then_waits() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));

        for _ in 0..3 {
            assert_eq!(limiter.acquire(), Duration::ZERO);
        }
        assert_eq!(limiter.remaining(), 0);

        let wait = limiter.acquire();
        assert_eq!(wait, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(limiter.acquire(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));

        assert!(limiter.acquire().is_zero());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.acquire().is_zero());
        assert!(!limiter.acquire().is_zero());

        // first call expires at t=10, second still counts until t=16
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.acquire().is_zero());
        assert_eq!(limiter.acquire(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_call_is_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        assert!(limiter.acquire().is_zero());

        for _ in 0..10 {
            assert!(!limiter.acquire().is_zero());
        }

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(limiter.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_slot_sleeps_until_granted() {
        let limiter = RateLimiter::new(1, Duration::from_secs(3));
        assert_eq!(limiter.acquire_slot().await, Duration::ZERO);

        let waited = limiter.acquire_slot().await;
        assert!(waited >= Duration::from_secs(3));
        assert!(waited < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_window() {
        let max_calls = 4;
        let window = Duration::from_secs(2);
        let limiter = Arc::new(RateLimiter::new(max_calls, window));

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire_slot().await;
                    Instant::now()
                })
            })
            .collect();

        let mut grants: Vec<Instant> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        grants.sort();

        for (i, start) in grants.iter().enumerate() {
            let in_window = grants[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(
                in_window <= max_calls as usize,
                "{in_window} grants inside one window starting at grant {i}"
            );
        }
    }
}
