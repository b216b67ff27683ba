use crate::domain::ports::RateLimitSpec;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Sliding-window rate limiter. A call that would exceed the window's
/// request cap fails fast instead of queuing.
pub struct SlidingWindowRateLimiter {
    spec: RateLimitSpec,
    calls: Mutex<VecDeque<i64>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(spec: RateLimitSpec) -> Self {
        Self {
            spec,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Records the call if the window has capacity. On rejection returns
    /// the number of milliseconds until a slot frees up.
    pub fn try_acquire(&self, now_millis: i64) -> Result<(), u64> {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());

        let window_start = now_millis - self.spec.window_ms as i64;
        while let Some(&front) = calls.front() {
            if front <= window_start {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.spec.max_requests as usize {
            let oldest = calls.front().copied().unwrap_or(now_millis);
            let retry_after = (oldest + self.spec.window_ms as i64 - now_millis).max(0) as u64;
            return Err(retry_after);
        }

        calls.push_back(now_millis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_ms: u64) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(RateLimitSpec {
            max_requests,
            window_ms,
        })
    }

    #[test]
    fn test_fails_fast_at_cap() {
        let limiter = limiter(2, 1_000);
        let t0 = 1_700_000_000_000;

        assert!(limiter.try_acquire(t0).is_ok());
        assert!(limiter.try_acquire(t0 + 10).is_ok());

        let retry_after = limiter.try_acquire(t0 + 20).unwrap_err();
        assert_eq!(retry_after, 980);
    }

    #[test]
    fn test_window_elapse_resets_capacity() {
        let limiter = limiter(1, 1_000);
        let t0 = 1_700_000_000_000;

        assert!(limiter.try_acquire(t0).is_ok());
        assert!(limiter.try_acquire(t0 + 500).is_err());
        // Window has slid past the first call.
        assert!(limiter.try_acquire(t0 + 1_001).is_ok());
    }
}
