//! Client-side rate limiting for model calls
//!
//! The provider enforces a requests-per-minute ceiling on its side; we stay
//! under it with a token bucket so a run never trips provider throttling.
//! The agent loop suspends on [`RateLimiter::acquire`] until a token is free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// Tokens are stored scaled by 1000 to handle fractional refill without floats.
const SCALE: u64 = 1000;

/// How often `acquire` re-checks the bucket while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A thread-safe token bucket rate limiter
pub struct RateLimiter {
    /// Maximum tokens in bucket (burst capacity)
    capacity: u64,
    /// Tokens added per second
    refill_rate: f64,
    /// Current token count, scaled by `SCALE`
    tokens_scaled: AtomicU64,
    /// Last time tokens were refilled
    last_refill: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing a burst of `capacity` and `refill_rate`
    /// requests per second sustained.
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens_scaled: AtomicU64::new(capacity * SCALE),
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Attempt to acquire a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.refill();

        loop {
            let current = self.tokens_scaled.load(Ordering::Relaxed);
            if current < SCALE {
                return false;
            }
            match self.tokens_scaled.compare_exchange(
                current,
                current - SCALE,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// Add tokens for the time elapsed since the last refill, capped at
    /// capacity.
    fn refill(&self) {
        let now = Instant::now();

        let mut last = match self.last_refill.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let elapsed = now.duration_since(*last);

        let tokens_to_add = (elapsed.as_secs_f64() * self.refill_rate * SCALE as f64) as u64;
        if tokens_to_add > 0 {
            *last = now;

            let max_scaled = self.capacity * SCALE;
            loop {
                let current = self.tokens_scaled.load(Ordering::Relaxed);
                let new = std::cmp::min(current + tokens_to_add, max_scaled);
                if self
                    .tokens_scaled
                    .compare_exchange(current, new, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
            }
        }
    }

    /// Current token count (for monitoring)
    pub fn available_tokens(&self) -> u64 {
        self.tokens_scaled.load(Ordering::Relaxed) / SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_rate_limit() {
        let limiter = RateLimiter::new(3, 1.0); // 3 burst, 1/sec

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());

        // 4th should be denied
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_refill() {
        let limiter = RateLimiter::new(2, 100.0); // 2 burst, 100/sec

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // 15ms at 100/sec is at least 1 token
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_available_tokens() {
        let limiter = RateLimiter::new(5, 1.0);
        assert_eq!(limiter.available_tokens(), 5);

        limiter.try_acquire();
        assert_eq!(limiter.available_tokens(), 4);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(1, 50.0);
        assert!(limiter.try_acquire());

        // Bucket is empty; acquire must block until refill, not return early.
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
