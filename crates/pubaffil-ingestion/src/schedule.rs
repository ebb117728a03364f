//! Request pacing.
//!
//! All outbound requests of a pipeline pass through one [`RequestScheduler`],
//! which guarantees a minimum gap between consecutive request starts. Time is
//! read through the [`Clock`] trait so the guarantee can be checked against a
//! [`ManualClock`] without real sleeps.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Upper bound for a single backoff wait.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time, for pacing.
    fn now(&self) -> Instant;

    /// Wall-clock time, for stamping records.
    fn timestamp(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Real time on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time instantly and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    origin_wall: DateTime<Utc>,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            origin_wall: wall,
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner()) += duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_wall + elapsed
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).push(duration);
        self.advance(duration);
    }
}

/// Enforces the minimum delay between consecutive outbound requests.
pub struct RequestScheduler {
    clock: Arc<dyn Clock>,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RequestScheduler {
    pub fn new(clock: Arc<dyn Clock>, min_delay: Duration) -> Self {
        Self { clock, min_delay, last_request: None }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait until a request may start, then mark it as started.
    /// Returns how long the caller was held back.
    pub async fn acquire(&mut self) -> Duration {
        let mut waited = Duration::ZERO;
        if let Some(last) = self.last_request {
            let since = self.clock.now().saturating_duration_since(last);
            if since < self.min_delay {
                waited = self.min_delay - since;
                debug!(wait_ms = waited.as_millis() as u64, "Rate limit: delaying request");
                self.clock.sleep(waited).await;
            }
        }
        self.last_request = Some(self.clock.now());
        waited
    }

    /// Sleep before a retry. The next `acquire` still applies the minimum delay.
    pub async fn backoff(&self, delay: Duration) {
        self.clock.sleep(delay).await;
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, …
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_is_not_delayed() {
        let clock = Arc::new(ManualClock::new());
        let mut scheduler = RequestScheduler::new(clock.clone(), Duration::from_millis(100));
        assert_eq!(scheduler.acquire().await, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_requests_are_spaced() {
        let clock = Arc::new(ManualClock::new());
        let mut scheduler = RequestScheduler::new(clock.clone(), Duration::from_millis(100));
        scheduler.acquire().await;
        scheduler.acquire().await;
        scheduler.acquire().await;
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100); 2]);
        assert_eq!(clock.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_elapsed_time_counts_towards_delay() {
        let clock = Arc::new(ManualClock::new());
        let mut scheduler = RequestScheduler::new(clock.clone(), Duration::from_millis(100));
        scheduler.acquire().await;
        clock.advance(Duration::from_millis(60));
        assert_eq!(scheduler.acquire().await, Duration::from_millis(40));
        clock.advance(Duration::from_millis(500));
        assert_eq!(scheduler.acquire().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_backoff_counts_towards_delay() {
        let clock = Arc::new(ManualClock::new());
        let mut scheduler = RequestScheduler::new(clock.clone(), Duration::from_millis(100));
        scheduler.acquire().await;
        scheduler.backoff(Duration::from_millis(250)).await;
        assert_eq!(scheduler.acquire().await, Duration::ZERO);
    }

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(40), MAX_BACKOFF);
    }

    #[test]
    fn test_manual_clock_timestamp_follows_virtual_time() {
        let start = Utc::now();
        let clock = ManualClock::starting_at(start);
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.timestamp() - start, chrono::Duration::seconds(90));
    }
}
