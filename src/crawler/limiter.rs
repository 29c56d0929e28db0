use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{AcquireError, Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::debug;

/// Politeness gate for outgoing requests.
///
/// Caps how many requests are in flight at once and keeps request starts
/// to the same domain at least `delay` apart. One limiter is shared by every
/// session in a run.
pub struct DomainLimiter {
    /// In-flight request cap
    permits: Semaphore,

    /// Minimum spacing between request starts per domain
    delay: Duration,

    /// Earliest start time handed out next, per domain
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl DomainLimiter {
    pub fn new(parallel_requests: usize, delay: Duration) -> Self {
        Self {
            permits: Semaphore::new(parallel_requests.max(1)),
            delay,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for a free request slot on `domain`. The request may start once
    /// this returns and must finish before the permit is dropped.
    pub async fn acquire(&self, domain: &str) -> Result<SemaphorePermit<'_>, AcquireError> {
        let permit = self.permits.acquire().await?;

        let wait = self.reserve_slot(domain).await;
        if !wait.is_zero() {
            debug!(domain, wait_ms = wait.as_millis() as u64, "Waiting for rate limit");
            tokio::time::sleep(wait).await;
        }

        Ok(permit)
    }

    /// Claim the next start time for `domain` and return how long to wait for it
    async fn reserve_slot(&self, domain: &str) -> Duration {
        let mut slots = self.next_slot.lock().await;
        let now = Instant::now();

        let slot = slots
            .get(domain)
            .copied()
            .filter(|slot| *slot > now)
            .unwrap_or(now);
        slots.insert(domain.to_string(), slot + self.delay);

        slot.saturating_duration_since(now)
    }

    /// Permits currently free
    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spaces_requests_to_same_domain() {
        let limiter = DomainLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        drop(limiter.acquire("wikipedia.org").await.unwrap());
        assert_eq!(start.elapsed(), Duration::ZERO);

        drop(limiter.acquire("wikipedia.org").await.unwrap());
        drop(limiter.acquire("wikipedia.org").await.unwrap());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_are_limited_independently() {
        let limiter = DomainLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        drop(limiter.acquire("wikipedia.org").await.unwrap());
        drop(limiter.acquire("wikimedia.org").await.unwrap());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caps_requests_in_flight() {
        let limiter = DomainLimiter::new(2, Duration::ZERO);

        let first = limiter.acquire("a.example").await.unwrap();
        let _second = limiter.acquire("b.example").await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(first);
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn test_zero_parallelism_still_allows_one() {
        let limiter = DomainLimiter::new(0, Duration::ZERO);
        assert_eq!(limiter.available(), 1);
    }
}
