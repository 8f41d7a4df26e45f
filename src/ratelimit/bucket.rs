//! Token bucket with reservations

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ratelimit::error::RateLimitError;

#[derive(Debug)]
struct BucketState {
    /// May go negative while reservations are outstanding
    tokens: f64,
    last_refill: Instant,
}

/// Holds at most `burst` tokens and gains one every `interval`
#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    burst: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A full bucket
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    // Bucket state stays consistent across a panic in another holder.
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.last_refill = now;
        if self.interval.is_zero() {
            state.tokens = f64::from(self.burst);
            return;
        }
        let gained = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        state.tokens = (state.tokens + gained).min(f64::from(self.burst));
    }

    /// Consumes a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Takes a token now, possibly on credit, and reports when it becomes usable
    pub fn reserve(self: &Arc<Self>) -> Result<Reservation, RateLimitError> {
        if self.burst == 0 {
            return Err(RateLimitError::ZeroBurst);
        }

        let now = Instant::now();
        let mut state = self.lock();
        self.refill(&mut state, now);
        state.tokens -= 1.0;

        let delay = if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            self.interval.mul_f64(-state.tokens)
        };

        Ok(Reservation {
            bucket: Arc::clone(self),
            delay,
            ready_at: now + delay,
        })
    }

    /// Waits for a token, giving it back if `cancel` fires first or the
    /// future is dropped before the token becomes usable
    pub async fn wait(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Exceeded);
        }

        let reservation = self.reserve()?;
        if reservation.delay.is_zero() {
            return Ok(());
        }

        let ready_at = reservation.ready_at;
        let pending = PendingWait(Some(reservation));
        tokio::select! {
            _ = cancel.cancelled() => Err(RateLimitError::Exceeded),
            _ = tokio::time::sleep_until(ready_at) => {
                pending.complete();
                Ok(())
            }
        }
    }

    /// Refills the bucket to `burst`
    pub fn reset(&self) {
        let mut state = self.lock();
        state.tokens = f64::from(self.burst);
        state.last_refill = Instant::now();
    }

    fn restore(&self) {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        state.tokens = (state.tokens + 1.0).min(f64::from(self.burst));
    }
}

/// A token taken from a bucket that becomes usable after `delay`
#[derive(Debug)]
pub struct Reservation {
    bucket: Arc<TokenBucket>,
    delay: Duration,
    ready_at: Instant,
}

impl Reservation {
    /// How long the caller had to wait at reservation time
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns the token to the bucket unless it has already become usable
    pub fn cancel(self) {
        if Instant::now() < self.ready_at {
            self.bucket.restore();
        }
    }
}

/// Reservation held across the sleep in `TokenBucket::wait`; cancelled on drop
/// unless the sleep completed.
struct PendingWait(Option<Reservation>);

impl PendingWait {
    fn complete(mut self) {
        self.0 = None;
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        if let Some(reservation) = self.0.take() {
            reservation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_allows_burst_then_denies() {
        let bucket = TokenBucket::new(Duration::from_secs(60), 2);

        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn try_acquire_refills_after_interval() {
        let bucket = TokenBucket::new(Duration::from_millis(20), 1);

        assert!(bucket.try_acquire());
        std::thread::sleep(Duration::from_millis(40));

        assert!(bucket.try_acquire());
    }

    #[test]
    fn reserve_delays_second_token_by_interval() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_secs(12), 1));

        let first = bucket.reserve().unwrap();
        let second = bucket.reserve().unwrap();

        assert_eq!(first.delay(), Duration::ZERO);
        assert!(second.delay() > Duration::from_secs(11));
        assert!(second.delay() <= Duration::from_secs(12));
    }

    #[test]
    fn cancel_returns_token_before_ready() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_secs(60), 1));
        assert!(bucket.try_acquire());

        bucket.reserve().unwrap().cancel();

        let next = bucket.reserve().unwrap();
        assert!(next.delay() <= Duration::from_secs(60));
        assert!(next.delay() > Duration::from_secs(59));
    }

    #[tokio::test]
    async fn cancel_after_ready_keeps_token_spent() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_millis(200), 1));
        assert!(bucket.try_acquire());
        let reservation = bucket.reserve().unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        reservation.cancel();

        // Only half a token has refilled since the reservation became usable.
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn reserve_fails_for_zero_burst() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_secs(1), 0));

        assert_eq!(bucket.reserve().unwrap_err(), RateLimitError::ZeroBurst);
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn reset_refills_bucket() {
        let bucket = TokenBucket::new(Duration::from_secs(60), 1);
        assert!(bucket.try_acquire());

        bucket.reset();

        assert!(bucket.try_acquire());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_token_available() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_secs(60), 1));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            bucket.wait(&CancellationToken::new()),
        )
        .await;

        assert_eq!(result, Ok(Ok(())));
    }

    #[tokio::test]
    async fn wait_sleeps_until_refill() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_millis(50), 1));
        assert!(bucket.try_acquire());

        let start = std::time::Instant::now();
        bucket.wait(&CancellationToken::new()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn wait_is_cancelled_promptly_and_restores_token() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_secs(60), 1));
        assert!(bucket.try_acquire());
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let start = std::time::Instant::now();
        let result = bucket.wait(&cancel).await;
        canceller.await.unwrap();

        assert_eq!(result, Err(RateLimitError::Exceeded));
        assert!(start.elapsed() < Duration::from_secs(5));
        // The cancelled reservation gave its debt back, so the bucket is where it started.
        assert!(!bucket.try_acquire());
    }

    #[tokio::test]
    async fn dropped_wait_returns_token() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_secs(1), 1));
        assert!(bucket.try_acquire());
        let cancel = CancellationToken::new();

        let result = tokio::time::timeout(Duration::from_millis(50), bucket.wait(&cancel)).await;

        assert!(result.is_err());
        assert!(bucket.reserve().unwrap().delay() <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn completed_wait_keeps_token() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_millis(200), 1));
        assert!(bucket.try_acquire());

        bucket.wait(&CancellationToken::new()).await.unwrap();

        assert!(!bucket.try_acquire());
    }

    #[tokio::test]
    async fn wait_fails_fast_when_already_cancelled() {
        let bucket = Arc::new(TokenBucket::new(Duration::from_secs(60), 1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(bucket.wait(&cancel).await, Err(RateLimitError::Exceeded));
        assert!(bucket.try_acquire());
    }
}
