use parking_lot::Mutex;
use tokio::time::{sleep_until, Duration, Instant};

use crate::cancel::CancelSignal;
use crate::error::{Cancelled, ConfigError};

const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Token bucket with continuous refill, expressed as the instant at which
/// the next token matures.
///
/// The bucket refills at `rate` tokens per second and holds at most `burst`
/// tokens. It starts empty, so a saturated caller is admitted at `1/rate`,
/// `2/rate`, ... seconds after `reset()`. Any rolling one-second window sees at
/// most `rate` admissions plus `burst` tokens of boundary tolerance.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: u32,
    /// Time to mint one token.
    interval: Duration,
    /// How far ahead of its theoretical slot a caller may be admitted.
    tolerance: Duration,
    /// Time to fill the bucket from empty.
    refill: Duration,
    /// Theoretical arrival time of the next admission.
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Result<Self, ConfigError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::InvalidRate(rate));
        }
        if burst == 0 {
            return Err(ConfigError::InvalidBurst(burst));
        }

        // one token per nanosecond at most, one per day at least
        let interval = Duration::try_from_secs_f64(1.0 / rate)
            .ok()
            .filter(|interval| !interval.is_zero() && *interval <= MAX_INTERVAL)
            .ok_or(ConfigError::InvalidRate(rate))?;
        let refill = interval
            .checked_mul(burst)
            .ok_or(ConfigError::InvalidBurst(burst))?;

        let limiter = Self {
            rate,
            burst,
            interval,
            tolerance: refill - interval,
            refill,
            next_slot: Mutex::new(Instant::now()),
        };
        limiter.reset();
        Ok(limiter)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Empty the bucket and restart the refill clock from now.
    pub fn reset(&self) {
        *self.next_slot.lock() = Instant::now() + self.refill;
    }

    /// Wait until a token is available and consume it.
    ///
    /// Token accounting happens under the lock, the wait happens outside it,
    /// so concurrent callers queue up on consecutive slots instead of racing
    /// for the same token.
    pub async fn acquire(&self, cancel: &CancelSignal) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let now = Instant::now();
        let deadline = self.reserve(now);
        if deadline <= now {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = sleep_until(deadline) => Ok(()),
        }
    }

    /// Claim the next slot and return the instant it may be used.
    fn reserve(&self, now: Instant) -> Instant {
        let mut next_slot = self.next_slot.lock();
        let slot = (*next_slot).max(now);
        *next_slot = slot + self.interval;

        slot.checked_sub(self.tolerance)
            .map_or(now, |earliest| earliest.max(now))
    }
}
