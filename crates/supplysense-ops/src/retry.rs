//! Capped exponential backoff.
//!
//! The provider's control plane is eventually consistent; deletions take
//! a moment to become visible to subsequent list calls. Rather than a
//! fixed sleep per resource class, every class carries a [`Backoff`]:
//! a bounded number of attempts with a delay that doubles per attempt up
//! to a cap.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    /// Maximum number of retry rounds before giving up.
    pub attempts: u32,
    /// Delay before the first re-check.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Backoff {
    pub const fn new(attempts: u32, base: Duration, cap: Duration) -> Self {
        Backoff {
            attempts,
            base,
            cap,
        }
    }

    /// A backoff that never sleeps, for tests.
    pub const fn immediate(attempts: u32) -> Self {
        Backoff::new(attempts, Duration::ZERO, Duration::ZERO)
    }

    /// The delay after the given zero-based attempt: `base * 2^attempt`,
    /// bounded by `cap`.
    pub fn delay(&self, attempt: u32) -> Duration {
        // Shifting past 32 would overflow the multiplier; the cap makes
        // anything that large equivalent anyway.
        let factor = 1u32 << attempt.min(16);
        self.base.saturating_mul(factor).min(self.cap)
    }

    pub async fn pause(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            log::debug!("backing off for {delay:?} (attempt {attempt})");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn delay_doubles_until_the_cap() {
        let backoff = Backoff::new(5, Duration::from_secs(2), Duration::from_secs(8));
        assert_eq!(Duration::from_secs(2), backoff.delay(0));
        assert_eq!(Duration::from_secs(4), backoff.delay(1));
        assert_eq!(Duration::from_secs(8), backoff.delay(2));
        assert_eq!(Duration::from_secs(8), backoff.delay(3), "capped");
        assert_eq!(Duration::from_secs(8), backoff.delay(63), "shift-safe");
    }

    #[test]
    fn immediate_backoff_never_sleeps() {
        let backoff = Backoff::immediate(3);
        assert_eq!(Duration::ZERO, backoff.delay(0));
        assert_eq!(Duration::ZERO, backoff.delay(10));
    }
}
