//! Expiration scheduler
//!
//! Holds at most one armed timer. Arming always cancels the previous
//! timer first, and every firing is tagged with a generation so a
//! firing that raced a cancel can be recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ports::Clock;

/// Notification sent when an armed timer fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub job_id: String,
    pub generation: u64,
}

/// Result of arming the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arming {
    /// A timer will fire after the given delay
    Scheduled(Duration),
    /// The deadline has already passed; the caller must clean up now
    Due,
}

struct ArmedTimer {
    job_id: String,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Single-owner timer for the cached entry's expiry
pub struct ExpirationScheduler<K: Clock> {
    clock: Arc<K>,
    tx: mpsc::UnboundedSender<Expiry>,
    armed: Option<ArmedTimer>,
    generation: u64,
}

impl<K: Clock> ExpirationScheduler<K> {
    /// Create a scheduler and the receiver its firings are delivered to
    pub fn new(clock: Arc<K>) -> (Self, mpsc::UnboundedReceiver<Expiry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            clock,
            tx,
            armed: None,
            generation: 0,
        };
        (scheduler, rx)
    }

    /// Arm a timer for `job_id` at `expires_at`, replacing any armed timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, job_id: &str, expires_at: DateTime<Utc>) -> Arming {
        self.cancel();

        let delay = match (expires_at - self.clock.now()).to_std() {
            Ok(delay) if !delay.is_zero() => delay,
            _ => {
                tracing::debug!(job_id, "Expiry already due");
                return Arming::Due;
            }
        };

        self.generation += 1;
        let expiry = Expiry {
            job_id: job_id.to_string(),
            generation: self.generation,
        };
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(expiry);
        });

        tracing::debug!(
            job_id,
            delay = %humantime::format_duration(delay),
            generation = self.generation,
            "Expiry timer armed",
        );

        self.armed = Some(ArmedTimer {
            job_id: job_id.to_string(),
            generation: self.generation,
            handle,
        });
        Arming::Scheduled(delay)
    }

    /// Cancel the armed timer, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.armed.take() {
            timer.handle.abort();
            tracing::debug!(job_id = %timer.job_id, "Expiry timer cancelled");
        }
    }

    /// Consume a firing. Returns `true` only if it belongs to the armed timer;
    /// the scheduler is disarmed in that case.
    pub fn take_if_current(&mut self, expiry: &Expiry) -> bool {
        match &self.armed {
            Some(timer) if timer.generation == expiry.generation && timer.job_id == expiry.job_id => {
                self.armed = None;
                true
            }
            _ => {
                tracing::debug!(
                    job_id = %expiry.job_id,
                    generation = expiry.generation,
                    "Dropping stale expiry",
                );
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl<K: Clock> Drop for ExpirationScheduler<K> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::time::Instant;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn scheduler() -> (ExpirationScheduler<FixedClock>, mpsc::UnboundedReceiver<Expiry>) {
        ExpirationScheduler::new(Arc::new(FixedClock(t0())))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_exactly_at_expiry() {
        let (mut scheduler, mut rx) = scheduler();
        let start = Instant::now();

        let arming = scheduler.arm("abc", t0() + chrono::Duration::milliseconds(600_000));
        assert_eq!(arming, Arming::Scheduled(Duration::from_millis(600_000)));

        let expiry = rx.recv().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600_000));
        assert!(elapsed < Duration::from_millis(600_001));
        assert_eq!(expiry.job_id, "abc");
        assert!(scheduler.take_if_current(&expiry));
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_is_due() {
        let (mut scheduler, _rx) = scheduler();

        assert_eq!(
            scheduler.arm("r2", t0() - chrono::Duration::milliseconds(5_000)),
            Arming::Due
        );
        assert_eq!(scheduler.arm("r2", t0()), Arming::Due);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn arming_twice_leaves_one_live_timer() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm("first", t0() + chrono::Duration::seconds(5));
        scheduler.arm("second", t0() + chrono::Duration::seconds(10));
        assert!(scheduler.is_armed());

        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry.job_id, "second");
        assert!(scheduler.take_if_current(&expiry));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm("abc", t0() + chrono::Duration::seconds(1));
        scheduler.cancel();
        scheduler.cancel();
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_firing_is_rejected() {
        let (mut scheduler, _rx) = scheduler();
        scheduler.arm("abc", t0() + chrono::Duration::seconds(1));
        let stale = Expiry {
            job_id: "abc".to_string(),
            generation: 0,
        };

        assert!(!scheduler.take_if_current(&stale));
        assert!(scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_timer() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm("abc", t0() + chrono::Duration::seconds(1));
        drop(scheduler);

        tokio::time::sleep(Duration::from_secs(5)).await;
        // Sender is gone with the scheduler and nothing was sent
        assert!(rx.recv().await.is_none());
    }
}
