//! Cancellable deadline timer.
//!
//! A [`DeadlineTimer`] schedules a single callback after a fixed interval,
//! independent of any UI or event-loop framework: a monotonic deadline
//! (tokio sleep) plus a cancellation token. Arming an already-armed timer
//! cancels the previous deadline first, so starting twice never leaks a
//! duplicate firing.

use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A re-armable one-shot timer.
///
/// The callback fires at most once per arm; `disarm` (or a re-arm) before
/// the deadline suppresses it. Firing happens on the runtime the timer was
/// armed on.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    armed: Mutex<Option<CancellationToken>>,
}

impl DeadlineTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer: `on_fire` runs after `after` unless the timer is
    /// disarmed or re-armed first. Any previously armed deadline is
    /// cancelled before the new one is scheduled.
    pub fn arm(
        &self,
        handle: &tokio::runtime::Handle,
        after: Duration,
        on_fire: impl FnOnce() + Send + 'static,
    ) {
        let token = CancellationToken::new();
        let previous = self.armed.lock().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        trace!(after_ms = after.as_millis() as u64, "deadline timer armed");
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    on_fire();
                }
            }
        });
    }

    /// Cancels a pending deadline. Idempotent; a timer that already fired
    /// or was never armed is left unchanged.
    pub fn disarm(&self) {
        if let Some(token) = self.armed.lock().take() {
            token.cancel();
            trace!("deadline timer disarmed");
        }
    }

    /// True if `arm` was called and neither `disarm` nor a re-arm cleared
    /// it since. Note this stays true after the deadline fires.
    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fires_after_interval() {
        let timer = DeadlineTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        timer.arm(
            &tokio::runtime::Handle::current(),
            Duration::from_millis(20),
            move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disarm_suppresses_firing() {
        let timer = DeadlineTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        timer.arm(
            &tokio::runtime::Handle::current(),
            Duration::from_millis(30),
            move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(timer.is_armed());
        timer.disarm();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rearm_does_not_leak_duplicate_firing() {
        let timer = DeadlineTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let fired_clone = Arc::clone(&fired);
            timer.arm(
                &tokio::runtime::Handle::current(),
                Duration::from_millis(25),
                move || {
                    fired_clone.fetch_add(1, Ordering::SeqCst);
                },
            );
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disarm_without_arm_is_noop() {
        let timer = DeadlineTimer::new();
        timer.disarm();
        assert!(!timer.is_armed());
    }
}
