//! Resettable single-shot timer used for device idle timeouts.
//!
//! Each [`IdleTimer`] owns one background task on the tokio runtime. The
//! current deadline lives in a `watch` channel: resetting or cancelling is a
//! non-blocking send, so it is safe to do with a tracker lock held. Dropping
//! the timer closes the channel and the task exits.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;

/// A single-shot deferred callback that can be rescheduled or cancelled.
#[derive(Debug)]
pub struct IdleTimer {
    deadline: watch::Sender<Option<Instant>>,
}

impl IdleTimer {
    /// Spawn the timer task on `runtime`. It stays dormant until the first
    /// [`reset`](Self::reset) or [`reset_at`](Self::reset_at).
    pub fn spawn<F>(runtime: &Handle, on_fire: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (deadline, rx) = watch::channel(None);
        runtime.spawn(run(rx, on_fire));
        Self { deadline }
    }

    /// Fire `after` from now, replacing any pending deadline.
    pub fn reset(&self, after: Duration) {
        self.reset_at(Instant::now() + after);
    }

    /// Fire at `at`, replacing any pending deadline.
    pub fn reset_at(&self, at: Instant) {
        self.deadline.send_replace(Some(at));
    }

    /// Drop the pending deadline without firing.
    pub fn cancel(&self) {
        self.deadline.send_replace(None);
    }

    /// Currently scheduled deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.borrow()
    }
}

async fn run<F>(mut rx: watch::Receiver<Option<Instant>>, on_fire: F)
where
    F: Fn(),
{
    loop {
        let deadline = *rx.borrow_and_update();

        let Some(at) = deadline else {
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(at) => {
                on_fire();
                // A fired deadline is spent; wait for the next reset.
                if rx.changed().await.is_err() {
                    return;
                }
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_timer() -> (IdleTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = IdleTimer::spawn(&Handle::current(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (timer, fired)
    }

    /// Let the timer task observe channel updates and elapsed sleeps.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dormant_until_reset() {
        let (timer, fired) = counting_timer();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_deadline() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(30));
        settle().await;

        tokio::time::sleep(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_pushes_deadline_out() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(30));
        settle().await;

        tokio::time::sleep(Duration::from_secs(20)).await;
        timer.reset(Duration::from_secs(30));
        settle().await;

        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(5));
        settle().await;
        timer.cancel();
        settle().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn can_fire_again_after_rearming() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;

        timer.reset(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_timer_stops_task() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(5));
        settle().await;
        drop(timer);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
