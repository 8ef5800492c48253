//! Cancellable deferred and periodic tasks.
//!
//! Backoff retries, health polling, and supersedable requests all need
//! timers that can be cancelled mechanically rather than by convention.
//! A [`ScheduledTask`] cancels itself when dropped, so replacing the
//! task stored in a slot cancels its predecessor.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A deferred or periodic callback that is cancelled on drop.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `task` once after `delay`, unless cancelled first.
    pub fn once<F, Fut>(delay: Duration, task: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => task().await,
            }
        });
        Self { token, handle }
    }

    /// Run `task` every `period` until cancelled. The next tick is
    /// scheduled only after the current run concludes, so runs never
    /// overlap.
    pub fn repeating<F, Fut>(period: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = task() => {}
                }
            }
        });
        Self { token, handle }
    }

    /// Cancel the task. A deferred callback that has not fired will
    /// never fire; a periodic task stops after the current run.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the underlying task has run to completion (fired,
    /// finished, or observed cancellation).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let f2 = fired.clone();
        let _task = ScheduledTask::once(Duration::from_millis(100), move || async move {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire_suppresses() {
        let fired = Arc::new(AtomicU32::new(0));
        let f2 = fired.clone();
        let task = ScheduledTask::once(Duration::from_millis(100), move || async move {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        task.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(task.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let fired = Arc::new(AtomicU32::new(0));
        let f2 = fired.clone();
        let task = ScheduledTask::once(Duration::from_millis(100), move || async move {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        drop(task);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_fires_until_cancelled() {
        let fired = Arc::new(AtomicU32::new(0));
        let f2 = fired.clone();
        let task = ScheduledTask::repeating(Duration::from_millis(100), move || {
            let f3 = f2.clone();
            async move {
                f3.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        let seen = fired.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected at least 3 ticks, saw {seen}");

        task.cancel();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), seen);
    }
}
