//! Cancellable scheduled work: the one timer primitive behind polling and debouncing
//!
//! A `ScheduledTask` owns a spawned tokio task. Dropping or cancelling it aborts
//! the task, including any request the task is awaiting at that moment.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct ScheduledTask {
    label: String,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `tick` immediately, then every `period`, until cancelled.
    ///
    /// A tick that overruns the period delays the next one rather than
    /// bunching ticks together.
    pub fn every<F, Fut>(label: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let task_label = label.clone();
        let period = period.max(MIN_PERIOD);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                log::trace!("{}: tick", task_label);
                tick().await;
            }
        });

        log::debug!("Scheduled {} every {:?}", label, period);
        ScheduledTask { label, handle }
    }

    /// Run `job` once after `delay` unless cancelled first
    pub fn after<Fut>(label: impl Into<String>, delay: Duration, job: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            job.await;
        });

        ScheduledTask {
            label: label.into(),
            handle,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task; a pending or in-flight run never completes
    pub fn cancel(self) {
        log::debug!("Cancelled {}", self.label);
        drop(self);
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> futures::future::Ready<()> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_ticks_immediately_then_periodically() {
        let (count, tick) = counter();
        let task = ScheduledTask::every("test poll", Duration::from_secs(5), tick);

        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        task.cancel();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_runs_once() {
        let (count, mut tick) = counter();
        let task = ScheduledTask::after("test delay", Duration::from_millis(300), async move {
            tick().await;
        });

        time::sleep(Duration::from_millis(299)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_run() {
        let (count, mut tick) = counter();
        let task = ScheduledTask::after("test delay", Duration::from_millis(300), async move {
            tick().await;
        });
        assert_eq!(task.label(), "test delay");

        drop(task);
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
