//! Cancellable one-shot and repeating timers
//!
//! The aggregator never sleeps itself. It asks a [`Scheduler`] to run a callback later and
//! keeps the returned [`TimerHandle`] so it can cancel the callback on shutdown.

use std::{pin::pin, time::Duration};

use futures::future::{Either, select};
use tokio::{
    runtime::{Handle, TryCurrentError},
    time::{MissedTickBehavior, interval_at},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Callback for [`Scheduler::arm_once`]
pub type OnceTask = Box<dyn FnOnce() + Send + 'static>;
/// Callback for [`Scheduler::arm_repeating`]
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Runs callbacks after a delay
///
/// Implementations must invoke callbacks from their own execution context, never from
/// inside `arm_once`/`arm_repeating` themselves.
pub trait Scheduler: Send + Sync {
    /// Run `task` once, `delay` from now, unless the handle is cancelled first
    fn arm_once(&self, delay: Duration, task: OnceTask) -> TimerHandle;

    /// Run `task` every `period`, starting one `period` from now, until the handle is
    /// cancelled
    fn arm_repeating(&self, period: Duration, task: RepeatingTask) -> TimerHandle;
}

/// Cancels a timer armed through a [`Scheduler`]
///
/// Cancelling is idempotent and is a no-op once a one-shot timer has fired. Dropping the
/// handle does *not* cancel the timer.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// A handle whose timer has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the timer from firing again
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`TimerHandle::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the timer is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// [`Scheduler`] backed by tokio timers
///
/// Every timer is a task on the given runtime, tracked so a host can wait for all of
/// them to wind down after cancelling.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    tasks: TaskTracker,
}

impl TokioScheduler {
    /// Schedule on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: TaskTracker::new(),
        }
    }

    /// Schedule on the runtime the caller is running in
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }

    /// Wait until every timer task has exited
    ///
    /// Timers only exit once cancelled (or, for one-shot timers, fired), so cancel first.
    pub async fn wait(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

impl Scheduler for TokioScheduler {
    fn arm_once(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        self.runtime.spawn(self.tasks.track_future(async move {
            let sleep = tokio::time::sleep(delay);
            if let Either::Left(_) = select(pin!(sleep), pin!(timer.cancelled())).await {
                task();
            }
        }));
        handle
    }

    fn arm_repeating(&self, period: Duration, mut task: RepeatingTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        self.runtime.spawn(self.tasks.track_future(async move {
            let mut ticks = interval_at(tokio::time::Instant::now() + period, period);
            // a stalled runtime must not fire a burst of back-to-back flushes
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            while let Either::Left(_) = select(pin!(ticks.tick()), pin!(timer.cancelled())).await
            {
                task();
            }
        }));
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use assert2::check;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let read = {
            let count = count.clone();
            move || count.load(Ordering::SeqCst)
        };
        (count, read)
    }

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let (count, fired) = counter();
        scheduler.arm_once(
            Duration::from_secs(5),
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        check!(fired() == 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        check!(fired() == 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        check!(fired() == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_once_never_fires() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let (count, fired) = counter();
        let handle = scheduler.arm_once(
            Duration::from_secs(1),
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();
        handle.cancel();
        check!(handle.is_cancelled());

        tokio::time::sleep(Duration::from_secs(2)).await;
        check!(fired() == 0);
        scheduler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_fires_every_period_until_cancelled() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let (count, fired) = counter();
        let handle = scheduler.arm_repeating(
            Duration::from_secs(10),
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_secs(9)).await;
        check!(fired() == 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        check!(fired() == 1);
        tokio::time::sleep(Duration::from_secs(20)).await;
        check!(fired() == 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        check!(fired() == 3);
        scheduler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_harmless() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let (count, fired) = counter();
        let handle = scheduler.arm_once(
            Duration::from_millis(10),
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        check!(fired() == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_resolves_for_every_clone() {
        let handle = TimerHandle::new();
        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.cancelled().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        check!(!waiter.is_finished());

        handle.cancel();
        waiter.await.unwrap();
        check!(handle.is_cancelled());
    }

    #[test]
    fn try_current_outside_runtime() {
        check!(TokioScheduler::try_current().is_err());
    }
}
