//! Cancellable repeating background task.
//!
//! A `BackgroundWorker` runs one unit of work, sleeps for its interval, and
//! repeats until stopped. The interval lives in an atomic and is read right
//! before every sleep, so changing it takes effect from the next cycle
//! without restarting the task. Stopping clears the liveness flag and cuts
//! the current sleep short, but never interrupts a unit of work in flight.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A `Duration` that can be read and written from many threads without
/// tearing. Stored as whole nanoseconds, saturating at `u64::MAX`.
#[derive(Debug)]
pub struct AtomicDuration(AtomicU64);

impl AtomicDuration {
    pub fn new(duration: Duration) -> Self {
        Self(AtomicU64::new(as_nanos(duration)))
    }

    pub fn load(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, duration: Duration) {
        self.0.store(as_nanos(duration), Ordering::Release);
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Liveness state of one started run.
struct Run {
    alive: AtomicBool,
    wake: Notify,
}

/// A repeating task started and stopped explicitly by its owner.
pub struct BackgroundWorker {
    interval: Arc<AtomicDuration>,
    current: Mutex<Option<(Arc<Run>, JoinHandle<()>)>>,
}

impl BackgroundWorker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: Arc::new(AtomicDuration::new(interval)),
            current: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval.load()
    }

    /// Change the pause between cycles. A sleep already in progress keeps
    /// its original length.
    pub fn set_interval(&self, interval: Duration) {
        self.interval.store(interval);
    }

    pub fn is_running(&self) -> bool {
        self.lock_current()
            .as_ref()
            .is_some_and(|(run, handle)| run.alive.load(Ordering::Acquire) && !handle.is_finished())
    }

    /// Spawn the loop on the current Tokio runtime.
    ///
    /// `work` is called once per cycle; returning `ControlFlow::Break`
    /// ends the loop. Returns `false` without spawning if a run is already
    /// active.
    pub fn start<F, Fut>(&self, mut work: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let mut current = self.lock_current();
        if let Some((run, handle)) = current.as_ref() {
            if run.alive.load(Ordering::Acquire) && !handle.is_finished() {
                return false;
            }
        }

        let run = Arc::new(Run {
            alive: AtomicBool::new(true),
            wake: Notify::new(),
        });
        let task_run = Arc::clone(&run);
        let interval = Arc::clone(&self.interval);

        let handle = tokio::spawn(async move {
            while task_run.alive.load(Ordering::Acquire) {
                if work().await.is_break() {
                    break;
                }
                if !task_run.alive.load(Ordering::Acquire) {
                    break;
                }

                let pause = interval.load();
                tokio::select! {
                    () = tokio::time::sleep(pause) => {}
                    () = task_run.wake.notified() => {}
                }
            }
            task_run.alive.store(false, Ordering::Release);
        });

        *current = Some((run, handle));
        true
    }

    /// Stop the loop and wait for it to exit. A unit of work in progress
    /// completes first; no new one starts. Returns `false` if nothing was
    /// started.
    pub async fn stop(&self) -> bool {
        let taken = self.lock_current().take();
        let Some((run, handle)) = taken else {
            return false;
        };

        run.alive.store(false, Ordering::Release);
        run.wake.notify_one();

        if let Err(e) = handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "background worker panicked");
            }
        }
        true
    }

    /// Clear the liveness flag without waiting for the task.
    pub fn signal_stop(&self) {
        if let Some((run, _)) = self.lock_current().as_ref() {
            run.alive.store(false, Ordering::Release);
            run.wake.notify_one();
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<(Arc<Run>, JoinHandle<()>)>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
