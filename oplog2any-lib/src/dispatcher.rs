//! Bounded task dispatcher
//!
//! Caps the number of concurrently running checkpoint and routing tasks.
//! Admission waits for a free slot, which throttles the cursor reader when
//! handlers fall behind. A slot is released when its task finishes, whether
//! it completed, failed or panicked.

use crate::error::{CdcError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Called with the remaining in-flight count whenever a slot is released
pub type ReleaseHook = Arc<dyn Fn(usize) + Send + Sync>;

/// An admission slot held by one running task
pub struct DispatchSlot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
    on_release: Option<ReleaseHook>,
}

impl Drop for DispatchSlot {
    fn drop(&mut self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if let Some(hook) = &self.on_release {
            hook(remaining);
        }
    }
}

impl std::fmt::Debug for DispatchSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchSlot").finish_non_exhaustive()
    }
}

/// Runs tasks with at most `capacity` of them in flight
pub struct BoundedDispatcher {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
    on_release: Option<ReleaseHook>,
}

impl std::fmt::Debug for BoundedDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedDispatcher")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .field("peak_in_flight", &self.peak_in_flight())
            .finish()
    }
}

impl BoundedDispatcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
            on_release: None,
        }
    }

    /// Report the in-flight count to `hook` every time a task releases its slot
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.on_release = Some(hook);
        self
    }

    /// Wait for a free slot
    pub async fn admit(&self) -> Result<DispatchSlot> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CdcError::generic("Dispatcher admission pool is closed"))?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(DispatchSlot {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
            on_release: self.on_release.clone(),
        })
    }

    /// Run `task` in the background while holding `slot`
    pub fn spawn<F>(&self, slot: DispatchSlot, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            let _slot = slot;
            task.await;
        });
    }

    /// Accept tasks again after a previous [`drain`](Self::drain)
    pub fn reopen(&self) {
        self.tracker.reopen();
    }

    /// Wait until every spawned task has finished
    pub async fn drain(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            debug!(
                "Waiting for {} in-flight task(s) to finish",
                self.tracker.len()
            );
        }
        self.tracker.wait().await;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently admitted tasks
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously admitted tasks seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
