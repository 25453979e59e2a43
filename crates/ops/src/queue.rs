//! Bounded-concurrency FIFO job runner
//!
//! A queue admits any number of work units and runs at most `max` of them
//! at once. Submitting never blocks and never fails: if a slot is free the
//! submitter claims it and spawns a drain loop, otherwise the unit waits
//! for an existing loop to reach it. Each loop keeps its slot until the
//! backlog is empty and yields to the runtime between units, so a long
//! backlog neither nests calls nor starves other tasks.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Work = BoxFuture<'static, ()>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Work>,
    running: usize,
}

struct Inner {
    name: String,
    max: usize,
    state: Mutex<QueueState>,
}

/// Ordered runner for operation work units
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    /// Create a queue; a limit of zero is treated as one
    pub fn new(name: impl Into<String>, max: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                max: max.max(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Append `work` to the tail of the queue
    ///
    /// The unit has no error channel; it must record its own failure.
    pub fn submit<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let claimed = {
            let mut state = self.inner.lock();
            state.pending.push_back(work.boxed());
            if state.running < self.inner.max {
                state.running += 1;
                true
            } else {
                false
            }
        };

        if claimed {
            tracing::debug!(queue = %self.inner.name, "claimed slot, starting drain");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.inner.max
    }

    /// Units currently executing
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Units admitted but not started
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.inner.name)
            .field("max", &self.inner.max)
            .field("running", &self.running())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = {
                let mut state = self.lock();
                if let Some(work) = state.pending.pop_front() {
                    work
                } else {
                    state.running -= 1;
                    tracing::debug!(queue = %self.name, "queue empty, released slot");
                    return;
                }
            };

            if AssertUnwindSafe(next).catch_unwind().await.is_err() {
                tracing::error!(queue = %self.name, "work unit panicked");
            }

            // Start the next unit on a fresh scheduling turn
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_fifo_with_single_slot() {
        let queue = JobQueue::new("serial", 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        for i in 0..20 {
            let order = Arc::clone(&order);
            queue.submit(async move {
                // Later units finish faster; order must still hold
                tokio::time::sleep(Duration::from_millis(20 - i)).await;
                order.lock().unwrap().push(i);
            });
        }
        queue.submit(async move {
            let _ = done_tx.send(());
        });

        done_rx.await.unwrap();
        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_submit_does_not_block_on_busy_queue() {
        let queue = JobQueue::new("serial", 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel();

        queue.submit(async move {
            let _ = release_rx.await;
        });
        queue.submit(async move {
            let _ = done_tx.send(());
        });

        for _ in 0..100 {
            if queue.pending() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.running(), 1);
        assert_eq!(queue.pending(), 1);

        release_tx.send(()).unwrap();
        done_rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_unit_does_not_stall_queue() {
        let queue = JobQueue::new("serial", 1);
        let (done_tx, done_rx) = oneshot::channel();

        queue.submit(async { panic!("boom") });
        queue.submit(async move {
            let _ = done_tx.send(());
        });

        done_rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_slot_released_when_idle() {
        let queue = JobQueue::new("search", 4);
        let (done_tx, done_rx) = oneshot::channel();
        queue.submit(async move {
            let _ = done_tx.send(());
        });
        done_rx.await.unwrap();

        for _ in 0..100 {
            if queue.running() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.running(), 0);
        assert_eq!(queue.pending(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_running_never_exceeds_limit(
            max in 1usize..5,
            delays in proptest::collection::vec(0u64..4, 1..40),
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_time()
                .build()
                .unwrap();

            let (observed, reported) = runtime.block_on(async move {
                let queue = JobQueue::new("prop", max);
                let active = Arc::new(AtomicUsize::new(0));
                let peak = Arc::new(AtomicUsize::new(0));
                let reported_peak = Arc::new(AtomicUsize::new(0));
                let finished = Arc::new(AtomicUsize::new(0));
                let total = delays.len();

                for delay in delays {
                    let active = Arc::clone(&active);
                    let peak = Arc::clone(&peak);
                    let task_reported_peak = Arc::clone(&reported_peak);
                    let finished = Arc::clone(&finished);
                    let probe = queue.clone();
                    queue.submit(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        task_reported_peak.fetch_max(probe.running(), Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        finished.fetch_add(1, Ordering::SeqCst);
                    });
                    reported_peak.fetch_max(queue.running(), Ordering::SeqCst);
                }

                while finished.load(Ordering::SeqCst) < total {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                (peak.load(Ordering::SeqCst), reported_peak.load(Ordering::SeqCst))
            });

            prop_assert!(observed <= max);
            prop_assert!(reported <= max);
            prop_assert!(observed >= 1);
        }
    }
}
