//! Repository-wide exclusion for format migrations
//!
//! Every work unit holds a shared guard while it runs. A migration first
//! announces itself, which stops new shared guards from being handed out,
//! then waits for the exclusive guard. Work admitted after the
//! announcement therefore starts only once the migration has released it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Default)]
pub(crate) struct ExclusiveGate {
    lock: Arc<RwLock<()>>,
    announced: AtomicUsize,
    released: Notify,
}

/// Registered intent to take the gate exclusively
#[derive(Debug)]
pub(crate) struct Announcement {
    gate: Arc<ExclusiveGate>,
}

impl Drop for Announcement {
    fn drop(&mut self) {
        if self.gate.announced.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.gate.released.notify_waiters();
        }
    }
}

#[derive(Debug)]
pub(crate) struct ExclusiveGuard {
    _guard: OwnedRwLockWriteGuard<()>,
    _announcement: Announcement,
}

impl ExclusiveGate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block new shared holders until the returned announcement is dropped
    pub(crate) fn announce(self: &Arc<Self>) -> Announcement {
        self.announced.fetch_add(1, Ordering::SeqCst);
        Announcement {
            gate: Arc::clone(self),
        }
    }

    pub(crate) async fn shared(&self) -> OwnedRwLockReadGuard<()> {
        loop {
            let released = self.released.notified();
            if self.announced.load(Ordering::SeqCst) == 0 {
                break;
            }
            released.await;
        }
        Arc::clone(&self.lock).read_owned().await
    }

    pub(crate) async fn exclusive(&self, announcement: Announcement) -> ExclusiveGuard {
        let guard = Arc::clone(&self.lock).write_owned().await;
        ExclusiveGuard {
            _guard: guard,
            _announcement: announcement,
        }
    }

    #[cfg(test)]
    fn announced(&self) -> usize {
        self.announced.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shared_holders_coexist() {
        let gate = ExclusiveGate::new();
        let _a = gate.shared().await;
        let _b = gate.shared().await;
    }

    #[tokio::test]
    async fn test_announcement_holds_back_new_shared_holders() {
        let gate = ExclusiveGate::new();
        let running = gate.shared().await;
        let announcement = gate.announce();
        assert_eq!(gate.announced(), 1);

        let late = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _guard = gate.shared().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!late.is_finished());

        let exclusive = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _guard = gate.exclusive(announcement).await;
            })
        };
        drop(running);

        exclusive.await.unwrap();
        late.await.unwrap();
        assert_eq!(gate.announced(), 0);
    }

    #[tokio::test]
    async fn test_dropped_announcement_releases_waiters() {
        let gate = ExclusiveGate::new();
        let announcement = gate.announce();
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _guard = gate.shared().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(announcement);
        waiter.await.unwrap();
    }
}
