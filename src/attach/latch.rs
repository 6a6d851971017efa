//! Count-down latch for fan-in over a known number of async completions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Clone)]
pub(crate) struct CountDownLatch {
    inner: Arc<LatchInner>,
}

struct LatchInner {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(LatchInner {
                remaining: AtomicUsize::new(count),
                notify: Notify::new(),
            }),
        }
    }

    /// Record one completion. Extra calls past zero are ignored.
    pub fn count_down(&self) {
        let previous = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// Wait until the count reaches zero.
    pub async fn wait(&self) {
        loop {
            // Registered before the check so a concurrent release is not missed
            let notified = self.inner.notify.notified();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}
