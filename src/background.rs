use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::Notify;

/// Detached tasks whose completion can be awaited as a group.
#[derive(Clone, Default)]
pub struct Background {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pending: AtomicUsize,
    idle: Notify,
}

/// Decrements the pending count even if the task panics.
struct Guard(Arc<Inner>);

impl Drop for Guard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Background {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a future on the runtime without waiting for it.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        let guard = Guard(self.inner.clone());

        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until no spawned task is running, including tasks spawned by
    /// other tasks while waiting.
    pub async fn settle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }
}
