use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Identifies the draft a preview was requested for. A response is applied
/// only if the editor still shows exactly this draft revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreviewKey {
    pub generation: u64,
    pub revision: u64,
    pub draft_id: String,
}

struct Pending {
    task: JoinHandle<()>,
    sent: Arc<AtomicBool>,
}

impl Pending {
    /// Aborts the request while it is still waiting out its quiet period. A
    /// request already sent runs to completion and its response is checked
    /// against [`PreviewKey`] instead.
    fn cancel(self) {
        if !self.sent.load(Ordering::SeqCst) {
            self.task.abort();
        }
    }
}

/// One cancellable, delayed preview request at a time.
#[derive(Default)]
pub(crate) struct PreviewDebouncer {
    pending: Mutex<Option<Pending>>,
}

impl PreviewDebouncer {
    /// Cancels any pending request and runs `request` after `quiet_period`.
    pub fn schedule<F>(&self, quiet_period: Duration, request: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sent = Arc::new(AtomicBool::new(false));
        let marker = sent.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            marker.store(true, Ordering::SeqCst);
            request.await;
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(Pending { task, sent });
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    pub fn cancel(&self) {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(previous) = previous {
            previous.cancel();
        }
    }
}

impl Drop for PreviewDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[tokio::test(start_paused = true)]
    async fn rescheduling_cancels_the_pending_request() {
        let debouncer = PreviewDebouncer::default();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fired = fired.clone();
            debouncer.schedule(Duration::from_millis(3000), async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_request() {
        let debouncer = PreviewDebouncer::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        debouncer.schedule(Duration::from_millis(3000), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sent_request_survives_cancel() {
        let debouncer = PreviewDebouncer::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let counter = fired.clone();
        let gate = release.clone();
        debouncer.schedule(Duration::from_millis(3000), async move {
            gate.notified().await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        debouncer.cancel();
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
