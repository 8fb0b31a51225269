//! Fixed-interval status polling.
//!
//! A [`StatusPoller`] owns at most one spawned polling task at a time. The
//! task fetches immediately, then once per interval, and hands every status
//! to the caller's tick callback before checking whether the status is
//! terminal. Ticks never overlap: the next fetch is only issued after the
//! previous tick returned.

use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stockwatch_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ownership token over one spawned polling task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollerHandle {
    id: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug)]
struct Shared {
    name: String,
    interval: Duration,
    slot: Mutex<Option<PollerHandle>>,
    next_id: AtomicU64,
    stops: AtomicU64,
}

impl Shared {
    /// Release the handle in the slot if it is still `id`.
    fn release(&self, id: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(PollerHandle::id) != Some(id) {
            return false;
        }
        let handle = slot.take();
        drop(slot);
        drop(handle);
        self.record_stop();
        true
    }

    fn record_stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Metrics::poll_stopped(&self.name);
    }
}

/// Polls a status source at a fixed interval until a terminal status.
///
/// Cheap to clone; clones share the same handle slot.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    shared: Arc<Shared>,
}

impl StatusPoller {
    /// # Arguments
    /// * `name` - Job label used in logs and metrics
    /// * `interval` - Delay between the end of one fetch and the next
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                interval,
                slot: Mutex::new(None),
                next_id: AtomicU64::new(1),
                stops: AtomicU64::new(0),
            }),
        }
    }

    /// Start polling, releasing any live handle first.
    ///
    /// `fetch` failures are logged and swallowed. After `on_tick` has seen a
    /// status for which `is_terminal` holds, the poller releases its own
    /// handle and the task ends.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T, E, F, Fut, P, C>(&self, fetch: F, is_terminal: P, mut on_tick: C) -> u64
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        P: Fn(&T) -> bool + Send + 'static,
        C: FnMut(&T) + Send + 'static,
    {
        let mut slot = self.shared.slot.lock();
        if let Some(prior) = slot.take() {
            debug!(poller = %self.shared.name, id = prior.id, "Releasing prior poller handle");
            drop(prior);
            self.shared.record_stop();
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        // Weak so that dropping the last poller drops the handle and cancels.
        let shared = Arc::downgrade(&self.shared);
        let name = self.shared.name.clone();
        let interval = self.shared.interval;
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let started = Instant::now();
                let result = tokio::select! {
                    () = task_token.cancelled() => break,
                    result = fetch() => result,
                };
                // Stopped while the fetch was in flight: drop the status.
                if task_token.is_cancelled() {
                    break;
                }

                match result {
                    Ok(status) => {
                        Metrics::poll_tick(&name, started.elapsed().as_secs_f64() * 1000.0);
                        on_tick(&status);
                        if is_terminal(&status) {
                            if let Some(shared) = shared.upgrade() {
                                shared.release(id);
                            }
                            debug!(poller = %name, id, "Terminal status, poller released");
                            break;
                        }
                    }
                    Err(e) => {
                        Metrics::poll_error(&name);
                        warn!(poller = %name, error = %e, "Status fetch failed, polling continues");
                    }
                }
            }
        });

        *slot = Some(PollerHandle { id, token, task });
        debug!(
            poller = %self.shared.name,
            id,
            interval_ms = self.shared.interval.as_millis() as u64,
            "Poller started"
        );
        id
    }

    /// Stop polling. Returns `true` only if a live handle was released.
    pub fn stop(&self) -> bool {
        let released = self.shared.slot.lock().take();
        match released {
            Some(handle) => {
                debug!(poller = %self.shared.name, id = handle.id, "Poller stopped");
                drop(handle);
                self.shared.record_stop();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared
            .slot
            .lock()
            .as_ref()
            .is_some_and(PollerHandle::is_live)
    }

    /// Number of effective releases since construction.
    pub fn stop_count(&self) -> u64 {
        self.shared.stops.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Fetch closure counting calls; answers the call number.
    fn counting_fetch(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<usize, String>> + Send>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_immediate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = StatusPoller::new("test", Duration::from_millis(2000));
        poller.start(counting_fetch(calls.clone()), |_| false, |_| {});

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(poller.is_active());
        assert!(poller.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_status_releases_handle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let poller = StatusPoller::new("test", Duration::from_millis(200));

        let sink = seen.clone();
        poller.start(
            counting_fetch(calls.clone()),
            |n| *n >= 3,
            move |n| sink.lock().push(*n),
        );

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!poller.is_active());
        assert_eq!(poller.stop_count(), 1);
        assert!(!poller.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_keeps_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let poller = StatusPoller::new("test", Duration::from_millis(200));

        poller.start(
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        Err("connection reset".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            |n| *n == 2,
            |_| {},
        );

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!poller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = StatusPoller::new("test", Duration::from_millis(200));
        poller.start(counting_fetch(calls.clone()), |_| false, |_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(poller.stop());
        assert!(!poller.stop());
        assert!(!poller.stop());
        assert_eq!(poller.stop_count(), 1);

        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_releases_prior_handle() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let poller = StatusPoller::new("test", Duration::from_millis(200));

        let id1 = poller.start(counting_fetch(first.clone()), |_| false, |_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;
        let id2 = poller.start(counting_fetch(second.clone()), |_| false, |_| {});
        assert_ne!(id1, id2);
        assert_eq!(poller.stop_count(), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert!(second.load(Ordering::SeqCst) >= 5);
        assert!(poller.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_fetch_drops_status() {
        let seen = Arc::new(AtomicUsize::new(0));
        let poller = StatusPoller::new("test", Duration::from_millis(200));

        let sink = seen.clone();
        poller.start(
            || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, String>(1)
            },
            |_| false,
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(poller.stop());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_poller_cancels_task() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = StatusPoller::new("test", Duration::from_millis(200));
        poller.start(counting_fetch(calls.clone()), |_| false, |_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(poller);

        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }
}
