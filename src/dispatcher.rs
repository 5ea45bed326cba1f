//! Event fan-out under bounded concurrency
//!
//! One [`EventDispatcher`] serves one event kind. Each dispatch hands the
//! payload to every registered observer as its own tokio task; a semaphore
//! sized to a multiple of the available cores throttles how many observer
//! invocations run at once. The dispatcher counts outstanding invocations so
//! a run can wait for all of them before reporting its result.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Notify, Semaphore};

use crate::cancellation::CancellationSignal;

/// Observer callback for events of type `E`
pub type Observer<E> = Arc<dyn Fn(Arc<E>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Default number of concurrent observer invocations per available core
pub const DEFAULT_CONCURRENCY_MULTIPLIER: usize = 2;

pub struct EventDispatcher<E> {
    observers: Arc<Vec<Observer<E>>>,
    permits: Arc<Semaphore>,
    outstanding: Arc<Outstanding>,
}

#[derive(Debug, Default)]
struct Outstanding {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the outstanding count when an invocation finishes or unwinds
struct CompletionGuard(Arc<Outstanding>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl<E: Send + Sync + 'static> EventDispatcher<E> {
    pub fn new() -> Self {
        Self::with_concurrency(num_cpus::get() * DEFAULT_CONCURRENCY_MULTIPLIER)
    }

    /// Dispatcher running at most `max_concurrent` observer invocations at once
    pub fn with_concurrency(max_concurrent: usize) -> Self {
        Self {
            observers: Arc::new(Vec::new()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            outstanding: Arc::default(),
        }
    }

    /// Register an observer; observers are dispatched in registration order
    pub fn subscribe<F, Fut>(&mut self, observer: F)
    where
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let observer: Observer<E> = Arc::new(move |event| observer(event).boxed());
        Arc::make_mut(&mut self.observers).push(observer);
    }

    /// Remove every registered observer
    pub fn clear(&mut self) {
        self.observers = Arc::new(Vec::new());
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.count.load(Ordering::Acquire)
    }

    /// Hand `event` to every observer
    ///
    /// Stops submitting once `signal` is cancelled; invocations already
    /// submitted still run. Must be called within a tokio runtime.
    pub fn dispatch(&self, event: Arc<E>, signal: &CancellationSignal) {
        let observers = Arc::clone(&self.observers);
        for observer in observers.iter() {
            if signal.is_cancelled() {
                break;
            }

            self.outstanding.count.fetch_add(1, Ordering::AcqRel);
            let guard = CompletionGuard(Arc::clone(&self.outstanding));
            let permits = Arc::clone(&self.permits);
            let observer = Arc::clone(observer);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                let _guard = guard;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                observer(event).await;
            });
        }
    }

    /// Wait until every submitted invocation has finished
    pub async fn await_idle(&self) {
        loop {
            let idle = self.outstanding.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Wait until every submitted invocation has finished or `signal` is cancelled
    pub async fn await_drain(&self, signal: &CancellationSignal) {
        tokio::select! {
            _ = self.await_idle() => {}
            _ = signal.cancelled() => {}
        }
    }
}

impl<E: Send + Sync + 'static> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            observers: Arc::clone(&self.observers),
            permits: Arc::clone(&self.permits),
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

impl<E> std::fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.observers.len())
            .field("available_permits", &self.permits.available_permits())
            .field("outstanding", &self.outstanding.count.load(Ordering::Relaxed))
            .finish()
    }
}
