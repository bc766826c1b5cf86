//! Observer registry and delivery contexts.
//!
//! Every callback registered on a request carries a [`DeliveryContext`]:
//! the execution context the callback must run on. Dispatch never calls a
//! consumer callback on the producer's path directly (unless the consumer
//! explicitly opted into [`DeliveryContext::Inline`]); delivery is an
//! enqueue onto the context, decoupling slow consumers from the sample
//! rate and from each other.
//!
//! Ordering guarantee: registration order is preserved per context.
//! No ordering is guaranteed across different contexts.
//!
//! # Example
//!
//! ```ignore
//! use geostream::observers::DeliveryContext;
//!
//! let (ctx, worker) = DeliveryContext::worker(&tokio::runtime::Handle::current());
//! request.on_update(ctx, |update| {
//!     println!("fix: {:.5}, {:.5}", update.location.latitude, update.location.longitude);
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::SensorError;
use crate::policy::Authorization;
use crate::request::{HeadingRequest, LocationRequest};
use crate::sample::{HeadingSample, LocationSample};

// =============================================================================
// Delivery Context
// =============================================================================

/// A unit of deferred callback work.
pub type DeliveryJob = Box<dyn FnOnce() + Send + 'static>;

/// The execution context a callback runs on.
#[derive(Clone)]
pub enum DeliveryContext {
    /// Run the callback synchronously at the point of delivery.
    ///
    /// The callback executes on the producer's dispatch path, so it must
    /// be cheap and must not block. Intended for tests and trivial
    /// consumers.
    Inline,

    /// Enqueue the callback onto a serial worker queue.
    ///
    /// Jobs sent to the same queue run in enqueue order on the worker
    /// task; see [`DeliveryContext::worker`].
    Queue(mpsc::UnboundedSender<DeliveryJob>),
}

impl DeliveryContext {
    /// Creates a serial worker context on the given runtime.
    ///
    /// Spawns a task that drains the queue in order; the task ends when
    /// every clone of the returned context has been dropped.
    pub fn worker(handle: &tokio::runtime::Handle) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<DeliveryJob>();
        let task = handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        (Self::Queue(tx), task)
    }

    /// Delivers a job on this context.
    ///
    /// For a queue context whose worker has gone away, the job is dropped
    /// with a warning; delivery is at-most-once, never retried.
    pub fn deliver(&self, job: impl FnOnce() + Send + 'static) {
        match self {
            Self::Inline => job(),
            Self::Queue(tx) => {
                if tx.send(Box::new(job)).is_err() {
                    warn!("delivery context worker is gone; dropping callback");
                }
            }
        }
    }
}

impl fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "Inline"),
            Self::Queue(_) => write!(f, "Queue"),
        }
    }
}

// =============================================================================
// Observer Set
// =============================================================================

struct ObserverEntry<E> {
    context: DeliveryContext,
    callback: Arc<dyn Fn(E) + Send + Sync>,
}

/// Ordered, append-only list of observers for one event kind.
///
/// Insertion order is delivery order (within a single context). Observers
/// are never removed for the life of the request.
pub struct ObserverSet<E> {
    entries: Vec<ObserverEntry<E>>,
}

impl<E> ObserverSet<E> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an observer.
    pub fn register(
        &mut self,
        context: DeliveryContext,
        callback: impl Fn(E) + Send + Sync + 'static,
    ) {
        self.entries.push(ObserverEntry {
            context,
            callback: Arc::new(callback),
        });
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: Clone + Send + 'static> ObserverSet<E> {
    /// Delivers `event` to every observer, cloning it per observer and
    /// enqueueing onto each observer's context in registration order.
    pub fn notify(&self, event: E) {
        for entry in &self.entries {
            let callback = Arc::clone(&entry.callback);
            let event = event.clone();
            entry.context.deliver(move || callback(event));
        }
    }
}

impl<E> Default for ObserverSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ObserverSet<E> {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| ObserverEntry {
                    context: e.context.clone(),
                    callback: Arc::clone(&e.callback),
                })
                .collect(),
        }
    }
}

impl<E> fmt::Debug for ObserverSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

// =============================================================================
// Event Payloads
// =============================================================================

/// An accepted position fix delivered to success observers.
#[derive(Clone)]
pub struct LocationUpdate {
    /// The request that accepted the sample.
    pub request: Arc<LocationRequest>,
    /// The accepted sample.
    pub location: LocationSample,
}

/// A timeout or provider error delivered to error observers.
#[derive(Clone)]
pub struct LocationFailure {
    /// The request the error was dispatched to.
    pub request: Arc<LocationRequest>,
    /// The most recent accepted sample, if any.
    pub last_location: Option<LocationSample>,
    /// The error itself.
    pub error: SensorError,
}

/// A platform authorization change observed while the request was running.
#[derive(Clone)]
pub struct AuthorizationChange {
    /// The request the change was dispatched to.
    pub request: Arc<LocationRequest>,
    /// Previous authorization level.
    pub old: Authorization,
    /// New authorization level.
    pub new: Authorization,
}

/// An accepted heading reading delivered to heading observers.
#[derive(Clone)]
pub struct HeadingUpdate {
    /// The request that accepted the reading.
    pub request: Arc<HeadingRequest>,
    /// The accepted reading.
    pub heading: HeadingSample,
}

/// An error delivered to a heading request's error observers.
#[derive(Clone)]
pub struct HeadingFailure {
    /// The request the error was dispatched to.
    pub request: Arc<HeadingRequest>,
    /// The error itself.
    pub error: SensorError,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_inline_delivery_preserves_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set: ObserverSet<u32> = ObserverSet::new();

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            set.register(DeliveryContext::Inline, move |v| {
                seen.lock().push((tag, v));
            });
        }

        set.notify(7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn test_empty_set_notify_is_noop() {
        let set: ObserverSet<u32> = ObserverSet::new();
        assert!(set.is_empty());
        set.notify(1);
    }

    #[tokio::test]
    async fn test_queue_delivery_runs_on_worker_in_order() {
        let (ctx, worker) = DeliveryContext::worker(&tokio::runtime::Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut set: ObserverSet<u32> = ObserverSet::new();
        for i in 0..3u32 {
            let seen = Arc::clone(&seen);
            set.register(ctx.clone(), move |v| {
                seen.lock().push((i, v));
            });
        }

        set.notify(1);
        set.notify(2);

        // Drop every sender so the worker drains and exits.
        drop(ctx);
        drop(set);
        worker.await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![(0, 1), (1, 1), (2, 1), (0, 2), (1, 2), (2, 2)]
        );
    }

    #[tokio::test]
    async fn test_delivery_after_worker_gone_is_dropped() {
        let (ctx, worker) = DeliveryContext::worker(&tokio::runtime::Handle::current());
        let sender = match &ctx {
            DeliveryContext::Queue(tx) => tx.clone(),
            _ => unreachable!(),
        };

        drop(ctx);
        // Worker exits once the last sender drops; keep `sender` alive so
        // we can observe the closed channel.
        worker.abort();
        let _ = worker.await;

        let fired = Arc::new(Mutex::new(false));
        let fired_clone = Arc::clone(&fired);
        DeliveryContext::Queue(sender).deliver(move || {
            *fired_clone.lock() = true;
        });
        assert!(!*fired.lock());
    }
}
