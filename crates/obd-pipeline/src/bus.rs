//! Fan-out bus
//!
//! Distributes accepted readings to independently paced subscribers. The
//! publisher never waits: each subscription owns a bounded queue and a
//! slow consumer loses its own oldest readings instead of stalling the
//! store or other consumers.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use obd_core::{MetricId, Reading};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

/// Which metrics a subscription receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Metrics(BTreeSet<MetricId>),
}

impl Filter {
    pub fn metrics<I, M>(ids: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MetricId>,
    {
        Filter::Metrics(ids.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, metric: &MetricId) -> bool {
        match self {
            Filter::All => true,
            Filter::Metrics(ids) => ids.contains(metric),
        }
    }
}

struct SubscriberQueue {
    filter: Filter,
    capacity: usize,
    pending: Mutex<VecDeque<Reading>>,
    notify: Notify,
    closed: AtomicBool,
    overruns: AtomicU64,
}

impl SubscriberQueue {
    /// Enqueue without waiting; returns true if a pending reading was dropped
    fn push(&self, reading: &Reading) -> bool {
        let overrun = {
            let mut pending = self.pending.lock();
            let overrun = pending.len() >= self.capacity;
            if overrun {
                // Prefer dropping a superseded value of the same metric
                match pending.iter().position(|r| r.metric == reading.metric) {
                    Some(pos) => {
                        pending.remove(pos);
                    }
                    None => {
                        pending.pop_front();
                    }
                }
            }
            pending.push_back(reading.clone());
            overrun
        };

        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        overrun
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
        self.notify.notify_one();
    }
}

struct BusInner {
    subscribers: RwLock<HashMap<Uuid, Arc<SubscriberQueue>>>,
    queue_capacity: usize,
    overruns: AtomicU64,
    closed: AtomicBool,
}

impl BusInner {
    fn remove(&self, id: &Uuid) {
        if let Some(queue) = self.subscribers.write().remove(id) {
            queue.close();
            debug!(subscription = %id, "Subscription removed");
        }
    }
}

/// Handle to the fan-out bus; clones share the same subscribers
#[derive(Clone)]
pub struct FanoutBus {
    inner: Arc<BusInner>,
}

impl FanoutBus {
    /// Create a bus whose subscriptions hold at most `queue_capacity` readings
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                queue_capacity: queue_capacity.max(1),
                overruns: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self, filter: Filter) -> Subscription {
        self.subscribe_with_capacity(filter, self.inner.queue_capacity)
    }

    /// Subscribe with a queue capacity other than the bus default
    pub fn subscribe_with_capacity(&self, filter: Filter, capacity: usize) -> Subscription {
        let id = Uuid::new_v4();
        let queue = Arc::new(SubscriberQueue {
            filter,
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            notify: Notify::new(),
            closed: AtomicBool::new(self.inner.closed.load(Ordering::SeqCst)),
            overruns: AtomicU64::new(0),
        });

        if !queue.closed.load(Ordering::SeqCst) {
            self.inner.subscribers.write().insert(id, queue.clone());
            debug!(subscription = %id, filter = ?queue.filter, "Subscription created");
        }

        Subscription {
            id,
            queue,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription; pending readings are discarded
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Deliver a reading to every matching subscription
    pub(crate) fn publish(&self, reading: &Reading) {
        let subscribers = self.inner.subscribers.read();
        for (id, queue) in subscribers.iter() {
            if !queue.filter.matches(&reading.metric) {
                continue;
            }
            if queue.push(reading) {
                self.inner.overruns.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subscription = %id,
                    metric = %reading.metric,
                    overruns = queue.overruns.load(Ordering::Relaxed),
                    "Subscriber overrun, dropped oldest pending reading"
                );
            }
        }
    }

    /// End every subscription; later subscriptions are closed on creation
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.inner.subscribers.write().drain().collect();
        for (_, queue) in &drained {
            queue.close();
        }
        info!(subscriptions = drained.len(), "Fan-out bus closed");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Overruns across all subscriptions since the bus was created
    pub fn total_overruns(&self) -> u64 {
        self.inner.overruns.load(Ordering::Relaxed)
    }
}

/// Consumer handle into the bus
///
/// Dropping the handle unsubscribes and discards any pending readings.
pub struct Subscription {
    id: Uuid,
    queue: Arc<SubscriberQueue>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> &Filter {
        &self.queue.filter
    }

    /// Next pending reading, waiting if none; `None` once the subscription is closed
    pub async fn recv(&mut self) -> Option<Reading> {
        loop {
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(reading) = self.queue.pending.lock().pop_front() {
                return Some(reading);
            }
            self.queue.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<Reading> {
        if self.queue.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.queue.pending.lock().pop_front()
    }

    /// Readings waiting to be received
    pub fn len(&self) -> usize {
        self.queue.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity
    }

    /// Readings dropped from this subscription's queue
    pub fn overruns(&self) -> u64 {
        self.queue.overruns.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match self.bus.upgrade() {
            Some(bus) => bus.remove(&self.id),
            None => self.queue.close(),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.queue.filter)
            .field("pending", &self.len())
            .field("overruns", &self.overruns())
            .finish()
    }
}
