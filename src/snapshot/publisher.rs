use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Notify};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Queued updates evicted to make room for this one.
    pub dropped: usize,
    pub closed: usize,
}

/// One subscriber's bounded queue. When full, the oldest entry goes.
struct Slot<T> {
    queue: Mutex<VecDeque<Arc<T>>>,
    notify: Notify,
    subscriber_gone: AtomicBool,
    publisher_gone: AtomicBool,
}

impl<T> Slot<T> {
    fn pop(&self) -> Option<Arc<T>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

/// Holds the current value behind an atomic swap and fans it out to
/// subscribers through bounded queues. A subscriber that falls behind loses
/// its oldest queued updates, so the newest is always delivered; the
/// publisher never waits on a subscriber.
pub struct Publisher<T> {
    current: watch::Sender<Arc<T>>,
    subscribers: Mutex<Vec<Arc<Slot<T>>>>,
    queue_depth: usize,
    dropped: AtomicU64,
}

pub struct Subscription<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Subscription<T> {
    /// Next queued update, or `None` once the publisher is gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        loop {
            let notified = self.slot.notify.notified();
            if let Some(value) = self.slot.pop() {
                return Some(value);
            }
            if self.slot.publisher_gone.load(Ordering::Acquire) {
                return self.slot.pop();
            }
            notified.await;
        }
    }

    pub fn try_recv(&mut self) -> Option<Arc<T>> {
        self.slot.pop()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.slot.subscriber_gone.store(true, Ordering::Release);
    }
}

impl<T: Send + Sync + 'static> Publisher<T> {
    pub fn new(initial: T, queue_depth: usize) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self {
            current,
            subscribers: Mutex::new(Vec::new()),
            queue_depth: queue_depth.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn latest(&self) -> Arc<T> {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<T>> {
        self.current.subscribe()
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let slot = Arc::new(Slot {
            queue: Mutex::new(VecDeque::with_capacity(self.queue_depth)),
            notify: Notify::new(),
            subscriber_gone: AtomicBool::new(false),
            publisher_gone: AtomicBool::new(false),
        });
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(slot.clone());
        Subscription { slot }
    }

    pub fn publish(&self, value: Arc<T>) -> PublishReport {
        self.current.send_replace(value.clone());

        let mut report = PublishReport::default();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|slot| {
            if slot.subscriber_gone.load(Ordering::Acquire) {
                report.closed += 1;
                return false;
            }
            {
                let mut queue = slot.queue.lock().unwrap_or_else(PoisonError::into_inner);
                if queue.len() >= self.queue_depth {
                    queue.pop_front();
                    report.dropped += 1;
                }
                queue.push_back(value.clone());
            }
            slot.notify.notify_one();
            report.delivered += 1;
            true
        });

        if report.dropped > 0 {
            self.dropped
                .fetch_add(report.dropped as u64, Ordering::Relaxed);
            log::debug!(
                "{} subscriber(s) behind, oldest update dropped",
                report.dropped
            );
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        let subscribers = self
            .subscribers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for slot in subscribers.drain(..) {
            slot.publisher_gone.store(true, Ordering::Release);
            slot.notify.notify_one();
        }
    }
}
