//! A small multicast notification primitive used by session and relay types
//! to expose subscribable events (`authorized`, `connection_lost`, and so
//! on) without committing to a single consumer.

use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Handle returned by [`Subject::subscribe`]; pass it to
/// [`Subject::unsubscribe`] to detach the handler.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: SubscriptionId,
    handler: Handler<T>,
}

/// A typed, multi-subscriber event point.
///
/// Subscribers are snapshotted before each [`notify`][Subject::notify] call,
/// so a handler that detaches itself (or another handler) mid-dispatch
/// cannot corrupt the iteration in progress.
pub struct Subject<T> {
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Subject<T> {
    /// Creates an empty subject with no subscribers.
    pub fn new() -> Self {
        Subject {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers `handler` to be called on every future [`notify`][Subject::notify].
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Detaches the handler registered under `id`. A no-op if it has
    /// already been detached.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    /// Dispatches `event` to every currently-subscribed handler.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|s| s.handler.clone())
            .collect();

        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dispatches_to_all_subscribers() {
        let subject: Subject<u32> = Subject::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = total.clone();
        subject.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = total.clone();
        subject.subscribe(move |v| {
            t2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        subject.notify(&5);
        assert_eq!(total.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let subject: Subject<u32> = Subject::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = total.clone();
        let id = subject.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });

        subject.notify(&1);
        subject.unsubscribe(id);
        subject.notify(&1);

        assert_eq!(total.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself_mid_dispatch() {
        let subject: Arc<Subject<u32>> = Arc::new(Subject::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let weak_subject = Arc::downgrade(&subject);
        let calls_inner = calls.clone();
        let id_cell: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let id_cell_inner = id_cell.clone();
        let id = subject.subscribe(move |_| {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            if let Some(subject) = weak_subject.upgrade() {
                if let Some(id) = *id_cell_inner.lock() {
                    subject.unsubscribe(id);
                }
            }
        });
        *id_cell.lock() = Some(id);

        subject.notify(&0);
        subject.notify(&0);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
