use super::types::{Notification, ServerEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, warn};

type Callback = dyn Fn(ServerEvent, Arc<Notification>) + Send + Sync;

struct Subscriber {
    active: AtomicBool,
    callback: Box<Callback>,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<HashMap<u64, Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: u64) {
        match self.subscribers.write() {
            Ok(mut subscribers) => {
                subscribers.remove(&id);
            }
            Err(poisoned) => {
                warn!("Notification subscriber lock poisoned, recovering");
                poisoned.into_inner().remove(&id);
            }
        }
    }
}

/// Publish/subscribe hub for server events.
///
/// Each publish schedules one independent task per subscriber, so a slow or
/// panicking callback never delays or prevents delivery to the others.
/// Cloning is cheap and every clone shares the same subscriber set.
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl NotificationBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Delivery stops when the returned handle is
    /// unsubscribed or dropped.
    #[must_use]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ServerEvent, Arc<Notification>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        });

        match self.inner.subscribers.write() {
            Ok(mut subscribers) => {
                subscribers.insert(id, subscriber.clone());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, subscriber.clone());
            }
        }

        debug!(subscription = id, "Notification subscriber added");
        Subscription {
            id,
            subscriber,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Schedule delivery of an event to every current subscriber.
    ///
    /// Returns the number of deliveries scheduled. Must be called from within
    /// a tokio runtime.
    pub fn publish(&self, event: ServerEvent, notification: Notification) -> usize {
        let notification = Arc::new(notification);
        let subscribers: Vec<Arc<Subscriber>> = match self.inner.subscribers.read() {
            Ok(subscribers) => subscribers.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };

        for subscriber in &subscribers {
            let subscriber = subscriber.clone();
            let notification = notification.clone();
            tokio::spawn(async move {
                if subscriber.active.load(Ordering::Acquire) {
                    (subscriber.callback)(event, notification);
                }
            });
        }

        debug!(event = %event, deliveries = subscribers.len(), "Notification published");
        subscribers.len()
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        match self.inner.subscribers.read() {
            Ok(subscribers) => subscribers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Handle for one registered callback.
pub struct Subscription {
    id: u64,
    subscriber: Arc<Subscriber>,
    bus: Weak<BusInner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Stop delivery to this callback. Idempotent.
    ///
    /// Deliveries already scheduled but not yet run are suppressed.
    pub fn unsubscribe(&self) {
        if self.subscriber.active.swap(false, Ordering::AcqRel) {
            if let Some(bus) = self.bus.upgrade() {
                bus.remove(self.id);
            }
            debug!(subscription = self.id, "Notification subscriber removed");
        }
    }

    /// Whether the callback still receives events.
    pub fn is_active(&self) -> bool {
        self.subscriber.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
