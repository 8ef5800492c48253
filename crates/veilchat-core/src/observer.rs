//! Multi-subscriber callback registry with disposable subscriptions.
//!
//! The transport notifies observers synchronously, so delivery to a
//! single subscriber is strictly in arrival order. There is no ordering
//! guarantee across distinct subscribers. Disposal is idempotent; a
//! dropped [`Subscription`] handle does NOT unsubscribe -- callers must
//! call [`Subscription::dispose`] explicitly.

use std::sync::{Arc, Mutex, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct RegistryInner<E> {
    next_id: u64,
    /// Registration order is preserved; iteration visits older
    /// subscribers first.
    observers: Vec<(u64, Callback<E>)>,
}

/// Observer registry for one event kind.
pub struct ObserverRegistry<E> {
    inner: Arc<Mutex<RegistryInner<E>>>,
}

impl<E> ObserverRegistry<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Register a callback. The returned handle unsubscribes via
    /// [`Subscription::dispose`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.push((id, Arc::new(callback)));

        let weak = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Mutex::new(Some(Box::new(move || {
                if let Some(inner) = Weak::upgrade(&weak) {
                    let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
                    inner.observers.retain(|(oid, _)| *oid != id);
                }
            }))),
        }
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Callbacks are cloned out of the lock before invocation so a
    /// callback may subscribe or dispose without deadlocking.
    pub fn notify(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.observers.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .observers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ObserverRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Handle that removes a registered callback.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Remove the callback from its registry. Safe to call repeatedly;
    /// only the first call has an effect.
    pub fn dispose(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));

        let a2 = a.clone();
        let _sa = registry.subscribe(move |v| {
            a2.fetch_add(*v, Ordering::SeqCst);
        });
        let b2 = b.clone();
        let _sb = registry.subscribe(move |v| {
            b2.fetch_add(*v, Ordering::SeqCst);
        });

        registry.notify(&5);
        assert_eq!(a.load(Ordering::SeqCst), 5);
        assert_eq!(b.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_delivery_order_within_one_subscriber() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = registry.subscribe(move |v| seen2.lock().unwrap().push(*v));

        for v in [1u32, 2, 3, 4] {
            registry.notify(&v);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_dispose_removes_subscriber() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let c2 = count.clone();
        let sub = registry.subscribe(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&1);
        sub.dispose();
        registry.notify(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let sub = registry.subscribe(|_| {});
        sub.dispose();
        sub.dispose();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_does_not_unsubscribe() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let c2 = count.clone();
        let sub = registry.subscribe(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        registry.notify(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
