//! Event listeners shared between a primitive's handle and its
//! deferred tasks.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// An event with a kind listeners can subscribe to
pub trait Event {
    type Kind: Copy + Eq + fmt::Debug + Send + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Event callback
pub type Listener<E> = Box<dyn FnMut(&E) + Send + 'static>;

/// Listener registry. Clones share the same listeners.
pub struct EventTarget<E: Event> {
    listeners: Arc<Mutex<Vec<(E::Kind, Listener<E>)>>>,
}

impl<E: Event> EventTarget<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_listener<F>(&self, kind: E::Kind, listener: F)
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, Box::new(listener)));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Call every listener registered for the event's kind, in registration
    /// order. Listeners may register further listeners while running; those
    /// only see later events. Returns the number of listeners called.
    pub fn dispatch(&self, event: &E) -> usize {
        let kind = event.kind();
        let mut current = std::mem::take(&mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner));

        let mut called = 0;
        for (listener_kind, listener) in current.iter_mut() {
            if *listener_kind == kind {
                listener(event);
                called += 1;
            }
        }

        let mut guard = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        current.append(&mut guard);
        *guard = current;
        called
    }
}

impl<E: Event> Clone for EventTarget<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<E: Event> Default for EventTarget<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventTarget<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping(u8);

    impl Event for Ping {
        type Kind = bool;

        fn kind(&self) -> bool {
            self.0 % 2 == 0
        }
    }

    #[test]
    fn test_dispatch_by_kind() {
        let target = EventTarget::<Ping>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let even = seen.clone();
        target.add_listener(true, move |p: &Ping| even.lock().unwrap().push(p.0));

        assert_eq!(target.dispatch(&Ping(1)), 0);
        assert_eq!(target.dispatch(&Ping(2)), 1);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_listener_added_during_dispatch() {
        let target = EventTarget::<Ping>::new();
        let inner = target.clone();
        let hits = Arc::new(Mutex::new(0));

        let counter = hits.clone();
        target.add_listener(true, move |_: &Ping| {
            let counter = counter.clone();
            inner.add_listener(true, move |_: &Ping| *counter.lock().unwrap() += 1);
        });

        target.dispatch(&Ping(0));
        assert_eq!(*hits.lock().unwrap(), 0);
        assert_eq!(target.listener_count(), 2);

        target.dispatch(&Ping(0));
        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
