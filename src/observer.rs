//! Typed listener registry
//!
//! Components own an `Observers<E>` and call [`Observers::notify`] for each
//! event. Any number of listeners can register; each registration returns a
//! [`SubscriptionId`] that removes exactly that listener.

use std::fmt;

/// Handle returned by [`Observers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Box<dyn FnMut(&E)>;

pub struct Observers<E> {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener<E>)>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    /// Register a listener; it is called in registration order
    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn notify(&mut self, event: &E) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_all_listeners_receive_events() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::new();

        let a = Rc::clone(&seen);
        observers.subscribe(move |e: &u32| a.borrow_mut().push(("a", *e)));
        let b = Rc::clone(&seen);
        observers.subscribe(move |e: &u32| b.borrow_mut().push(("b", *e)));

        observers.notify(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let count = Rc::new(RefCell::new(0));
        let mut observers = Observers::new();

        let c1 = Rc::clone(&count);
        let first = observers.subscribe(move |_: &()| *c1.borrow_mut() += 1);
        let c2 = Rc::clone(&count);
        observers.subscribe(move |_: &()| *c2.borrow_mut() += 10);

        assert!(observers.unsubscribe(first));
        assert!(!observers.unsubscribe(first));

        observers.notify(&());
        assert_eq!(*count.borrow(), 10);
        assert_eq!(observers.len(), 1);
    }
}
