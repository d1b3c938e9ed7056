//! Typed publish/subscribe.
//!
//! One `EventBus<E>` per event family, where `E` is a closed enum of event
//! payloads. Each listener call is isolated: a panicking listener is logged
//! and skipped, the remaining listeners still run.

use std::panic::{AssertUnwindSafe, catch_unwind};

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Box<dyn Fn(&E)>;

pub struct EventBus<E> {
    listeners: Vec<(SubscriptionId, Listener<E>)>,
    next_id: u64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, listener: impl Fn(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener in subscription order.
    /// Returns the number of listeners that completed without panicking.
    pub fn emit(&self, event: &E) -> usize {
        let mut delivered = 0;
        for (id, listener) in &self.listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => log::error!("event listener {id:?} panicked; skipping"),
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    enum Ping {
        Hello(u32),
    }

    #[test]
    fn listeners_receive_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let s1 = seen.clone();
        bus.subscribe(move |e: &Ping| s1.borrow_mut().push(format!("first {e:?}")));
        let s2 = seen.clone();
        bus.subscribe(move |e: &Ping| s2.borrow_mut().push(format!("second {e:?}")));

        assert_eq!(bus.emit(&Ping::Hello(1)), 2);
        assert_eq!(
            *seen.borrow(),
            vec!["first Hello(1)".to_string(), "second Hello(1)".to_string()]
        );
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let hits = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        bus.subscribe(|_: &Ping| panic!("listener bug"));
        let h = hits.clone();
        bus.subscribe(move |_: &Ping| *h.borrow_mut() += 1);

        assert_eq!(bus.emit(&Ping::Hello(7)), 1);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let mut bus: EventBus<Ping> = EventBus::new();
        let id = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(bus.is_empty());
    }
}
