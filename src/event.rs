//! Rule and link events, and the listener list they fan out through.
//!
//! Events are plain enums dispatched through [`Listeners`], which snapshots
//! the subscriber list before calling out so a listener can subscribe or
//! unsubscribe (or mutate the emitting object) without invalidating the
//! iteration in progress.

use std::rc::Rc;

use crate::key::PropertyKey;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Change notifications fired by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEvent {
    /// A single property changed (set, updated, or removed).
    PropertyChanged(PropertyKey),
    /// The rule's selector changed.
    SelectorChanged,
    /// Many properties changed at once; readers should re-resolve everything.
    PropertiesChanged,
}

/// Change notifications fired by a link in a rule chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link was removed from its chain. A removed link is never reused.
    Removed,
    /// The link's `previous` neighbor changed.
    PreviousChanged,
    /// The link's `next` neighbor changed.
    NextChanged,
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Identifies one subscription on a [`Listeners`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// A handle that is never registered anywhere; unsubscribing it is a
    /// no-op. Used by rules that have nothing to notify.
    pub const DEAD: ListenerHandle = ListenerHandle(u64::MAX);
}

/// An ordered list of event subscribers.
///
/// Plain data — embed inside whatever interior-mutability wrapper the owner
/// already uses. Dispatch via [`Listeners::snapshot`] + [`emit`] so no borrow
/// of the owner is held while subscriber code runs.
pub struct Listeners<E> {
    next_id: u64,
    entries: Vec<(u64, Rc<dyn Fn(&E)>)>,
}

impl<E> Listeners<E> {
    /// Create an empty listener list.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Register a listener; returns a handle for later removal.
    pub fn subscribe(&mut self, listener: Rc<dyn Fn(&E)>) -> ListenerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        ListenerHandle(id)
    }

    /// Remove a previously registered listener. Unknown handles are ignored.
    pub fn unsubscribe(&mut self, handle: ListenerHandle) {
        self.entries.retain(|(id, _)| *id != handle.0);
    }

    /// Clone out the current subscribers, in subscription order.
    pub fn snapshot(&self) -> Vec<Rc<dyn Fn(&E)>> {
        self.entries.iter().map(|(_, l)| Rc::clone(l)).collect()
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Deliver `event` to a snapshot of subscribers.
pub fn emit<E>(snapshot: &[Rc<dyn Fn(&E)>], event: &E) {
    for listener in snapshot {
        listener(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn subscribe_and_emit() {
        let mut listeners: Listeners<RuleEvent> = Listeners::new();
        let count = Rc::new(Cell::new(0));
        let count_c = count.clone();
        listeners.subscribe(Rc::new(move |_| count_c.set(count_c.get() + 1)));

        emit(&listeners.snapshot(), &RuleEvent::SelectorChanged);
        emit(&listeners.snapshot(), &RuleEvent::PropertiesChanged);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut listeners: Listeners<LinkEvent> = Listeners::new();
        let count = Rc::new(Cell::new(0));
        let count_c = count.clone();
        let handle = listeners.subscribe(Rc::new(move |_| count_c.set(count_c.get() + 1)));

        emit(&listeners.snapshot(), &LinkEvent::Removed);
        listeners.unsubscribe(handle);
        emit(&listeners.snapshot(), &LinkEvent::Removed);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unsubscribe_unknown_handle_is_noop() {
        let mut listeners: Listeners<LinkEvent> = Listeners::new();
        listeners.unsubscribe(ListenerHandle::DEAD);
        assert!(listeners.is_empty());
    }

    #[test]
    fn snapshot_is_ordered() {
        let mut listeners: Listeners<RuleEvent> = Listeners::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let log_c = log.clone();
            listeners.subscribe(Rc::new(move |_| log_c.borrow_mut().push(tag)));
        }
        emit(&listeners.snapshot(), &RuleEvent::PropertiesChanged);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn snapshot_tolerates_mutation_during_dispatch() {
        // A listener unsubscribing itself mid-dispatch must not skip or
        // double-deliver to the others.
        let listeners = Rc::new(RefCell::new(Listeners::<RuleEvent>::new()));
        let count = Rc::new(Cell::new(0));

        let listeners_c = listeners.clone();
        let handle = Rc::new(Cell::new(ListenerHandle::DEAD));
        let handle_c = handle.clone();
        let self_removing = listeners.borrow_mut().subscribe(Rc::new(move |_| {
            listeners_c.borrow_mut().unsubscribe(handle_c.get());
        }));
        handle.set(self_removing);

        let count_c = count.clone();
        listeners
            .borrow_mut()
            .subscribe(Rc::new(move |_| count_c.set(count_c.get() + 1)));

        let snapshot = listeners.borrow().snapshot();
        emit(&snapshot, &RuleEvent::PropertiesChanged);
        assert_eq!(count.get(), 1);
        assert_eq!(listeners.borrow().len(), 1);
    }

    #[test]
    fn event_equality() {
        let key: PropertyKey = "color".into();
        assert_eq!(
            RuleEvent::PropertyChanged(key.clone()),
            RuleEvent::PropertyChanged(key)
        );
        assert_ne!(LinkEvent::Removed, LinkEvent::NextChanged);
    }
}
