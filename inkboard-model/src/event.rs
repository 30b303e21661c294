// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A synchronous publish/subscribe dispatcher.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

type Listener<P> = Rc<RefCell<dyn FnMut(&P)>>;

/// Identifies a subscription so it can be removed later.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ListenerHandle {
    id: u64,
}

struct DispatcherState<K, P> {
    listeners: HashMap<K, Vec<(u64, Listener<P>)>>,
    next_id: u64,
}

/// Dispatches typed events to subscribed listeners.
///
/// Dispatch is synchronous and ordered by subscription order. Listeners
/// subscribed while a dispatch is running do not see the current event;
/// they fire from the next dispatch on. Subscribing from inside a
/// listener is allowed.
pub struct EventDispatcher<K, P> {
    state: RefCell<DispatcherState<K, P>>,
}

impl<K: Copy + Eq + Hash, P> Default for EventDispatcher<K, P> {
    fn default() -> Self {
        EventDispatcher {
            state: RefCell::new(DispatcherState {
                listeners: HashMap::new(),
                next_id: 0,
            }),
        }
    }
}

impl<K: Copy + Eq + Hash, P> EventDispatcher<K, P> {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to events of `kind`.
    pub fn subscribe<F: FnMut(&P) + 'static>(&self, kind: K, listener: F) -> ListenerHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state
            .listeners
            .entry(kind)
            .or_insert_with(Vec::new)
            .push((id, Rc::new(RefCell::new(listener))));
        ListenerHandle { id }
    }

    /// Removes a subscription. Unknown handles are ignored.
    pub fn unsubscribe(&self, handle: ListenerHandle) {
        let mut state = self.state.borrow_mut();
        for listeners in state.listeners.values_mut() {
            listeners.retain(|(id, _)| *id != handle.id);
        }
    }

    /// Synchronously notifies every listener of `kind`, in subscription
    /// order.
    pub fn dispatch(&self, kind: K, payload: &P) {
        // Snapshot under a short borrow so listeners can subscribe or
        // unsubscribe; additions only take effect from the next dispatch.
        let snapshot: Vec<Listener<P>> = {
            let state = self.state.borrow();
            match state.listeners.get(&kind) {
                Some(listeners) => listeners.iter().map(|(_, l)| Rc::clone(l)).collect(),
                None => return,
            }
        };

        for listener in snapshot {
            (listener.borrow_mut())(payload);
        }
    }

    /// The number of listeners currently subscribed to `kind`.
    pub fn listener_count(&self, kind: K) -> usize {
        self.state.borrow().listeners.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        A,
        B,
    }

    #[test]
    fn dispatch_is_ordered_by_subscription() {
        let dispatcher: EventDispatcher<Kind, u32> = EventDispatcher::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in 0..3 {
            let order = Rc::clone(&order);
            dispatcher.subscribe(Kind::A, move |payload: &u32| {
                order.borrow_mut().push((tag, *payload));
            });
        }

        dispatcher.dispatch(Kind::A, &7);
        assert_eq!(&*order.borrow(), &[(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher: EventDispatcher<Kind, u32> = EventDispatcher::new();
        let count = Rc::new(RefCell::new(0));

        let handle = {
            let count = Rc::clone(&count);
            dispatcher.subscribe(Kind::B, move |_| *count.borrow_mut() += 1)
        };

        dispatcher.dispatch(Kind::B, &0);
        dispatcher.unsubscribe(handle);
        dispatcher.dispatch(Kind::B, &0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn listeners_added_during_dispatch_fire_next_time() {
        let dispatcher: Rc<EventDispatcher<Kind, u32>> = Rc::new(EventDispatcher::new());
        let late_calls = Rc::new(RefCell::new(0));

        {
            let dispatcher_inner = Rc::clone(&dispatcher);
            let late_calls = Rc::clone(&late_calls);
            dispatcher.subscribe(Kind::A, move |_| {
                let late_calls = Rc::clone(&late_calls);
                dispatcher_inner.subscribe(Kind::A, move |_| *late_calls.borrow_mut() += 1);
            });
        }

        dispatcher.dispatch(Kind::A, &0);
        assert_eq!(*late_calls.borrow(), 0);

        dispatcher.dispatch(Kind::A, &0);
        assert_eq!(*late_calls.borrow(), 1);
    }
}
