//! Change notification fan-out.
//!
//! Consumers subscribe narrowly to one [`ChangeKind`] and receive only those
//! events, keyed by a [`SubscriptionId`] for later removal. The engine emits
//! after every committed mutation; callbacks run synchronously on the
//! mutation thread and must stay cheap.

use crate::selection::Selection;

/// The categories a consumer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Document text changed.
    Text,
    /// Selection changed without a text change.
    Selection,
    /// Fold ranges or fold state changed.
    Folds,
    /// Derived decorations (highlight spans and the like) changed.
    Decorations,
}

/// A change event delivered to subscribers of the matching kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Text changed; `first_line..=last_line` is the dirty region.
    Text {
        /// First affected line.
        first_line: usize,
        /// Last affected line.
        last_line: usize,
    },
    /// The selection moved.
    Selection {
        /// The new selection.
        selection: Selection,
    },
    /// Fold ranges were added, removed, adjusted, or toggled.
    Folds,
    /// Decorations were invalidated.
    Decorations,
}

impl ChangeEvent {
    /// The kind this event is delivered under.
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Text { .. } => ChangeKind::Text,
            ChangeEvent::Selection { .. } => ChangeKind::Selection,
            ChangeEvent::Folds => ChangeKind::Folds,
            ChangeEvent::Decorations => ChangeKind::Decorations,
        }
    }
}

/// Handle returned by [`EventRegistry::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&ChangeEvent)>;

/// Publish/subscribe registry keyed by [`ChangeKind`].
#[derive(Default)]
pub struct EventRegistry {
    next_id: u64,
    // One subscriber list per kind, indexed by kind_slot.
    subscribers: [Vec<(SubscriptionId, Callback)>; 4],
}

fn kind_slot(kind: ChangeKind) -> usize {
    match kind {
        ChangeKind::Text => 0,
        ChangeKind::Selection => 1,
        ChangeKind::Folds => 2,
        ChangeKind::Decorations => 3,
    }
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `callback` to events of `kind`.
    pub fn subscribe<F>(&mut self, kind: ChangeKind, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeEvent) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers[kind_slot(kind)].push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` when the id is unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for list in &mut self.subscribers {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver `event` to every subscriber of its kind, in subscription order.
    pub fn emit(&mut self, event: &ChangeEvent) {
        for (_, callback) in &mut self.subscribers[kind_slot(event.kind())] {
            callback(event);
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("next_id", &self.next_id)
            .field(
                "subscriber_counts",
                &self.subscribers.each_ref().map(Vec::len),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_subscribers_only_see_their_kind() {
        let mut registry = EventRegistry::new();
        let text_events = Rc::new(RefCell::new(0));
        let fold_events = Rc::new(RefCell::new(0));

        let t = Rc::clone(&text_events);
        registry.subscribe(ChangeKind::Text, move |_| *t.borrow_mut() += 1);
        let f = Rc::clone(&fold_events);
        registry.subscribe(ChangeKind::Folds, move |_| *f.borrow_mut() += 1);

        registry.emit(&ChangeEvent::Text {
            first_line: 0,
            last_line: 0,
        });
        registry.emit(&ChangeEvent::Folds);
        registry.emit(&ChangeEvent::Folds);

        assert_eq!(*text_events.borrow(), 1);
        assert_eq!(*fold_events.borrow(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut registry = EventRegistry::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = registry.subscribe(ChangeKind::Selection, move |_| *c.borrow_mut() += 1);

        let event = ChangeEvent::Selection {
            selection: Selection::collapsed(0),
        };
        registry.emit(&event);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.emit(&event);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_event_carries_dirty_region() {
        let mut registry = EventRegistry::new();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        registry.subscribe(ChangeKind::Text, move |event| {
            *s.borrow_mut() = Some(event.clone());
        });
        registry.emit(&ChangeEvent::Text {
            first_line: 3,
            last_line: 7,
        });
        assert_eq!(
            *seen.borrow(),
            Some(ChangeEvent::Text {
                first_line: 3,
                last_line: 7
            })
        );
    }
}
