//! Change propagation between chained table lenses.
//!
//! Every lens owns its own `ChangeListeners` list. When a lens invalidates (or
//! sees its upstream change) it builds a fresh, immutable `TableChangeEvent`
//! and fires it to the listeners registered on it. Filters register themselves
//! as listeners of their upstream when they are constructed, so a change at
//! the bottom of a chain ripples up through every layer.
//!
//! Listeners are held weakly: a filter that has been dropped simply stops
//! receiving events and is pruned the next time the list fires.

use std::sync::{Mutex, PoisonError, Weak};

/// Represents a single change to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    /// Derived state was discarded; row/column counts may differ afterwards
    Invalidated,

    /// A single cell value changed in place
    DataChanged { row: usize, col: usize },
}

/// Immutable notification built once per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableChangeEvent {
    pub change: TableChange,
}

impl TableChangeEvent {
    pub fn invalidated() -> Self {
        TableChangeEvent {
            change: TableChange::Invalidated,
        }
    }

    pub fn data_changed(row: usize, col: usize) -> Self {
        TableChangeEvent {
            change: TableChange::DataChanged { row, col },
        }
    }

    /// Returns true if this change can alter the row layout of dependents
    pub fn shifts_indices(&self) -> bool {
        matches!(self.change, TableChange::Invalidated)
    }
}

/// Receiver of table change notifications
pub trait ChangeListener: Send + Sync {
    fn table_changed(&self, event: &TableChangeEvent);
}

/// Observer list owned by a single lens instance.
#[derive(Default)]
pub struct ChangeListeners {
    listeners: Mutex<Vec<Weak<dyn ChangeListener>>>,
}

impl ChangeListeners {
    pub fn new() -> Self {
        ChangeListeners {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Weak<dyn ChangeListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Returns the number of listeners still alive
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every live listener.
    ///
    /// The list lock is released before delivery so listeners may register
    /// further listeners or fire their own events.
    pub fn fire(&self, event: TableChangeEvent) {
        let live: Vec<_> = {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in live {
            listener.table_changed(&event);
        }
    }
}

impl std::fmt::Debug for ChangeListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeListeners").field("live", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        hits: AtomicUsize,
    }

    impl ChangeListener for Counter {
        fn table_changed(&self, _event: &TableChangeEvent) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fire_reaches_live_listeners() {
        let list = ChangeListeners::new();
        let counter = Arc::new(Counter { hits: AtomicUsize::new(0) });
        let weak: Weak<dyn ChangeListener> = Arc::downgrade(&counter) as Weak<dyn ChangeListener>;
        list.add(weak);

        list.fire(TableChangeEvent::invalidated());
        list.fire(TableChangeEvent::data_changed(1, 2));
        assert_eq!(counter.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let list = ChangeListeners::new();
        {
            let counter = Arc::new(Counter { hits: AtomicUsize::new(0) });
            list.add(Arc::downgrade(&counter) as Weak<dyn ChangeListener>);
            assert_eq!(list.len(), 1);
        }
        list.fire(TableChangeEvent::invalidated());
        assert!(list.is_empty());
    }

    #[test]
    fn test_event_shifts_indices() {
        assert!(TableChangeEvent::invalidated().shifts_indices());
        assert!(!TableChangeEvent::data_changed(0, 0).shifts_indices());
    }
}
