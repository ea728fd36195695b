#![forbid(unsafe_code)]

//! Ordered collection with membership lifetimes and mutation hooks.
//!
//! Every mutation follows the same shape: *before* hook, mutate the backing
//! vector, create/dispose membership lifetimes, *after* hook, then exactly one
//! [`changed`](ObservableCollection::changed) signal. [`clear`] is a sequence
//! of front removals, so it signals once per removed item.
//!
//! [`clear`]: ObservableCollection::clear

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ftick_core::{Event, Lifetime};

use crate::error::{RuntimeError, RuntimeResult};

/// Payload for item-level collection events.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChange<T> {
    /// The item added, removed or assigned.
    pub item: T,
    /// Its index at the time of the event.
    pub index: usize,
}

struct Member<T> {
    item: T,
    membership: Lifetime,
}

struct CollectionInner<T> {
    members: RefCell<Vec<Member<T>>>,
    before_added: Event<CollectionChange<T>>,
    before_removed: Event<CollectionChange<T>>,
    added: Event<CollectionChange<T>>,
    removed: Event<CollectionChange<T>>,
    index_assigned: Event<CollectionChange<T>>,
    changed: Event<()>,
}

/// Shared, observable, ordered list.
pub struct ObservableCollection<T> {
    inner: Rc<CollectionInner<T>>,
}

impl<T> Clone for ObservableCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for ObservableCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObservableCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCollection")
            .field("len", &self.inner.members.borrow().len())
            .finish()
    }
}

impl<T: Clone + 'static> ObservableCollection<T> {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(CollectionInner {
                members: RefCell::new(Vec::new()),
                before_added: Event::new(),
                before_removed: Event::new(),
                added: Event::new(),
                removed: Event::new(),
                index_assigned: Event::new(),
                changed: Event::new(),
            }),
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Fires before an item is inserted.
    pub fn before_added(&self) -> &Event<CollectionChange<T>> {
        &self.inner.before_added
    }

    /// Fires before an item is removed.
    pub fn before_removed(&self) -> &Event<CollectionChange<T>> {
        &self.inner.before_removed
    }

    /// Fires after an item was inserted.
    pub fn added(&self) -> &Event<CollectionChange<T>> {
        &self.inner.added
    }

    /// Fires after an item was removed.
    pub fn removed(&self) -> &Event<CollectionChange<T>> {
        &self.inner.removed
    }

    /// Fires after an index was overwritten by [`set`](Self::set).
    pub fn index_assigned(&self) -> &Event<CollectionChange<T>> {
        &self.inner.index_assigned
    }

    /// Fires once at the end of every mutation.
    pub fn changed(&self) -> &Event<()> {
        &self.inner.changed
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    /// Whether the collection holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the item at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.members.borrow().get(index).map(|m| m.item.clone())
    }

    /// Snapshot of the current items.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner
            .members
            .borrow()
            .iter()
            .map(|m| m.item.clone())
            .collect()
    }

    /// Lifetime that expires when the item at `index` leaves the collection.
    pub fn membership_lifetime(&self, index: usize) -> RuntimeResult<Lifetime> {
        let members = self.inner.members.borrow();
        members
            .get(index)
            .map(|m| m.membership.clone())
            .ok_or(RuntimeError::IndexOutOfBounds {
                index,
                len: members.len(),
            })
    }

    fn check_index(&self, index: usize, len_inclusive: bool) -> RuntimeResult<()> {
        let len = self.len();
        let ok = if len_inclusive { index <= len } else { index < len };
        if ok {
            Ok(())
        } else {
            Err(RuntimeError::IndexOutOfBounds { index, len })
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Append `item`.
    ///
    /// Fails with [`RuntimeError::IndexOutOfBounds`] when a `before_added`
    /// hook shrinks the collection below the append position.
    pub fn add(&self, item: T) -> RuntimeResult<()> {
        self.insert(self.len(), item)
    }

    /// Insert `item` at `index` (`0..=len`).
    pub fn insert(&self, index: usize, item: T) -> RuntimeResult<()> {
        self.check_index(index, true)?;
        let change = CollectionChange { item, index };
        self.inner.before_added.fire(&change);
        // Hooks may have mutated the collection.
        self.check_index(index, true)?;

        self.inner.members.borrow_mut().insert(
            index,
            Member {
                item: change.item.clone(),
                membership: Lifetime::new(),
            },
        );
        self.inner.added.fire(&change);
        self.inner.changed.fire(&());
        Ok(())
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> RuntimeResult<T> {
        self.check_index(index, false)?;
        let item = self.inner.members.borrow()[index].item.clone();
        let change = CollectionChange { item, index };
        self.inner.before_removed.fire(&change);
        self.check_index(index, false)?;

        let member = self.inner.members.borrow_mut().remove(index);
        member.membership.try_dispose();
        self.inner.removed.fire(&CollectionChange {
            item: member.item.clone(),
            index,
        });
        self.inner.changed.fire(&());
        Ok(member.item)
    }

    /// Replace the item at `index`, returning the old one.
    pub fn set(&self, index: usize, item: T) -> RuntimeResult<T> {
        self.check_index(index, false)?;
        let old = self.inner.members.borrow()[index].item.clone();
        let removed = CollectionChange { item: old, index };
        let added = CollectionChange { item, index };
        self.inner.before_removed.fire(&removed);
        self.inner.before_added.fire(&added);
        self.check_index(index, false)?;

        let previous = std::mem::replace(
            &mut self.inner.members.borrow_mut()[index],
            Member {
                item: added.item.clone(),
                membership: Lifetime::new(),
            },
        );
        previous.membership.try_dispose();
        self.inner.removed.fire(&CollectionChange {
            item: previous.item.clone(),
            index,
        });
        self.inner.added.fire(&added);
        self.inner.index_assigned.fire(&added);
        self.inner.changed.fire(&());
        Ok(previous.item)
    }

    /// Remove every item, front to back.
    pub fn clear(&self) {
        while !self.is_empty() {
            if self.remove_at(0).is_err() {
                break;
            }
        }
    }

    /// Replay current items through `on_add`, call `on_changed` once, then
    /// keep forwarding additions, removals and changes until `lifetime`
    /// expires.
    pub fn synchronize_for_lifetime(
        &self,
        on_add: impl Fn(&CollectionChange<T>) + 'static,
        on_remove: impl Fn(&CollectionChange<T>) + 'static,
        on_changed: impl Fn() + 'static,
        lifetime: &Lifetime,
    ) {
        if lifetime.is_expired() {
            return;
        }
        for (index, item) in self.to_vec().into_iter().enumerate() {
            on_add(&CollectionChange { item, index });
        }
        on_changed();
        self.inner.added.subscribe_for_lifetime(lifetime, on_add);
        self.inner.removed.subscribe_for_lifetime(lifetime, on_remove);
        self.inner
            .changed
            .subscribe_for_lifetime(lifetime, move |_| on_changed());
    }
}

impl<T: Clone + PartialEq + 'static> ObservableCollection<T> {
    /// Index of the first item equal to `item`.
    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.inner
            .members
            .borrow()
            .iter()
            .position(|m| &m.item == item)
    }

    /// Whether any item equals `item`.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// Remove the first occurrence of `item`. Returns whether one was found.
    pub fn remove(&self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }
}
