#![forbid(unsafe_code)]

//! Property bag with change notification.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use ftick_core::{Event, Lifetime};

/// Subscription key matching every property.
pub const ANY_PROPERTY: &str = "*";

/// Payload delivered to property subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange<V> {
    /// Name of the property that changed.
    pub name: String,
    /// New value.
    pub value: V,
    /// Value before this change; `None` on first assignment.
    pub previous: Option<V>,
}

struct Slot<V> {
    value: V,
    previous: Option<V>,
}

struct ObjectInner<V> {
    suppress_equal: bool,
    slots: RefCell<AHashMap<String, Slot<V>>>,
    /// Assignment order, for deterministic wildcard replay.
    order: RefCell<Vec<String>>,
    value_lifetimes: RefCell<AHashMap<String, Lifetime>>,
    events: RefCell<AHashMap<String, Event<PropertyChange<V>>>>,
}

/// Shared, observable map from property name to value.
pub struct ObservableObject<V> {
    inner: Rc<ObjectInner<V>>,
}

impl<V> Clone for ObservableObject<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: Clone + PartialEq + 'static> Default for ObservableObject<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for ObservableObject<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("suppress_equal", &self.inner.suppress_equal)
            .field("properties", &self.inner.order.borrow())
            .finish()
    }
}

impl<V: Clone + PartialEq + 'static> ObservableObject<V> {
    /// Create an object that ignores writes equal to the current value.
    #[must_use]
    pub fn new() -> Self {
        Self::with_suppress_equal_changes(true)
    }

    /// Create an object, choosing whether equal writes are suppressed.
    #[must_use]
    pub fn with_suppress_equal_changes(suppress: bool) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                suppress_equal: suppress,
                slots: RefCell::new(AHashMap::new()),
                order: RefCell::new(Vec::new()),
                value_lifetimes: RefCell::new(AHashMap::new()),
                events: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// Current value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<V> {
        self.inner.slots.borrow().get(name).map(|s| s.value.clone())
    }

    /// Value `name` held before its last change.
    #[must_use]
    pub fn get_previous(&self, name: &str) -> Option<V> {
        self.inner
            .slots
            .borrow()
            .get(name)
            .and_then(|s| s.previous.clone())
    }

    /// Whether `name` has ever been assigned.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.slots.borrow().contains_key(name)
    }

    /// Property names in first-assignment order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.inner.order.borrow().clone()
    }

    /// Assign `value` to `name`.
    ///
    /// Returns `true` if the change was published: the property's value
    /// lifetime expired, then its own event and the wildcard event fired.
    pub fn set(&self, name: &str, value: V) -> bool {
        let change = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(name) {
                Some(slot) => {
                    if self.inner.suppress_equal && slot.value == value {
                        return false;
                    }
                    let previous = std::mem::replace(&mut slot.value, value.clone());
                    slot.previous = Some(previous.clone());
                    PropertyChange {
                        name: name.to_owned(),
                        value,
                        previous: Some(previous),
                    }
                }
                None => {
                    slots.insert(
                        name.to_owned(),
                        Slot {
                            value: value.clone(),
                            previous: None,
                        },
                    );
                    self.inner.order.borrow_mut().push(name.to_owned());
                    PropertyChange {
                        name: name.to_owned(),
                        value,
                        previous: None,
                    }
                }
            }
        };

        let expired = self.inner.value_lifetimes.borrow_mut().remove(name);
        if let Some(lifetime) = expired {
            lifetime.try_dispose();
        }

        if let Some(event) = self.existing_event(name) {
            event.fire(&change);
        }
        if let Some(event) = self.existing_event(ANY_PROPERTY) {
            event.fire(&change);
        }
        true
    }

    /// A lifetime that expires the next time `name` changes.
    #[must_use]
    pub fn value_lifetime(&self, name: &str) -> Lifetime {
        self.inner
            .value_lifetimes
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .clone()
    }

    /// Call `handler` on every change of `name` (or of any property for
    /// [`ANY_PROPERTY`]) until `lifetime` expires.
    pub fn subscribe_for_lifetime(
        &self,
        name: &str,
        lifetime: &Lifetime,
        handler: impl Fn(&PropertyChange<V>) + 'static,
    ) {
        self.event(name).subscribe_for_lifetime(lifetime, handler);
    }

    /// Call `handler` on the next change of `name` only.
    pub fn subscribe_once(&self, name: &str, handler: impl Fn(&PropertyChange<V>) + 'static) {
        self.event(name).subscribe_once(handler);
    }

    /// Replay the current value (every current value for [`ANY_PROPERTY`])
    /// through `handler`, then follow changes until `lifetime` expires.
    pub fn synchronize_for_lifetime(
        &self,
        name: &str,
        lifetime: &Lifetime,
        handler: impl Fn(&PropertyChange<V>) + 'static,
    ) {
        if lifetime.is_expired() {
            return;
        }
        let names = if name == ANY_PROPERTY {
            self.property_names()
        } else {
            vec![name.to_owned()]
        };
        for property in names {
            let current = {
                let slots = self.inner.slots.borrow();
                slots.get(&property).map(|s| PropertyChange {
                    name: property.clone(),
                    value: s.value.clone(),
                    previous: s.previous.clone(),
                })
            };
            if let Some(change) = current {
                handler(&change);
            }
        }
        self.subscribe_for_lifetime(name, lifetime, handler);
    }

    fn event(&self, name: &str) -> Event<PropertyChange<V>> {
        self.inner
            .events
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .clone()
    }

    fn existing_event(&self, name: &str) -> Option<Event<PropertyChange<V>>> {
        self.inner.events.borrow().get(name).cloned()
    }
}
