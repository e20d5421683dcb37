//! StyleRule: the stock mutable, map-backed rule.
//!
//! This is what the surrounding cascade hands to a rule chain as the root
//! rule for an item: a selector plus typed property values, with change
//! notification. Handles are cheap clones sharing one backing store, so a
//! test or cascade layer can keep writing while a chain reads.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::event::{emit, ListenerHandle, Listeners, RuleEvent};
use crate::key::PropertyKey;
use crate::rule::selector::Selector;
use crate::rule::{Rule, SharedRule};
use crate::value::{PropertyType, PropertyValue};

struct StyleRuleState {
    selector: Selector,
    values: HashMap<PropertyKey, PropertyValue>,
    listeners: Listeners<RuleEvent>,
}

/// A mutable rule: selector + typed property values + listeners.
#[derive(Clone)]
pub struct StyleRule {
    inner: Rc<RefCell<StyleRuleState>>,
}

impl StyleRule {
    /// Create an empty rule with the given selector.
    pub fn new(selector: Selector) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StyleRuleState {
                selector,
                values: HashMap::new(),
                listeners: Listeners::new(),
            })),
        }
    }

    /// A shared trait-object handle to this rule.
    pub fn shared(&self) -> SharedRule {
        Rc::new(self.clone())
    }

    /// Set one property, firing `PropertyChanged`.
    pub fn set<T: 'static>(&self, ty: PropertyType<T>, key: impl Into<PropertyKey>, value: T) {
        let key = key.into();
        let snapshot = {
            let mut state = self.inner.borrow_mut();
            state
                .values
                .insert(key.clone(), PropertyValue::new(ty, value));
            state.listeners.snapshot()
        };
        emit(&snapshot, &RuleEvent::PropertyChanged(key));
    }

    /// Remove one property. Fires `PropertyChanged` only if it was present.
    pub fn remove(&self, key: &PropertyKey) {
        let snapshot = {
            let mut state = self.inner.borrow_mut();
            if state.values.remove(key).is_none() {
                return;
            }
            state.listeners.snapshot()
        };
        emit(&snapshot, &RuleEvent::PropertyChanged(key.clone()));
    }

    /// Replace the selector, firing `SelectorChanged`.
    pub fn set_selector(&self, selector: Selector) {
        let snapshot = {
            let mut state = self.inner.borrow_mut();
            state.selector = selector;
            state.listeners.snapshot()
        };
        emit(&snapshot, &RuleEvent::SelectorChanged);
    }

    /// Replace all values at once, firing a single `PropertiesChanged`.
    pub fn replace_all(
        &self,
        values: impl IntoIterator<Item = (PropertyKey, PropertyValue)>,
    ) {
        let snapshot = {
            let mut state = self.inner.borrow_mut();
            state.values = values.into_iter().collect();
            state.listeners.snapshot()
        };
        emit(&snapshot, &RuleEvent::PropertiesChanged);
    }

    /// Number of properties currently set.
    pub fn len(&self) -> usize {
        self.inner.borrow().values.len()
    }

    /// Whether no properties are set.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().values.is_empty()
    }
}

impl Rule for StyleRule {
    fn selector(&self) -> Selector {
        self.inner.borrow().selector.clone()
    }

    fn property(&self, key: &PropertyKey) -> Option<PropertyValue> {
        self.inner.borrow().values.get(key).cloned()
    }

    fn properties(&self) -> Vec<PropertyKey> {
        self.inner.borrow().values.keys().cloned().collect()
    }

    fn subscribe(&self, listener: Rc<dyn Fn(&RuleEvent)>) -> ListenerHandle {
        self.inner.borrow_mut().listeners.subscribe(listener)
    }

    fn unsubscribe(&self, handle: ListenerHandle) {
        self.inner.borrow_mut().listeners.unsubscribe(handle);
    }
}

impl std::fmt::Debug for StyleRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("StyleRule")
            .field("selector", &state.selector.to_string())
            .field("properties", &state.values.len())
            .finish()
    }
}
