//! Rules: named, typed sources of property values for one item.
//!
//! [`Rule`] is the object-safe core — untyped lookup, key enumeration,
//! selector access, and listener registration. Typed access is layered on
//! top by [`RuleExt`], which every rule gets for free.

pub mod selector;
pub mod style_rule;

use std::rc::Rc;

use crate::event::{ListenerHandle, RuleEvent};
use crate::key::PropertyKey;
use crate::value::{PropertyType, PropertyValue, ValueError};

use self::selector::Selector;

/// A shared, dynamically typed rule handle.
pub type SharedRule = Rc<dyn Rule>;

/// A source of property values for one addressable item.
///
/// A rule is immutable from the reader's point of view: readers only look
/// values up and subscribe to change notifications. How values come to be
/// (parsed stylesheet, animation layer, test fixture) is the implementor's
/// business.
pub trait Rule {
    /// The selector this rule matches under.
    fn selector(&self) -> Selector;

    /// Look up the value stored for `key`, if any.
    fn property(&self, key: &PropertyKey) -> Option<PropertyValue>;

    /// All keys this rule currently has values for.
    fn properties(&self) -> Vec<PropertyKey>;

    /// Register a change listener; returns a handle for [`Rule::unsubscribe`].
    fn subscribe(&self, listener: Rc<dyn Fn(&RuleEvent)>) -> ListenerHandle;

    /// Remove a previously registered listener. Unknown handles are ignored.
    fn unsubscribe(&self, handle: ListenerHandle);
}

/// Typed access on top of [`Rule`].
pub trait RuleExt: Rule {
    /// Look up `key` under the witness `ty`.
    ///
    /// `Ok(None)` when the rule has no value for the key; an error when a
    /// value exists but was stored under a different type.
    fn get<T: Clone + 'static>(
        &self,
        ty: PropertyType<T>,
        key: &PropertyKey,
    ) -> Result<Option<T>, ValueError> {
        match self.property(key) {
            Some(value) => value.get(ty).map(Some),
            None => Ok(None),
        }
    }

    /// All keys whose value is stored under the witness `ty`.
    fn properties_of<T: 'static>(&self, ty: PropertyType<T>) -> Vec<PropertyKey> {
        self.properties()
            .into_iter()
            .filter(|key| {
                self.property(key)
                    .is_some_and(|value| value.is(ty))
            })
            .collect()
    }
}

impl<R: Rule + ?Sized> RuleExt for R {}

/// A rule with no selector and no properties.
///
/// Stands in as the source view for an animation attached to a link that has
/// neither a predecessor nor a root rule yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRule;

impl Rule for EmptyRule {
    fn selector(&self) -> Selector {
        Selector::default()
    }

    fn property(&self, _key: &PropertyKey) -> Option<PropertyValue> {
        None
    }

    fn properties(&self) -> Vec<PropertyKey> {
        Vec::new()
    }

    fn subscribe(&self, _listener: Rc<dyn Fn(&RuleEvent)>) -> ListenerHandle {
        // Nothing ever changes, so nothing is ever delivered.
        ListenerHandle::DEAD
    }

    fn unsubscribe(&self, _handle: ListenerHandle) {}
}
